use serde::Deserialize;

/// Query string of `GET /ohlc`
#[derive(Debug, Deserialize)]
pub struct OhlcQuery {
    pub token: Option<String>,
    pub days: Option<String>,
}
