use serde::Deserialize;

/// Query string of `GET /tokens`
#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Query string of `GET /tokens/{id}/history`
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}
