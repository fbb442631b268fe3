//! CoinGecko payload shapes and request parameters
//!
//! API Documentation: https://docs.coingecko.com/reference/introduction
//!
//! Endpoints used:
//! 1. /coins/{id} - token details with market data
//! 2. /coins/{id}/ohlc - OHLC candles

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::database::models::TokenSnapshot;

#[derive(Debug, Error)]
#[error("Missing or malformed field in upstream payload for {token}: {message}")]
pub struct ExtractionError {
    pub token: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct CoinDetail {
    id: String,
    name: String,
    symbol: String,
    image: CoinImage,
    market_data: MarketData,
}

#[derive(Debug, Deserialize)]
struct CoinImage {
    small: String,
}

#[derive(Debug, Deserialize)]
struct UsdValue {
    usd: f64,
}

#[derive(Debug, Deserialize)]
struct MarketData {
    current_price: UsdValue,
    price_change_percentage_1h_in_currency: UsdValue,
    price_change_percentage_24h: f64,
    price_change_percentage_7d: f64,
    total_volume: UsdValue,
    market_cap: UsdValue,
    last_updated: String,
}

fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Query flags for `/coins/{id}`: market data only
pub fn coin_detail_query() -> Vec<(String, String)> {
    params(&[
        ("localization", "false"),
        ("tickers", "false"),
        ("market_data", "true"),
        ("community_data", "false"),
        ("developer_data", "false"),
    ])
}

pub fn ohlc_query(days: &str) -> Vec<(String, String)> {
    params(&[("vs_currency", "usd"), ("days", days)])
}

/// Shape a `/coins/{id}` response into a snapshot. Every field is required.
pub fn extract_snapshot(token: &str, payload: Value) -> Result<TokenSnapshot, ExtractionError> {
    let detail: CoinDetail = serde_json::from_value(payload).map_err(|e| ExtractionError {
        token: token.to_string(),
        message: e.to_string(),
    })?;
    let market = detail.market_data;

    Ok(TokenSnapshot {
        id: detail.id,
        name: detail.name,
        symbol: detail.symbol,
        image: detail.image.small,
        price: market.current_price.usd,
        price_change_1h: market.price_change_percentage_1h_in_currency.usd,
        price_change_24h: market.price_change_percentage_24h,
        price_change_7d: market.price_change_percentage_7d,
        volume_24h: market.total_volume.usd,
        market_cap: market.market_cap.usd,
        last_updated: market.last_updated,
    })
}
