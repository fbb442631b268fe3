use log::{debug, info, warn};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use super::cache::{ohlc_key, token_key, ResponseCache};
use super::coingecko::{coin_detail_query, extract_snapshot, ohlc_query, ExtractionError};
use super::persistence::PersistenceGate;
use super::upstream::{UpstreamClient, UpstreamError};
use crate::config::{BatchPolicy, MarketConfig};
use crate::database::models::{PersistedRecord, TokenSnapshot};

const MAX_HISTORY_LIMIT: i64 = 1000;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("Upstream OHLC payload for {token} is not an array: {message}")]
    OhlcShape { token: String, message: String },

    #[error("No token data could be fetched ({} failures)", .failures.len())]
    AllTokensFailed { failures: Vec<(String, String)> },
}

/// Serves token details and OHLC series: cache first, then the upstream API,
/// with token snapshots written through the persistence gate
pub struct MarketDataService {
    upstream: UpstreamClient,
    cache: ResponseCache,
    gate: PersistenceGate,
    settings: MarketConfig,
}

impl MarketDataService {
    pub fn new(
        upstream: UpstreamClient,
        cache: ResponseCache,
        gate: PersistenceGate,
        settings: MarketConfig,
    ) -> Self {
        Self {
            upstream,
            cache,
            gate,
            settings,
        }
    }

    pub fn gate(&self) -> &PersistenceGate {
        &self.gate
    }

    /// Built-in tokens first, then the requested one if it is not among them
    pub fn working_set(&self, requested: Option<&str>) -> Vec<String> {
        let mut tokens: Vec<String> = Vec::with_capacity(self.settings.default_tokens.len() + 1);
        let extra = requested.map(str::to_string);
        for token in self.settings.default_tokens.iter().chain(extra.iter()) {
            if !tokens.contains(token) {
                tokens.push(token.clone());
            }
        }
        tokens
    }

    /// Snapshots for the default tokens plus `requested`, keyed by token id
    pub async fn get_token_details(
        &self,
        requested: Option<&str>,
    ) -> Result<HashMap<String, TokenSnapshot>, MarketError> {
        let tokens = self.working_set(requested);
        let mut results = HashMap::with_capacity(tokens.len());
        let mut failures = Vec::new();

        for token in tokens {
            match self.token_snapshot(&token).await {
                Ok(snapshot) => {
                    results.insert(token, snapshot);
                }
                Err(e) => match self.settings.batch_policy {
                    BatchPolicy::AllOrNothing => return Err(e),
                    BatchPolicy::Partial => {
                        warn!("Dropping {} from token details: {}", token, e);
                        failures.push((token, e.to_string()));
                    }
                },
            }
        }

        if results.is_empty() && !failures.is_empty() {
            return Err(MarketError::AllTokensFailed { failures });
        }

        Ok(results)
    }

    async fn token_snapshot(&self, token: &str) -> Result<TokenSnapshot, MarketError> {
        let key = token_key(token);
        if let Some(snapshot) = self.cache.get_json::<TokenSnapshot>(&key).await {
            return Ok(snapshot);
        }

        let url = self.upstream.endpoint(&["coins", token])?;
        let payload = self.upstream.fetch(&url, &coin_detail_query(), &[]).await?;
        let snapshot = extract_snapshot(token, payload)?;

        self.cache.set_json(&key, &snapshot).await;
        // Outcome is logged by the gate; it never fails the request
        let outcome = self.gate.maybe_save(&snapshot).await;
        debug!("Persistence outcome for {}: {:?}", token, outcome);

        Ok(snapshot)
    }

    /// OHLC candles for `token` over `days`, exactly as the upstream sent them
    pub async fn get_ohlc_data(
        &self,
        token: Option<&str>,
        days: Option<&str>,
    ) -> Result<Value, MarketError> {
        let token = token.unwrap_or(&self.settings.default_ohlc_token);
        let days = days.unwrap_or(&self.settings.default_ohlc_days);
        let key = ohlc_key(token, days);

        if let Some(candles) = self.cache.get_json::<Value>(&key).await {
            return Ok(candles);
        }

        let url = self.upstream.endpoint(&["coins", token, "ohlc"])?;
        let candles = self.upstream.fetch(&url, &ohlc_query(days), &[]).await?;
        let Some(count) = candles.as_array().map(Vec::len) else {
            return Err(MarketError::OhlcShape {
                token: token.to_string(),
                message: format!("expected an array, got {}", candles),
            });
        };

        info!("Fetched {} OHLC points for {} ({} days)", count, token, days);
        self.cache.set_json(&key, &candles).await;

        Ok(candles)
    }

    /// Persisted snapshots for `token`, newest first
    pub async fn get_token_history(&self, token: &str, limit: Option<i64>) -> Vec<PersistedRecord> {
        let limit = limit
            .unwrap_or(self.settings.history_limit)
            .clamp(1, MAX_HISTORY_LIMIT);
        self.gate.history(token, limit).await
    }
}
