//! Upstream price API client with rate-limit aware retries

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::UpstreamConfig;

const HTTP_TOO_MANY_REQUESTS: u16 = 429;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Rate limited by upstream API, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Failed after {attempts} attempts due to rate limiting")]
    RetriesExhausted { attempts: u32 },

    #[error("Upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Upstream request failed: {0}")]
    Transport(String),

    #[error("Failed to decode upstream response: {0}")]
    Decode(String),

    #[error("Invalid upstream URL: {0}")]
    InvalidUrl(String),
}

/// Raw response as seen by the retry loop
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub retry_after: Option<String>,
    pub body: String,
}

impl UpstreamResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn rate_limited(retry_after: Option<&str>) -> Self {
        Self {
            status: HTTP_TOO_MANY_REQUESTS,
            retry_after: retry_after.map(str::to_string),
            body: String::new(),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }
}

/// A single GET round trip, without any retry policy
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    async fn get(
        &self,
        url: &Url,
        query: &[(String, String)],
        headers: &[(String, String)],
    ) -> Result<UpstreamResponse, UpstreamError>;
}

/// Suspends the caller between rate-limited attempts
#[async_trait]
pub trait Delay: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout_secs: u64) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| UpstreamError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl UpstreamTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &Url,
        query: &[(String, String)],
        headers: &[(String, String)],
    ) -> Result<UpstreamResponse, UpstreamError> {
        let mut request = self
            .client
            .get(url.clone())
            .query(query)
            .header("Accept", "application/json");
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        // Read retry-after before the body consumes the response
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        Ok(UpstreamResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// GET client that waits out 429 responses, up to `max_attempts` requests
pub struct UpstreamClient {
    transport: Arc<dyn UpstreamTransport>,
    delay: Arc<dyn Delay>,
    base_url: Url,
    default_headers: Vec<(String, String)>,
    max_attempts: u32,
    default_retry_after_secs: u64,
}

impl UpstreamClient {
    pub fn new(
        transport: Arc<dyn UpstreamTransport>,
        delay: Arc<dyn Delay>,
        config: &UpstreamConfig,
    ) -> Result<Self, UpstreamError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| UpstreamError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;

        let default_headers = config
            .api_key
            .as_ref()
            .map(|key| vec![(config.api_key_header.clone(), key.clone())])
            .unwrap_or_default();

        Ok(Self {
            transport,
            delay,
            base_url,
            default_headers,
            max_attempts: config.max_attempts.max(1),
            default_retry_after_secs: config.default_retry_after_secs,
        })
    }

    /// Client backed by reqwest and real sleeps
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let transport = ReqwestTransport::new(config.timeout_secs)?;
        Self::new(Arc::new(transport), Arc::new(TokioDelay), config)
    }

    /// Base URL with the given path segments appended, each one percent-encoded
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, UpstreamError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| UpstreamError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Fetch a JSON document, retrying while the upstream answers 429
    pub async fn fetch(
        &self,
        url: &Url,
        query: &[(String, String)],
        headers: &[(String, String)],
    ) -> Result<Value, UpstreamError> {
        let mut all_headers = self.default_headers.clone();
        all_headers.extend_from_slice(headers);

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.attempt(url, query, &all_headers).await {
                Err(UpstreamError::RateLimited { retry_after_secs }) => {
                    if attempts >= self.max_attempts {
                        warn!(
                            "Still rate limited by upstream API after {} attempts: {}",
                            attempts, url
                        );
                        return Err(UpstreamError::RetriesExhausted { attempts });
                    }
                    warn!(
                        "Rate limited by upstream API. Waiting {} seconds...",
                        retry_after_secs
                    );
                    self.delay
                        .sleep(Duration::from_secs(retry_after_secs))
                        .await;
                }
                other => return other,
            }
        }
    }

    async fn attempt(
        &self,
        url: &Url,
        query: &[(String, String)],
        headers: &[(String, String)],
    ) -> Result<Value, UpstreamError> {
        debug!("GET {}", url);
        let response = self.transport.get(url, query, headers).await?;

        match response.status {
            HTTP_TOO_MANY_REQUESTS => Err(UpstreamError::RateLimited {
                retry_after_secs: self.retry_after_secs(response.retry_after.as_deref()),
            }),
            200..=299 => serde_json::from_str(&response.body)
                .map_err(|e| UpstreamError::Decode(e.to_string())),
            status => Err(UpstreamError::Status {
                status,
                body: response.body,
            }),
        }
    }

    /// Whole seconds at the start of a retry-after hint, so `1.5` waits 1s.
    /// No leading digits, or zero, falls back to the default.
    fn retry_after_secs(&self, hint: Option<&str>) -> u64 {
        hint.map(|v| {
            v.trim()
                .chars()
                .take_while(char::is_ascii_digit)
                .collect::<String>()
        })
        .and_then(|digits| digits.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(self.default_retry_after_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::testing::{RecordingDelay, ScriptedTransport};

    fn client_with(
        responses: Vec<UpstreamResponse>,
    ) -> (UpstreamClient, Arc<ScriptedTransport>, Arc<RecordingDelay>) {
        let transport = Arc::new(ScriptedTransport::new(responses));
        let delay = Arc::new(RecordingDelay::default());
        let mut config = Config::default().upstream;
        config.api_key = Some("test-key".to_string());
        let client = UpstreamClient::new(transport.clone(), delay.clone(), &config).unwrap();
        (client, transport, delay)
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let (client, transport, delay) = client_with(vec![
            UpstreamResponse::rate_limited(Some("1")),
            UpstreamResponse::rate_limited(Some("1")),
            UpstreamResponse::ok(r#"{"id":"ethereum"}"#),
        ]);
        let url = client.endpoint(&["coins", "ethereum"]).unwrap();

        let body = client.fetch(&url, &[], &[]).await.unwrap();

        assert_eq!(body["id"], "ethereum");
        assert_eq!(transport.calls(), 3);
        assert_eq!(
            delay.waits(),
            vec![Duration::from_secs(1), Duration::from_secs(1)]
        );
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let (client, transport, _delay) = client_with(vec![
            UpstreamResponse::rate_limited(Some("1")),
            UpstreamResponse::rate_limited(Some("1")),
            UpstreamResponse::rate_limited(Some("1")),
            UpstreamResponse::rate_limited(Some("1")),
        ]);
        let url = client.endpoint(&["coins", "ethereum"]).unwrap();

        let err = client.fetch(&url, &[], &[]).await.unwrap_err();

        assert!(matches!(
            err,
            UpstreamError::RetriesExhausted { attempts: 3 }
        ));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn test_missing_or_bad_retry_after_uses_default() {
        let (client, _transport, delay) = client_with(vec![
            UpstreamResponse::rate_limited(None),
            UpstreamResponse::rate_limited(Some("soon")),
            UpstreamResponse::ok("[]"),
        ]);
        let url = client.endpoint(&["coins", "ethereum", "ohlc"]).unwrap();

        client.fetch(&url, &[], &[]).await.unwrap();

        assert_eq!(
            delay.waits(),
            vec![Duration::from_secs(6), Duration::from_secs(6)]
        );
    }

    #[tokio::test]
    async fn test_fractional_retry_after_keeps_whole_seconds() {
        let (client, _transport, delay) = client_with(vec![
            UpstreamResponse::rate_limited(Some("1.5")),
            UpstreamResponse::rate_limited(Some(" 2 ")),
            UpstreamResponse::ok("[]"),
        ]);
        let url = client.endpoint(&["coins", "ethereum"]).unwrap();

        client.fetch(&url, &[], &[]).await.unwrap();

        assert_eq!(
            delay.waits(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let (client, transport, delay) = client_with(vec![
            UpstreamResponse::status(404, r#"{"error":"coin not found"}"#),
            UpstreamResponse::ok("{}"),
        ]);
        let url = client.endpoint(&["coins", "nope"]).unwrap();

        let err = client.fetch(&url, &[], &[]).await.unwrap_err();

        assert!(matches!(err, UpstreamError::Status { status: 404, .. }));
        assert_eq!(transport.calls(), 1);
        assert!(delay.waits().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_body_is_an_error() {
        let (client, _transport, _delay) = client_with(vec![UpstreamResponse::ok("<html>")]);
        let url = client.endpoint(&["coins", "ethereum"]).unwrap();

        let err = client.fetch(&url, &[], &[]).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Decode(_)));
    }

    #[tokio::test]
    async fn test_sends_api_key_and_query() {
        let (client, transport, _delay) = client_with(vec![UpstreamResponse::ok("[]")]);
        let url = client.endpoint(&["coins", "ethereum", "ohlc"]).unwrap();
        let query = vec![("days".to_string(), "7".to_string())];

        client.fetch(&url, &query, &[]).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].url,
            "https://api.coingecko.com/api/v3/coins/ethereum/ohlc"
        );
        assert_eq!(requests[0].query, query);
        assert!(requests[0]
            .headers
            .contains(&("x-cg-api-key".to_string(), "test-key".to_string())));
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let (client, _transport, _delay) = client_with(vec![]);
        let url = client.endpoint(&["coins", "a/b"]).unwrap();
        assert_eq!(url.as_str(), "https://api.coingecko.com/api/v3/coins/a%2Fb");
    }
}
