//! In-memory stand-ins for the upstream API, the cache backend and durable storage

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use super::cache::{CacheError, CacheStore};
use super::persistence::{PersistenceError, SnapshotStore};
use super::upstream::{Delay, UpstreamError, UpstreamResponse, UpstreamTransport};
use crate::database::models::{PersistedRecord, TokenSnapshot};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

/// Replays canned responses. Requests whose path has a route get that
/// route's responses in order; everything else drains the shared queue.
#[derive(Default)]
pub struct ScriptedTransport {
    queue: Mutex<VecDeque<UpstreamResponse>>,
    routes: Mutex<HashMap<String, VecDeque<UpstreamResponse>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<UpstreamResponse>) -> Self {
        Self {
            queue: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    pub fn with_route(self, path: &str, responses: Vec<UpstreamResponse>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), responses.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.ends_with(path))
            .count()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpstreamTransport for ScriptedTransport {
    async fn get(
        &self,
        url: &Url,
        query: &[(String, String)],
        headers: &[(String, String)],
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            query: query.to_vec(),
            headers: headers.to_vec(),
        });

        let routed = self
            .routes
            .lock()
            .unwrap()
            .get_mut(url.path())
            .and_then(VecDeque::pop_front);

        routed
            .or_else(|| self.queue.lock().unwrap().pop_front())
            .ok_or_else(|| UpstreamError::Transport(format!("no scripted response for {}", url)))
    }
}

/// Returns immediately and remembers every requested wait
#[derive(Default)]
pub struct RecordingDelay {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingDelay {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Delay for RecordingDelay {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

/// Cache backend that is always down
pub struct UnavailableCache;

#[async_trait]
impl CacheStore for UnavailableCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: String, _ttl_secs: u64) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }
}

/// Map-backed snapshot store that can be switched into a failing state
#[derive(Default)]
pub struct MemorySnapshotStore {
    records: DashMap<String, PersistedRecord>,
    writes: AtomicUsize,
    failing: AtomicBool,
}

impl MemorySnapshotStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn get(&self, id: &str) -> Option<PersistedRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    /// Accepted upserts so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn upsert(&self, record: &PersistedRecord) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Write("simulated outage".to_string()));
        }
        self.records
            .insert(record.id().to_string(), record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn history(
        &self,
        id: &str,
        limit: i64,
    ) -> Result<Vec<PersistedRecord>, PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Read("simulated outage".to_string()));
        }
        let take = usize::try_from(limit).unwrap_or(0);
        Ok(self.get(id).into_iter().take(take).collect())
    }
}

/// A `/coins/{id}` body carrying every field the extractor needs
pub fn coin_payload(id: &str, price: f64) -> Value {
    let mut name = id.to_string();
    if let Some(first) = name.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    json!({
        "id": id,
        "name": name,
        "symbol": id.chars().take(3).collect::<String>(),
        "image": {
            "thumb": format!("http://example.com/{}-thumb.png", id),
            "small": format!("http://example.com/{}.png", id),
        },
        "market_data": {
            "current_price": { "usd": price, "eur": price * 0.9 },
            "price_change_percentage_1h_in_currency": { "usd": 1.5 },
            "price_change_percentage_24h": 2.0,
            "price_change_percentage_7d": 5.0,
            "total_volume": { "usd": 1_000_000.0 },
            "market_cap": { "usd": 350_000_000_000.0 },
            "last_updated": "2025-03-24T12:00:00Z",
        },
    })
}

pub fn sample_snapshot(id: &str, price: f64) -> TokenSnapshot {
    TokenSnapshot {
        id: id.to_string(),
        name: id.to_string(),
        symbol: id.chars().take(3).collect(),
        image: format!("http://example.com/{}.png", id),
        price,
        price_change_1h: 1.5,
        price_change_24h: 2.0,
        price_change_7d: 5.0,
        volume_24h: 1_000_000.0,
        market_cap: 350_000_000_000.0,
        last_updated: "2025-03-24T12:00:00Z".to_string(),
    }
}
