//! Rate-limited write-through of token snapshots to durable storage

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, error, info};
use std::sync::Arc;
use thiserror::Error;

use super::clock::Clock;
use crate::database::models::{PersistedRecord, TokenSnapshot};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage write failed: {0}")]
    Write(String),

    #[error("Storage read failed: {0}")]
    Read(String),
}

/// Durable document store keyed by token id
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Replace the record matching `record.id`, inserting it if absent
    async fn upsert(&self, record: &PersistedRecord) -> Result<(), PersistenceError>;

    /// Records for `id`, newest first
    async fn history(
        &self,
        id: &str,
        limit: i64,
    ) -> Result<Vec<PersistedRecord>, PersistenceError>;
}

/// Tracks the last accepted write per id and hands out write slots
pub struct WriteRateLimiter {
    last_write: DashMap<String, i64>,
    min_interval_ms: i64,
}

/// Held while a write is in flight; `previous` is restored if the write fails
#[derive(Debug, Clone, PartialEq)]
pub struct WriteSlot {
    id: String,
    reserved_at: i64,
    previous: Option<i64>,
}

impl WriteRateLimiter {
    pub fn new(min_interval_ms: i64) -> Self {
        Self {
            last_write: DashMap::new(),
            min_interval_ms,
        }
    }

    /// Claim the write slot for `id` at `now`, or `None` if the last accepted
    /// write is younger than the interval. Check and claim are one atomic step.
    pub fn try_acquire(&self, id: &str, now: i64) -> Option<WriteSlot> {
        match self.last_write.entry(id.to_string()) {
            Entry::Occupied(mut entry) => {
                if now - *entry.get() < self.min_interval_ms {
                    return None;
                }
                let previous = entry.insert(now);
                Some(WriteSlot {
                    id: id.to_string(),
                    reserved_at: now,
                    previous: Some(previous),
                })
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                Some(WriteSlot {
                    id: id.to_string(),
                    reserved_at: now,
                    previous: None,
                })
            }
        }
    }

    /// Undo a claim whose write failed
    pub fn release(&self, slot: WriteSlot) {
        if let Entry::Occupied(mut entry) = self.last_write.entry(slot.id) {
            if *entry.get() != slot.reserved_at {
                return;
            }
            match slot.previous {
                Some(previous) => {
                    entry.insert(previous);
                }
                None => {
                    entry.remove();
                }
            }
        }
    }

    pub fn last_write(&self, id: &str) -> Option<i64> {
        self.last_write.get(id).map(|v| *v)
    }

    pub fn tracked_ids(&self) -> usize {
        self.last_write.len()
    }
}

#[derive(Debug)]
pub enum SaveOutcome {
    Saved,
    Throttled,
    Failed(PersistenceError),
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved)
    }
}

/// Writes at most one snapshot per token id per interval; storage failures
/// are logged and never reach the caller
pub struct PersistenceGate {
    store: Arc<dyn SnapshotStore>,
    limiter: WriteRateLimiter,
    clock: Arc<dyn Clock>,
}

impl PersistenceGate {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        limiter: WriteRateLimiter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            limiter,
            clock,
        }
    }

    pub fn limiter(&self) -> &WriteRateLimiter {
        &self.limiter
    }

    pub async fn maybe_save(&self, snapshot: &TokenSnapshot) -> SaveOutcome {
        let now = self.clock.now_millis();
        let Some(slot) = self.limiter.try_acquire(&snapshot.id, now) else {
            debug!("Skipping write for {}, last write is too recent", snapshot.id);
            return SaveOutcome::Throttled;
        };

        let record = PersistedRecord::new(snapshot.clone(), now);
        match self.store.upsert(&record).await {
            Ok(()) => {
                info!("Saved data for {} to durable storage", snapshot.id);
                SaveOutcome::Saved
            }
            Err(e) => {
                error!("Error saving token data for {}: {}", snapshot.id, e);
                self.limiter.release(slot);
                SaveOutcome::Failed(e)
            }
        }
    }

    /// Stored records for `id`, newest first; storage errors yield an empty list
    pub async fn history(&self, id: &str, limit: i64) -> Vec<PersistedRecord> {
        match self.store.history(id, limit).await {
            Ok(records) => records,
            Err(e) => {
                error!("Error retrieving historical data for {}: {}", id, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use crate::services::testing::{sample_snapshot, MemorySnapshotStore};

    const START: i64 = 1_700_000_000_000;

    fn gate() -> (PersistenceGate, Arc<MemorySnapshotStore>, Arc<ManualClock>) {
        let store = Arc::new(MemorySnapshotStore::default());
        let clock = Arc::new(ManualClock::new(START));
        let gate = PersistenceGate::new(
            store.clone(),
            WriteRateLimiter::new(60_000),
            clock.clone(),
        );
        (gate, store, clock)
    }

    #[tokio::test]
    async fn test_only_saves_once_per_minute() {
        let (gate, store, clock) = gate();

        assert!(gate.maybe_save(&sample_snapshot("bitcoin", 50000.0)).await.is_saved());

        clock.advance(10_000);
        let outcome = gate.maybe_save(&sample_snapshot("bitcoin", 51000.0)).await;
        assert!(matches!(outcome, SaveOutcome::Throttled));
        assert_eq!(store.get("bitcoin").unwrap().snapshot.price, 50000.0);

        clock.set(START + 61_000);
        assert!(gate.maybe_save(&sample_snapshot("bitcoin", 51000.0)).await.is_saved());
        let stored = store.get("bitcoin").unwrap();
        assert_eq!(stored.snapshot.price, 51000.0);
        assert_eq!(stored.timestamp, START + 61_000);
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn test_window_boundary_is_inclusive() {
        let (gate, store, clock) = gate();

        gate.maybe_save(&sample_snapshot("bitcoin", 1.0)).await;
        clock.advance(59_999);
        assert!(!gate.maybe_save(&sample_snapshot("bitcoin", 2.0)).await.is_saved());
        clock.advance(1);
        assert!(gate.maybe_save(&sample_snapshot("bitcoin", 3.0)).await.is_saved());
        assert_eq!(store.get("bitcoin").unwrap().snapshot.price, 3.0);
    }

    #[tokio::test]
    async fn test_ids_are_limited_independently() {
        let (gate, store, _clock) = gate();

        assert!(gate.maybe_save(&sample_snapshot("bitcoin", 1.0)).await.is_saved());
        assert!(gate.maybe_save(&sample_snapshot("ethereum", 2.0)).await.is_saved());
        assert_eq!(store.writes(), 2);
        assert_eq!(gate.limiter().tracked_ids(), 2);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_advance_window() {
        let (gate, store, clock) = gate();

        store.set_failing(true);
        let outcome = gate.maybe_save(&sample_snapshot("bitcoin", 50000.0)).await;
        assert!(matches!(outcome, SaveOutcome::Failed(_)));
        assert_eq!(gate.limiter().last_write("bitcoin"), None);

        store.set_failing(false);
        clock.advance(5_000);
        assert!(gate.maybe_save(&sample_snapshot("bitcoin", 50500.0)).await.is_saved());
        assert_eq!(store.get("bitcoin").unwrap().snapshot.price, 50500.0);
        assert_eq!(gate.limiter().last_write("bitcoin"), Some(START + 5_000));
    }

    #[tokio::test]
    async fn test_failed_write_restores_previous_time() {
        let (gate, store, clock) = gate();

        gate.maybe_save(&sample_snapshot("bitcoin", 1.0)).await;
        clock.advance(70_000);
        store.set_failing(true);
        gate.maybe_save(&sample_snapshot("bitcoin", 2.0)).await;

        assert_eq!(gate.limiter().last_write("bitcoin"), Some(START));
    }

    /// Suspends inside `upsert` so another save can run mid-write
    struct YieldingStore(Arc<MemorySnapshotStore>);

    #[async_trait]
    impl SnapshotStore for YieldingStore {
        async fn upsert(&self, record: &PersistedRecord) -> Result<(), PersistenceError> {
            tokio::task::yield_now().await;
            self.0.upsert(record).await
        }

        async fn history(
            &self,
            id: &str,
            limit: i64,
        ) -> Result<Vec<PersistedRecord>, PersistenceError> {
            self.0.history(id, limit).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_saves_write_once() {
        let store = Arc::new(MemorySnapshotStore::default());
        let gate = PersistenceGate::new(
            Arc::new(YieldingStore(store.clone())),
            WriteRateLimiter::new(60_000),
            Arc::new(ManualClock::new(START)),
        );
        let first = sample_snapshot("bitcoin", 50000.0);
        let second = sample_snapshot("bitcoin", 50001.0);

        let (a, b) = tokio::join!(gate.maybe_save(&first), gate.maybe_save(&second));

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|o| o.is_saved()).count(), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o, SaveOutcome::Throttled))
                .count(),
            1
        );
        assert_eq!(store.writes(), 1);
    }

    #[test]
    fn test_second_claim_in_window_is_refused() {
        let limiter = WriteRateLimiter::new(60_000);
        let first = limiter.try_acquire("bitcoin", START);
        let second = limiter.try_acquire("bitcoin", START);

        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[test]
    fn test_stale_release_is_ignored() {
        let limiter = WriteRateLimiter::new(60_000);
        let old = limiter.try_acquire("bitcoin", START).unwrap();
        let _newer = limiter.try_acquire("bitcoin", START + 60_000).unwrap();

        limiter.release(old);
        assert_eq!(limiter.last_write("bitcoin"), Some(START + 60_000));
    }

    #[tokio::test]
    async fn test_history_swallows_errors() {
        let (gate, store, _clock) = gate();
        gate.maybe_save(&sample_snapshot("bitcoin", 1.0)).await;
        assert_eq!(gate.history("bitcoin", 10).await.len(), 1);

        store.set_failing(true);
        assert!(gate.history("bitcoin", 10).await.is_empty());
    }
}
