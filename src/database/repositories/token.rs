use crate::database::models::PersistedRecord;
use crate::database::mongodb::MongoDbClient;
use crate::services::persistence::{PersistenceError, SnapshotStore};
use async_trait::async_trait;
use bson::doc;
use futures::TryStreamExt;
use log::debug;
use mongodb::Collection;
use std::sync::Arc;

/// Token snapshot repository for MongoDB operations
#[derive(Debug, Clone)]
pub struct TokenSnapshotRepository {
    client: Arc<MongoDbClient>,
}

impl TokenSnapshotRepository {
    /// Create a new TokenSnapshotRepository instance
    pub fn new(client: Arc<MongoDbClient>) -> Self {
        Self { client }
    }

    fn collection(&self) -> Collection<PersistedRecord> {
        self.client
            .collection::<PersistedRecord>(self.client.snapshot_collection())
    }

    /// Replace the document for this token id, inserting it if missing
    pub async fn replace_or_insert(
        &self,
        record: &PersistedRecord,
    ) -> mongodb::error::Result<bool> {
        let filter = doc! { "id": record.id() };
        let result = self
            .collection()
            .replace_one(filter, record)
            .upsert(true)
            .await?;

        let inserted = result.upserted_id.is_some();
        debug!(
            "Upserted snapshot for {} (inserted: {}, modified: {})",
            record.id(),
            inserted,
            result.modified_count
        );
        Ok(inserted)
    }

    /// Find stored snapshots for a token, newest first
    pub async fn find_by_id(
        &self,
        id: &str,
        limit: i64,
    ) -> mongodb::error::Result<Vec<PersistedRecord>> {
        let mut cursor = self
            .collection()
            .find(doc! { "id": id })
            .sort(doc! { "timestamp": -1 })
            .limit(limit)
            .await?;
        let mut records = Vec::new();

        while let Some(record) = cursor.try_next().await? {
            records.push(record);
        }

        Ok(records)
    }

    /// Count stored snapshots
    pub async fn count(&self) -> mongodb::error::Result<u64> {
        self.collection().count_documents(doc! {}).await
    }
}

#[async_trait]
impl SnapshotStore for TokenSnapshotRepository {
    async fn upsert(&self, record: &PersistedRecord) -> Result<(), PersistenceError> {
        self.replace_or_insert(record)
            .await
            .map(|_| ())
            .map_err(|e| PersistenceError::Write(e.to_string()))
    }

    async fn history(
        &self,
        id: &str,
        limit: i64,
    ) -> Result<Vec<PersistedRecord>, PersistenceError> {
        self.find_by_id(id, limit)
            .await
            .map_err(|e| PersistenceError::Read(e.to_string()))
    }
}

/// Stand-in used when MongoDB could not be reached at startup
#[derive(Debug, Clone, Default)]
pub struct OfflineSnapshotStore;

#[async_trait]
impl SnapshotStore for OfflineSnapshotStore {
    async fn upsert(&self, _record: &PersistedRecord) -> Result<(), PersistenceError> {
        Err(PersistenceError::Unavailable(
            "MongoDB is not connected".to_string(),
        ))
    }

    async fn history(
        &self,
        _id: &str,
        _limit: i64,
    ) -> Result<Vec<PersistedRecord>, PersistenceError> {
        Err(PersistenceError::Unavailable(
            "MongoDB is not connected".to_string(),
        ))
    }
}
