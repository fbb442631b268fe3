use anyhow::Result;
use std::sync::Arc;

use super::mongodb::MongoDbClient;
use super::repositories::TokenSnapshotRepository;
use crate::config::MongoDbConfig;

/// MongoDB service for managing database operations
///
/// Thin facade over the repository layer; the snapshot repository is handed
/// to the persistence gate as its durable store.
#[derive(Debug, Clone)]
pub struct MongoDbService {
    _client: Arc<MongoDbClient>,
    token_repo: TokenSnapshotRepository,
}

impl MongoDbService {
    /// Create a new MongoDB service
    pub async fn new(config: &MongoDbConfig) -> Result<Self> {
        // Validate configuration
        config.validate()?;
        // Initialize MongoDB client
        let client = MongoDbClient::init(config).await?;

        let token_repo = TokenSnapshotRepository::new(client.clone());

        Ok(Self {
            _client: client,
            token_repo,
        })
    }

    /// Get token snapshot repository
    pub fn get_token_repo(&self) -> &TokenSnapshotRepository {
        &self.token_repo
    }

    /// Count stored snapshots
    pub async fn count_snapshots(&self) -> Result<u64> {
        Ok(self.token_repo.count().await?)
    }
}
