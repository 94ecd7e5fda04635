//! In-memory storage backend (no persistence)
//!
//! Useful for tests and for running the daemon without a store. All data is
//! lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, StateBackend};
use super::error::StorageResult;
use super::schema::StateKey;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    documents: RwLock<HashMap<StateKey, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateBackend for MemoryBackend {
    async fn load(&self, key: StateKey) -> StorageResult<Option<String>> {
        Ok(self.documents.read().await.get(&key).cloned())
    }

    async fn save(&self, key: StateKey, value: String) -> StorageResult<()> {
        debug!("storing {} bytes under {key}", value.len());
        self.documents.write().await.insert(key, value);
        Ok(())
    }

    async fn remove(&self, key: StateKey) -> StorageResult<()> {
        self.documents.write().await.remove(&key);
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let keys = self.documents.read().await.len();
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("keys".to_string(), keys.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
