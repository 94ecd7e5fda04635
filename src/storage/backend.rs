//! Storage backend trait definition

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::StorageResult;
use super::schema::StateKey;

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Key/value store for the persisted fleet state
///
/// Each [`StateKey`] maps to one JSON document holding the array of records
/// of one entity type. Backends store the document verbatim; encoding and
/// decoding happen in [`schema`](super::schema).
///
/// Implementations must be `Send + Sync` as they are shared between the
/// daemon and the persistence actor.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Read the document stored under a key, `None` if never written
    async fn load(&self, key: StateKey) -> StorageResult<Option<String>>;

    /// Replace the document stored under a key
    async fn save(&self, key: StateKey, value: String) -> StorageResult<()>;

    /// Delete the document stored under a key (no-op if absent)
    async fn remove(&self, key: StateKey) -> StorageResult<()>;

    /// Check backend health
    ///
    /// Performs a lightweight operation to verify the backend is operational
    /// (e.g., ping database, check directory access).
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
