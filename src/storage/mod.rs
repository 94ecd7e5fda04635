//! Storage backends for the persisted fleet state
//!
//! ## Design
//!
//! - **Trait-based**: `StateBackend` trait allows swapping implementations
//! - **Async**: All operations are async for compatibility with Tokio actors
//! - **Key/value**: one JSON document per entity type, see [`schema`]
//!
//! ## Backends
//!
//! - **SQLite** (default feature): embedded database
//! - **File**: one `<key>.json` per key in a directory
//! - **In-Memory**: no persistence, for testing
//!
//! ## Usage
//!
//! ```no_run
//! use transmission_monitoring::storage::{file::FileBackend, schema};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = FileBackend::new("./state").await?;
//!     let snapshot = schema::load_snapshot(&backend).await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod file;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, StateBackend};
pub use error::{StorageError, StorageResult};
pub use schema::StateKey;
