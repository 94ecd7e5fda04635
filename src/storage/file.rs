//! Directory-of-JSON-files storage backend
//!
//! Each key lives in `<dir>/<key>.json`. Writes go to a temporary file that
//! is renamed over the target, so a crash never leaves a half-written
//! document behind.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, StateBackend};
use super::error::{StorageError, StorageResult};
use super::schema::StateKey;

#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Open (and create if missing) a state directory
    #[instrument(skip_all)]
    pub async fn new(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        info!("initializing file backend at: {}", dir.display());

        fs::create_dir_all(&dir).await?;
        let metadata = fs::metadata(&dir).await?;
        if !metadata.is_dir() {
            return Err(StorageError::InvalidConfig(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        Ok(Self { dir })
    }

    fn path_for(&self, key: StateKey) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl StateBackend for FileBackend {
    async fn load(&self, key: StateKey) -> StorageResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, value), fields(bytes = value.len()))]
    async fn save(&self, key: StateKey, value: String) -> StorageResult<()> {
        let target = self.path_for(key);
        let temp = self.dir.join(format!(".{key}.json.tmp"));

        fs::write(&temp, value.as_bytes()).await?;
        fs::rename(&temp, &target).await?;

        debug!("wrote {}", target.display());
        Ok(())
    }

    async fn remove(&self, key: StateKey) -> StorageResult<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let mut metadata = HashMap::from([
            ("backend".to_string(), "file".to_string()),
            ("dir".to_string(), self.dir.display().to_string()),
        ]);

        match fs::metadata(&self.dir).await {
            Ok(m) if m.is_dir() && !m.permissions().readonly() => Ok(HealthStatus {
                healthy: true,
                message: "file backend operational".to_string(),
                metadata,
            }),
            Ok(_) => {
                warn!("state directory {} is not writable", self.dir.display());
                metadata.insert("reason".to_string(), "not writable".to_string());
                Ok(HealthStatus {
                    healthy: false,
                    message: "state directory is not writable".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata,
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing file backend (no-op)");
        Ok(())
    }
}
