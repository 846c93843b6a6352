//! Storage for the published playlist snapshot

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::errors::{AppError, AppResult};
use crate::models::PlaylistSnapshot;

#[async_trait]
pub trait PlaylistStore: Send + Sync {
    /// The last saved snapshot, or `None` if nothing was ever published
    async fn load(&self) -> AppResult<Option<PlaylistSnapshot>>;

    async fn save(&self, snapshot: &PlaylistSnapshot) -> AppResult<()>;
}

/// Snapshot kept as a JSON file, replaced atomically on save
#[derive(Debug, Clone)]
pub struct FilePlaylistStore {
    path: PathBuf,
}

impl FilePlaylistStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.playlist_path.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PlaylistStore for FilePlaylistStore {
    async fn load(&self) -> AppResult<Option<PlaylistSnapshot>> {
        let blob = match tokio::fs::read_to_string(&self.path).await {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No saved playlist at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(AppError::persistence(format!(
                    "Cannot read {}: {e}",
                    self.path.display()
                )))
            }
        };
        PlaylistSnapshot::deserialize(&blob).map(Some)
    }

    async fn save(&self, snapshot: &PlaylistSnapshot) -> AppResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let blob = snapshot.serialize()?;
        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, blob).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        info!(
            "Saved playlist snapshot from {} to {}",
            snapshot.timestamp,
            self.path.display()
        );
        Ok(())
    }
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryPlaylistStore {
    snapshot: RwLock<Option<PlaylistSnapshot>>,
}

impl MemoryPlaylistStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlaylistStore for MemoryPlaylistStore {
    async fn load(&self) -> AppResult<Option<PlaylistSnapshot>> {
        Ok(self.snapshot.read().await.clone())
    }

    async fn save(&self, snapshot: &PlaylistSnapshot) -> AppResult<()> {
        *self.snapshot.write().await = Some(snapshot.clone());
        Ok(())
    }
}
