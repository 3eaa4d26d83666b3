//! Persistent tile cache on the local filesystem.
//!
//! # Layout
//!
//! ```text
//! <root>/<tileset path>/<z>/<x>/<y>.<ext>          default options
//! <root>/<tileset path>/<z>/<x>/<y>@<tag>.<ext>    other options
//! ```
//!
//! There is no index: a tile is cached exactly when its file exists.
//!
//! # Atomic Writes
//!
//! Tiles are written to a uniquely named temporary file in the destination
//! directory, synced, then renamed over the final path. The temporary file
//! is removed on every other outcome. Readers therefore
//! see either no file or a complete one, and concurrent writers of the same
//! key race only on the rename (last writer wins, both wrote equal bytes).

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::CacheError;

use super::cache::{TileCacheKey, TileCacheStore};

/// Disk-backed [`TileCacheStore`].
#[derive(Debug)]
pub struct DiskTileCache {
    root: PathBuf,
}

impl DiskTileCache {
    /// Use `root` as the cache directory without touching the filesystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the cache directory if needed and return the store.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let cache = Self::new(root);
        tokio::fs::create_dir_all(&cache.root)
            .await
            .map_err(|e| CacheError::Write {
                key: cache.root.display().to_string(),
                message: format!("cannot create cache directory: {}", e),
            })?;
        Ok(cache)
    }

    /// Cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a tile.
    pub fn path_for(&self, key: &TileCacheKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    /// Write `data` to `path` through a temporary file in the same directory.
    ///
    /// Runs on a blocking thread so an abandoned caller cannot interrupt it
    /// between creating the temporary file and renaming or deleting it.
    async fn write_atomic(&self, key: &TileCacheKey, data: Bytes) -> std::io::Result<()> {
        let path = self.path_for(key);
        let prefix = format!(".{}.", key.file_name());

        tokio::task::spawn_blocking(move || write_atomic_blocking(&path, &prefix, &data))
            .await
            .map_err(std::io::Error::other)?
    }
}

fn write_atomic_blocking(path: &Path, prefix: &str, data: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    // Deleted on drop unless persisted
    let mut temp = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".tmp")
        .tempfile_in(parent)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl TileCacheStore for DiskTileCache {
    fn name(&self) -> &'static str {
        "disk"
    }

    async fn find(&self, key: &TileCacheKey) -> Result<Option<Bytes>, CacheError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::Read {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn store(&self, key: &TileCacheKey, data: Bytes) -> Result<(), CacheError> {
        let len = data.len();
        self.write_atomic(key, data)
            .await
            .map_err(|e| CacheError::Write {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        debug!(key = %key, bytes = len, "Stored tile on disk");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
