//! Tile cache stores.
//!
//! A cache store maps a [`TileCacheKey`] (tile set, coordinate, resolved
//! options) to encoded tile bytes. Stores are consulted before rendering and
//! filled after it; the tile service treats every store fault as a miss, so
//! a store never has to be reliable to be useful.
//!
//! # Implementations
//!
//! - [`DisabledTileCache`]: every lookup misses, every store succeeds
//! - [`MemoryTileCache`]: size-bounded LRU of encoded tiles
//! - [`DiskTileCache`](super::disk::DiskTileCache): persistent, one file per tile
//! - [`LayeredTileCache`]: memory LRU in front of another store
//!
//! # Size-Based Eviction
//!
//! The memory cache tracks the total size of cached tiles in bytes and evicts
//! least-recently-used entries when the capacity is exceeded.

use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::CacheError;
use crate::tiling::TileCoordinate;

use super::disk::DiskTileCache;
use super::options::ResolvedOptions;

/// Default memory cache capacity: 64MB
pub const DEFAULT_MEMORY_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
const DEFAULT_MAX_ENTRIES: usize = 10_000;

// =============================================================================
// Cache Key
// =============================================================================

/// Identity of an encoded tile.
///
/// Two keys are equal exactly when the tiles they address are
/// interchangeable: same tile set, same coordinate, same output options.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    /// Tile set path, e.g. `basemaps/light`
    pub tileset: Arc<str>,

    pub coord: TileCoordinate,

    pub options: ResolvedOptions,
}

impl TileCacheKey {
    pub fn new(tileset: impl Into<Arc<str>>, coord: TileCoordinate, options: ResolvedOptions) -> Self {
        Self {
            tileset: tileset.into(),
            coord,
            options,
        }
    }

    /// File name of the tile inside its `z/x` directory.
    ///
    /// `y.ext` for default options, `y@<tag>.ext` otherwise.
    pub fn file_name(&self) -> String {
        let ext = self.options.format.extension();
        match self.options.cache_tag() {
            None => format!("{}.{}", self.coord.y, ext),
            Some(tag) => format!("{}@{}.{}", self.coord.y, tag, ext),
        }
    }

    /// Location of the tile relative to a cache root: `tileset/z/x/<file>`.
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::new();
        for segment in self.tileset.split('/') {
            path.push(segment);
        }
        path.push(self.coord.zoom.to_string());
        path.push(self.coord.x.to_string());
        path.push(self.file_name());
        path
    }
}

impl fmt::Display for TileCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.tileset,
            self.coord.zoom,
            self.coord.x,
            self.file_name()
        )
    }
}

// =============================================================================
// Store Trait
// =============================================================================

/// Key-value store for encoded tiles.
#[async_trait]
pub trait TileCacheStore: Send + Sync + 'static {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// `false` only for the no-op store.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Look a tile up. `Ok(None)` is a miss.
    async fn find(&self, key: &TileCacheKey) -> Result<Option<Bytes>, CacheError>;

    /// Persist a tile. A later `find` for the same key returns these bytes
    /// unless the entry has been evicted or overwritten.
    async fn store(&self, key: &TileCacheKey, data: Bytes) -> Result<(), CacheError>;
}

// =============================================================================
// Disabled Cache
// =============================================================================

/// Store used when caching is turned off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledTileCache;

#[async_trait]
impl TileCacheStore for DisabledTileCache {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn find(&self, _key: &TileCacheKey) -> Result<Option<Bytes>, CacheError> {
        Ok(None)
    }

    async fn store(&self, _key: &TileCacheKey, _data: Bytes) -> Result<(), CacheError> {
        Ok(())
    }
}

// =============================================================================
// Memory Cache
// =============================================================================

struct MemoryState {
    entries: LruCache<TileCacheKey, Bytes>,
    size: usize,
}

/// LRU cache for encoded tiles with size-based capacity.
///
/// # Example
///
/// ```ignore
/// let cache = MemoryTileCache::new();
/// cache.put(key.clone(), tile_data.clone()).await;
/// assert_eq!(cache.get(&key).await, Some(tile_data));
/// ```
pub struct MemoryTileCache {
    state: Mutex<MemoryState>,

    /// Maximum total size in bytes
    max_size: usize,
}

impl MemoryTileCache {
    /// Create a new tile cache with default capacity (64MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CACHE_CAPACITY)
    }

    /// Create a new tile cache with the specified capacity in bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    /// Create a new tile cache with specified capacity and maximum entries.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(MemoryState {
                entries: LruCache::new(max_entries),
                size: 0,
            }),
            max_size,
        }
    }

    /// Get a tile, marking it as recently used.
    pub async fn get(&self, key: &TileCacheKey) -> Option<Bytes> {
        let mut state = self.state.lock().await;
        state.entries.get(key).cloned()
    }

    /// Check if a tile is cached without updating LRU order.
    pub async fn contains(&self, key: &TileCacheKey) -> bool {
        self.state.lock().await.entries.contains(key)
    }

    /// Store a tile, evicting least-recently-used entries to stay within
    /// capacity. Tiles larger than the whole capacity are not cached.
    pub async fn put(&self, key: TileCacheKey, data: Bytes) {
        let data_size = data.len();
        if data_size > self.max_size {
            return;
        }

        let mut state = self.state.lock().await;

        // If key exists, subtract old size first
        if let Some(old_data) = state.entries.peek(&key) {
            state.size = state.size.saturating_sub(old_data.len());
        }

        // Entry-count eviction happens inside `push`
        if let Some((evicted_key, evicted)) = state.entries.push(key.clone(), data) {
            if evicted_key != key {
                state.size = state.size.saturating_sub(evicted.len());
            }
        }
        state.size += data_size;

        while state.size > self.max_size {
            match state.entries.pop_lru() {
                Some((_, evicted)) => state.size = state.size.saturating_sub(evicted.len()),
                None => break,
            }
        }
    }

    /// Get the current number of cached tiles.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Get the current total size of cached tiles in bytes.
    pub async fn size(&self) -> usize {
        self.state.lock().await.size
    }

    /// Get the maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for MemoryTileCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TileCacheStore for MemoryTileCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn find(&self, key: &TileCacheKey) -> Result<Option<Bytes>, CacheError> {
        Ok(self.get(key).await)
    }

    async fn store(&self, key: &TileCacheKey, data: Bytes) -> Result<(), CacheError> {
        self.put(key.clone(), data).await;
        Ok(())
    }
}

// =============================================================================
// Layered Cache
// =============================================================================

/// Memory LRU in front of a slower store.
///
/// Reads check memory first and populate it on a backing hit. Writes go to
/// both layers; a backing write failure is reported after the memory layer
/// has been filled.
pub struct LayeredTileCache {
    memory: MemoryTileCache,
    backing: Arc<dyn TileCacheStore>,
}

impl LayeredTileCache {
    pub fn new(memory: MemoryTileCache, backing: Arc<dyn TileCacheStore>) -> Self {
        Self { memory, backing }
    }

    pub fn memory(&self) -> &MemoryTileCache {
        &self.memory
    }
}

#[async_trait]
impl TileCacheStore for LayeredTileCache {
    fn name(&self) -> &'static str {
        "layered"
    }

    async fn find(&self, key: &TileCacheKey) -> Result<Option<Bytes>, CacheError> {
        if let Some(data) = self.memory.get(key).await {
            return Ok(Some(data));
        }

        let found = self.backing.find(key).await?;
        if let Some(data) = &found {
            self.memory.put(key.clone(), data.clone()).await;
        }
        Ok(found)
    }

    async fn store(&self, key: &TileCacheKey, data: Bytes) -> Result<(), CacheError> {
        self.memory.put(key.clone(), data.clone()).await;
        self.backing.store(key, data).await
    }
}

// =============================================================================
// Construction
// =============================================================================

/// Build the configured cache stack.
///
/// - no `disk_root`: [`DisabledTileCache`], whatever `memory_bytes` says
/// - `disk_root` and `memory_bytes == 0`: [`DiskTileCache`] only
/// - both: [`LayeredTileCache`] over the disk cache
pub async fn build_cache(
    disk_root: Option<&Path>,
    memory_bytes: usize,
) -> Result<Arc<dyn TileCacheStore>, CacheError> {
    let cache: Arc<dyn TileCacheStore> = match (disk_root, memory_bytes) {
        (None, _) => Arc::new(DisabledTileCache),
        (Some(root), 0) => Arc::new(DiskTileCache::open(root).await?),
        (Some(root), bytes) => {
            let disk = Arc::new(DiskTileCache::open(root).await?);
            Arc::new(LayeredTileCache::new(
                MemoryTileCache::with_capacity(bytes),
                disk,
            ))
        }
    };

    info!(
        store = cache.name(),
        disk_root = ?disk_root,
        memory_bytes,
        "Tile cache configured"
    );
    Ok(cache)
}

// =============================================================================
// Tests
// =============================================================================
