//! Tile service for one tile set.
//!
//! The TileService is the entry point for tile requests. It orchestrates:
//! - Zoom-range policy and coordinate validation
//! - Cache lookups (fail-open)
//! - Rendering through a [`TileRenderer`], one render per key at a time
//! - Background cache writes
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TileService                              │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                    get_tile()                           │    │
//! │  │  1. Zoom in range?    4. Render (shared per key)        │    │
//! │  │  2. Validate coord    5. Store in background            │    │
//! │  │  3. Check cache       6. Return                         │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │            │
//! │           ▼                    ▼                    ▼            │
//! │   ┌────────────────┐   ┌──────────────┐   ┌──────────────────┐  │
//! │   │ TileCacheStore │   │  in-flight   │   │   TileRenderer   │  │
//! │   └────────────────┘   └──────────────┘   └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Cache Faults
//!
//! A failing cache never fails a request. Read errors are logged and
//! treated as a miss; write errors are logged and the rendered tile is
//! still returned. The response never waits for the cache write.
//!
//! # Concurrent Misses
//!
//! Concurrent misses for the same key share a single render: the first
//! request becomes the leader and publishes its result on a watch channel,
//! later requests wait on it. If the leader is cancelled before finishing,
//! its waiters elect a new leader.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{ConfigError, TileError};
use crate::render::{
    ElevationModel, MapStyle, PoolConfig, PoolStats, RenderPipeline, StyleContextFactory,
    TerrainContextFactory, TileRenderer,
};
use crate::tiling::{TileCoordinate, TileSetDescriptor};

use super::cache::{TileCacheKey, TileCacheStore};
use super::encoder::{ImageTileEncoder, TerrainTileEncoder, HEIGHTMAP_SIZE};
use super::options::{RenderTileOptions, TileFormat};
use super::registry::TileProvider;

// =============================================================================
// Tile Response
// =============================================================================

/// An encoded tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileResponse {
    /// The encoded tile data
    pub data: Bytes,

    /// Wire format of `data`
    pub format: TileFormat,

    /// Whether this tile was served from cache
    pub cache_hit: bool,
}

/// Outcome of a tile request that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum TileLookup {
    Found(TileResponse),

    /// The tile set does not serve this zoom level. Not an error: clients
    /// routinely probe outside the range.
    OutOfBounds {
        zoom: u32,
        minimum_level: u32,
        maximum_level: u32,
    },
}

impl TileLookup {
    /// The response, if a tile was found.
    pub fn into_response(self) -> Option<TileResponse> {
        match self {
            TileLookup::Found(response) => Some(response),
            TileLookup::OutOfBounds { .. } => None,
        }
    }
}

// =============================================================================
// Tile Service
// =============================================================================

type SharedRender = Option<Result<Bytes, TileError>>;

enum Role {
    Leader(watch::Sender<SharedRender>),
    Follower(watch::Receiver<SharedRender>),
}

/// Removes a leader's in-flight entry on every exit path.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashMap<TileCacheKey, watch::Receiver<SharedRender>>>,
    key: &'a TileCacheKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(self.key);
    }
}

/// Cache-then-render façade for a single tile set.
///
/// # Type Parameters
///
/// * `R` - The renderer (usually a [`RenderPipeline`])
///
/// # Example
///
/// ```ignore
/// use tilecast::tile::{RenderTileOptions, TileLookup, VectorTileService};
///
/// let service = VectorTileService::vector(
///     descriptor,
///     style,
///     ImageTileEncoder::new(),
///     PoolConfig::default(),
///     cache,
/// );
///
/// match service.get_tile(TileCoordinate::new(10, 512, 380), &RenderTileOptions::default()).await? {
///     TileLookup::Found(tile) => println!("{} bytes, cache hit: {}", tile.data.len(), tile.cache_hit),
///     TileLookup::OutOfBounds { .. } => println!("no tile at this zoom"),
/// }
/// ```
pub struct TileService<R: TileRenderer> {
    descriptor: TileSetDescriptor,
    tileset: Arc<str>,
    renderer: R,
    cache: Arc<dyn TileCacheStore>,
    in_flight: Mutex<HashMap<TileCacheKey, watch::Receiver<SharedRender>>>,
    /// Detached cache writes; dropping a handle does not cancel the write
    pending_writes: Mutex<Vec<JoinHandle<()>>>,
}

impl<R: TileRenderer> TileService<R> {
    /// Create a service over a renderer and a shared cache store.
    pub fn new(descriptor: TileSetDescriptor, renderer: R, cache: Arc<dyn TileCacheStore>) -> Self {
        Self {
            tileset: Arc::from(descriptor.path.as_str()),
            descriptor,
            renderer,
            cache,
            in_flight: Mutex::new(HashMap::new()),
            pending_writes: Mutex::new(Vec::new()),
        }
    }

    pub fn descriptor(&self) -> &TileSetDescriptor {
        &self.descriptor
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn cache(&self) -> &Arc<dyn TileCacheStore> {
        &self.cache
    }

    /// Get a tile, using the cache when available.
    ///
    /// # Errors
    ///
    /// - [`TileError::Tiling`] for indices outside the zoom level's grid
    /// - [`TileError::InvalidDimensions`] / [`TileError::UnsupportedFormat`]
    ///   for options the renderer cannot produce
    /// - [`TileError::ContextUnavailable`], [`TileError::RenderFailed`],
    ///   [`TileError::EncodeError`] when rendering fails
    ///
    /// Cache faults are never returned.
    pub async fn get_tile(
        &self,
        coord: TileCoordinate,
        options: &RenderTileOptions,
    ) -> Result<TileLookup, TileError> {
        if !self.descriptor.serves_zoom(coord.zoom) {
            debug!(tileset = %self.tileset, z = coord.zoom, "Zoom outside tile set range");
            return Ok(TileLookup::OutOfBounds {
                zoom: coord.zoom,
                minimum_level: self.descriptor.minimum_level,
                maximum_level: self.descriptor.maximum_level,
            });
        }

        coord.validate()?;

        let options = options.resolve(self.descriptor.tile_size, self.renderer.default_format())?;
        self.renderer.validate_options(&options)?;

        if !self.descriptor.has_data_at(coord.zoom) {
            debug!(
                tileset = %self.tileset,
                z = coord.zoom,
                "Zoom outside data levels, rendering anyway"
            );
        }

        let key = TileCacheKey::new(Arc::clone(&self.tileset), coord, options);

        match self.cache.find(&key).await {
            Ok(Some(data)) => {
                debug!(key = %key, "Tile cache hit");
                return Ok(TileLookup::Found(TileResponse {
                    data,
                    format: options.format,
                    cache_hit: true,
                }));
            }
            Ok(None) => {}
            Err(e) => {
                warn!(key = %key, store = self.cache.name(), error = %e, "Tile cache read failed, rendering");
            }
        }

        let data = self.render_shared(&key).await?;

        Ok(TileLookup::Found(TileResponse {
            data,
            format: options.format,
            cache_hit: false,
        }))
    }

    /// Render `key`, joining an in-flight render for the same key if any.
    async fn render_shared(&self, key: &TileCacheKey) -> Result<Bytes, TileError> {
        loop {
            let role = {
                let mut in_flight = self.lock_in_flight();
                match in_flight.get(key) {
                    Some(receiver) => Role::Follower(receiver.clone()),
                    None => {
                        let (sender, receiver) = watch::channel(None);
                        in_flight.insert(key.clone(), receiver);
                        Role::Leader(sender)
                    }
                }
            };

            match role {
                Role::Leader(sender) => {
                    // Declared after `sender` so the entry is gone before
                    // waiters observe the channel closing
                    let _guard = InFlightGuard {
                        in_flight: &self.in_flight,
                        key,
                    };

                    let result = self.renderer.render_tile(&key.coord, &key.options).await;
                    if let Ok(data) = &result {
                        self.spawn_store(key.clone(), data.clone());
                    }
                    sender.send_replace(Some(result.clone()));
                    return result;
                }
                Role::Follower(mut receiver) => {
                    let shared = match receiver.wait_for(Option::is_some).await {
                        Ok(value) => value.clone(),
                        Err(_) => None,
                    };
                    match shared {
                        Some(result) => {
                            debug!(key = %key, "Joined in-flight render");
                            return result;
                        }
                        // Leader abandoned the render; elect a new one
                        None => continue,
                    }
                }
            }
        }
    }

    fn spawn_store(&self, key: TileCacheKey, data: Bytes) {
        if !self.cache.is_enabled() {
            return;
        }

        let cache = Arc::clone(&self.cache);
        let handle = tokio::spawn(async move {
            if let Err(e) = cache.store(&key, data).await {
                warn!(key = %key, store = cache.name(), error = %e, "Tile cache write failed");
            }
        });

        let mut writes = self.lock_writes();
        writes.retain(|write| !write.is_finished());
        writes.push(handle);
    }

    /// Wait for every cache write started so far.
    pub async fn flush_cache_writes(&self) {
        let writes = std::mem::take(&mut *self.lock_writes());
        for write in writes {
            if let Err(e) = write.await {
                warn!(tileset = %self.tileset, error = %e, "Tile cache write task failed");
            }
        }
    }

    /// Number of cache writes still running.
    pub fn pending_cache_writes(&self) -> usize {
        self.lock_writes()
            .iter()
            .filter(|write| !write.is_finished())
            .count()
    }

    /// Flush cache writes and release renderer resources.
    pub async fn shutdown(&self) {
        self.flush_cache_writes().await;
        self.renderer.shutdown().await;
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<TileCacheKey, watch::Receiver<SharedRender>>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_writes(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.pending_writes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl<R: TileRenderer> TileProvider for TileService<R> {
    fn descriptor(&self) -> &TileSetDescriptor {
        &self.descriptor
    }

    fn default_format(&self) -> TileFormat {
        self.renderer.default_format()
    }

    async fn get_tile(
        &self,
        coord: TileCoordinate,
        options: &RenderTileOptions,
    ) -> Result<TileLookup, TileError> {
        TileService::get_tile(self, coord, options).await
    }

    fn pool_stats(&self) -> Option<PoolStats> {
        self.renderer.pool_stats()
    }

    async fn flush_cache_writes(&self) {
        TileService::flush_cache_writes(self).await
    }

    async fn shutdown(&self) {
        TileService::shutdown(self).await
    }
}

// =============================================================================
// Vector and Terrain Variants
// =============================================================================

/// Styled raster tiles (PNG by default).
pub type VectorTileService = TileService<RenderPipeline<StyleContextFactory>>;

/// Heightmap terrain tiles.
pub type TerrainTileService = TileService<RenderPipeline<TerrainContextFactory>>;

impl TileService<RenderPipeline<StyleContextFactory>> {
    /// Build a vector tile service rendering `style`.
    pub fn vector(
        descriptor: TileSetDescriptor,
        style: MapStyle,
        encoder: ImageTileEncoder,
        pool: PoolConfig,
        cache: Arc<dyn TileCacheStore>,
    ) -> Self {
        let pipeline = RenderPipeline::new(StyleContextFactory::new(style), pool, encoder);
        Self::new(descriptor, pipeline, cache)
    }
}

impl TileService<RenderPipeline<TerrainContextFactory>> {
    /// Build a terrain tile service sampling `model`.
    ///
    /// Terrain tile sets must use the heightmap grid size as their tile size.
    pub fn terrain(
        descriptor: TileSetDescriptor,
        model: impl ElevationModel,
        pool: PoolConfig,
        cache: Arc<dyn TileCacheStore>,
    ) -> Result<Self, ConfigError> {
        if descriptor.tile_size != HEIGHTMAP_SIZE {
            return Err(ConfigError::InvalidTileSet {
                path: descriptor.path.clone(),
                reason: format!(
                    "terrain tile sets need tileSize {}, got {}",
                    HEIGHTMAP_SIZE, descriptor.tile_size
                ),
            });
        }

        let encoder = TerrainTileEncoder::new(descriptor.maximum_level);
        let pipeline = RenderPipeline::new(TerrainContextFactory::new(model), pool, encoder);
        Ok(Self::new(descriptor, pipeline, cache))
    }
}

// =============================================================================
// Tests
// =============================================================================
