//! # tilecast
//!
//! A map and terrain tile server built around pooled render contexts and a
//! persistent tile cache.
//!
//! Each tile request is answered from the cache when possible. On a miss a
//! render context is borrowed from a bounded pool, the tile is rendered and
//! encoded, returned to the caller and written back to the cache in the
//! background.
//!
//! ## Features
//!
//! - **Web-Mercator tiling**: tile coordinate validation and geographic bounds
//! - **Bounded render pool**: lazily built contexts, fair waiting, optional timeout
//! - **Persistent cache**: atomic writes to a `z/x/y.ext` directory tree, with an
//!   optional in-memory LRU in front
//! - **Single-flight rendering**: concurrent misses for one tile render once
//! - **Formats**: PNG, WebP, JPEG and the `heightmap-1.0` terrain format
//!
//! ## Architecture
//!
//! - [`tiling`] - Web-Mercator math and tile set descriptors
//! - [`render`] - Render contexts, the context pool and the render pipeline
//! - [`tile`] - Tile services, encoders, cache stores and the tile set registry
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and tile set manifest
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tilecast::{build_cache, create_router, load_tilesets, PoolConfig, RouterConfig, TileSetRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tilesets = load_tilesets(std::path::Path::new("tilesets.json"))?;
//!     let cache = build_cache(Some(std::path::Path::new("/var/cache/tiles")), 64 * 1024 * 1024).await?;
//!     let registry = TileSetRegistry::from_configs(&tilesets, cache, PoolConfig::default())?;
//!
//!     let router = create_router(Arc::new(registry), RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod render;
pub mod server;
pub mod tile;
pub mod tiling;

// Re-export commonly used types
pub use config::{load_tilesets, parse_tilesets, Config, TileSetConfig, TileSetKind};
pub use error::{CacheError, ConfigError, PoolError, RenderError, TileError, TilingError};
pub use render::{
    ContextFactory, ElevationConfig, ElevationModel, MapStyle, PoolConfig, PoolStats,
    PooledContext, RenderContext, RenderContextPool, RenderPipeline, RenderRequest,
    StyleContextFactory, TerrainContextFactory, TileRenderer,
};
pub use server::{create_router, AppState, ErrorResponse, HealthResponse, RouterConfig};
pub use tile::{
    build_cache, DisabledTileCache, DiskTileCache, ImageTileEncoder, LayeredTileCache,
    MemoryTileCache, RenderTileOptions, TerrainTileEncoder, TerrainTileService, TileCacheKey,
    TileCacheStore, TileEncoder, TileFormat, TileLookup, TileProvider, TileResponse, TileService,
    TileSetRegistry, VectorTileService,
};
pub use tiling::{GeoRectangle, TileCoordinate, TileSetDescriptor, WebMercatorTilingScheme};
