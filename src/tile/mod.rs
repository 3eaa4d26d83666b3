//! Tile service layer.
//!
//! This module turns tile requests into encoded tiles, caching the results.
//!
//! # Architecture
//!
//! The tile service sits between the HTTP layer and the render pipeline:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │     TileSetRegistry (path → service)    │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │TileCacheStore│  │  TileRenderer   │  │
//! │  │ (memory,     │  │  (pool, render, │  │
//! │  │  disk)       │  │   encode)       │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: cache-then-render façade for one tile set
//! - [`TileSetRegistry`]: routes requests to tile sets by path
//! - [`TileCacheStore`]: disabled, memory, disk and layered stores
//! - [`ImageTileEncoder`] / [`TerrainTileEncoder`]: raw output to wire format
//! - [`RenderTileOptions`]: per-request size and format overrides

mod cache;
mod disk;
mod encoder;
mod options;
mod registry;
mod service;

pub use cache::{
    build_cache, DisabledTileCache, LayeredTileCache, MemoryTileCache, TileCacheKey,
    TileCacheStore, DEFAULT_MEMORY_CACHE_CAPACITY,
};
pub use disk::DiskTileCache;
pub use encoder::{
    clamp_quality, ImageTileEncoder, TerrainTileEncoder, TileEncoder, DEFAULT_JPEG_QUALITY,
    HEIGHTMAP_OFFSET, HEIGHTMAP_SCALE, HEIGHTMAP_SIZE, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use options::{RenderTileOptions, ResolvedOptions, TileFormat};
pub use registry::{TileProvider, TileSetRegistry};
pub use service::{TerrainTileService, TileLookup, TileResponse, TileService, VectorTileService};
