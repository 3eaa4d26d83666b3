//! Rendering: context abstraction, bounded context pool and the pipeline
//! that turns a tile coordinate into encoded bytes.
//!
//! # Components
//!
//! - [`RenderContext`] / [`ContextFactory`]: the seam where a renderer plugs in
//! - [`RenderContextPool`]: lazily-filled, bounded, fair pool of contexts
//! - [`RenderPipeline`]: acquire, render, release, encode
//! - [`StyleContextFactory`] and [`TerrainContextFactory`]: built-in renderers

mod context;
mod pipeline;
mod pool;
mod style;
mod terrain;

pub use context::{ContextFactory, RenderContext, RenderRequest};
pub use pipeline::{PipelineStage, RenderPipeline, TileRenderer};
pub use pool::{PoolConfig, PoolStats, PooledContext, RenderContextPool, DEFAULT_POOL_SIZE};
pub use style::{parse_color, Color, MapStyle, StyleContext, StyleContextFactory, StyleLayer};
pub use terrain::{ElevationConfig, ElevationModel, TerrainContext, TerrainContextFactory};
