//! Render pipeline: coordinate to encoded tile bytes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       RenderPipeline                          │
//! │                                                               │
//! │  TileCoordinate ──► RenderRequest ──► acquire ──► render ──►  │
//! │                     (center, bounds)   (pool)   (blocking)    │
//! │                                                     │         │
//! │                         Bytes ◄── encode ◄── release          │
//! │                                  (blocking)                   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The context is returned to the pool as soon as the raw buffer exists, so
//! encoding never holds a render slot. Release happens on every path: the
//! context guard lives inside the blocking render task and is dropped there
//! even if the calling request is abandoned.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, error};

use crate::error::{RenderError, TileError};
use crate::tile::{ResolvedOptions, TileEncoder, TileFormat};
use crate::tiling::{TileCoordinate, WebMercatorTilingScheme};

use super::context::{ContextFactory, RenderContext, RenderRequest};
use super::pool::{PoolConfig, PoolStats, RenderContextPool};

// =============================================================================
// Renderer Trait
// =============================================================================

/// Anything that can produce encoded tiles for a tile set.
///
/// The tile service only sees this trait; [`RenderPipeline`] is the
/// production implementation.
#[async_trait]
pub trait TileRenderer: Send + Sync + 'static {
    /// Format used when the request does not name one.
    fn default_format(&self) -> TileFormat;

    /// Reject options this renderer cannot produce, before cache or render.
    fn validate_options(&self, options: &ResolvedOptions) -> Result<(), TileError>;

    /// Render and encode one tile.
    async fn render_tile(
        &self,
        coord: &TileCoordinate,
        options: &ResolvedOptions,
    ) -> Result<Bytes, TileError>;

    /// Pool bookkeeping, if the renderer is pooled.
    fn pool_stats(&self) -> Option<PoolStats> {
        None
    }

    /// Release renderer resources.
    async fn shutdown(&self) {}
}

/// Step of a single render, as reported in logs.
///
/// A failure is logged at error level tagged with the stage it happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    AwaitingContext,
    Rendering,
    Encoding,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::AwaitingContext => "awaiting_context",
            PipelineStage::Rendering => "rendering",
            PipelineStage::Encoding => "encoding",
            PipelineStage::Done => "done",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Pooled render contexts plus an encoder.
pub struct RenderPipeline<F: ContextFactory> {
    scheme: WebMercatorTilingScheme,
    pool: RenderContextPool<F>,
    encoder: Arc<dyn TileEncoder>,
}

impl<F: ContextFactory> RenderPipeline<F> {
    /// Create a pipeline with its own context pool.
    pub fn new(factory: F, pool_config: PoolConfig, encoder: impl TileEncoder) -> Self {
        Self {
            scheme: WebMercatorTilingScheme::new(),
            pool: RenderContextPool::new(factory, pool_config),
            encoder: Arc::new(encoder),
        }
    }

    /// The context pool backing this pipeline.
    pub fn pool(&self) -> &RenderContextPool<F> {
        &self.pool
    }

    async fn render_raw(&self, request: RenderRequest) -> Result<Vec<u8>, TileError> {
        let context = self.pool.acquire().await.map_err(|e| {
            self.log_failure(PipelineStage::AwaitingContext, &request, &e);
            TileError::from(e)
        })?;

        let zoom = request.zoom;
        let center = request.center;
        let joined = tokio::task::spawn_blocking(move || {
            let mut context = context;
            let result = context.render(&request);
            // Back to the pool before the caller sees the result
            drop(context);
            result
        })
        .await;

        match joined {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(e)) => {
                error!(stage = %PipelineStage::Rendering, z = zoom, ?center, error = %e, "Render failed");
                Err(e.into())
            }
            Err(e) => {
                error!(stage = %PipelineStage::Rendering, z = zoom, ?center, error = %e, "Render worker aborted");
                Err(RenderError::Aborted(e.to_string()).into())
            }
        }
    }

    fn log_failure(&self, stage: PipelineStage, request: &RenderRequest, e: &dyn fmt::Display) {
        error!(
            stage = %stage,
            z = request.zoom,
            center = ?request.center,
            capacity = self.pool.capacity(),
            error = %e,
            "Render pipeline failed"
        );
    }
}

#[async_trait]
impl<F: ContextFactory> TileRenderer for RenderPipeline<F> {
    fn default_format(&self) -> TileFormat {
        self.encoder.default_format()
    }

    fn validate_options(&self, options: &ResolvedOptions) -> Result<(), TileError> {
        self.encoder.validate(options)
    }

    async fn render_tile(
        &self,
        coord: &TileCoordinate,
        options: &ResolvedOptions,
    ) -> Result<Bytes, TileError> {
        let started = Instant::now();
        let request = RenderRequest::for_tile(&self.scheme, coord, options.width, options.height)?;

        let raw = self.render_raw(request).await?;

        let encoder = Arc::clone(&self.encoder);
        let (coord, options) = (*coord, *options);
        let encoded = tokio::task::spawn_blocking(move || encoder.encode(&raw, &coord, &options))
            .await
            .map_err(|e| TileError::EncodeError {
                message: format!("encoder aborted: {}", e),
            })
            .and_then(|result| result);

        match encoded {
            Ok(data) => {
                debug!(
                    stage = %PipelineStage::Done,
                    z = coord.zoom,
                    x = coord.x,
                    y = coord.y,
                    format = %options.format,
                    bytes = data.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Rendered tile"
                );
                Ok(data)
            }
            Err(e) => {
                error!(
                    stage = %PipelineStage::Encoding,
                    z = coord.zoom,
                    x = coord.x,
                    y = coord.y,
                    format = %options.format,
                    error = %e,
                    "Tile encoding failed"
                );
                Err(e)
            }
        }
    }

    fn pool_stats(&self) -> Option<PoolStats> {
        Some(self.pool.stats())
    }

    async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

// =============================================================================
// Tests
// =============================================================================
