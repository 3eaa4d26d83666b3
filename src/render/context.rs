//! Render context abstraction.
//!
//! A render context is an expensive, stateful handle to a renderer bound to
//! one compiled style (or one terrain source). Contexts are created by a
//! [`ContextFactory`], owned by the pool, and lent to exactly one caller at
//! a time.

use crate::error::{RenderError, TilingError};
use crate::tiling::{GeoRectangle, TileCoordinate, WebMercatorTilingScheme};

/// Camera and viewport for a single render call.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    /// Zoom level of the tile being rendered
    pub zoom: u32,

    /// Camera center as `[longitude, latitude]` in degrees
    pub center: [f64; 2],

    /// Geographic extent of the tile
    pub bounds: GeoRectangle,

    /// Output width in pixels (or samples)
    pub width: u32,

    /// Output height in pixels (or samples)
    pub height: u32,

    /// Always 0 for tiles
    pub bearing: f64,

    /// Always 0 for tiles
    pub pitch: f64,
}

impl RenderRequest {
    /// Build the request for `coord`, centering the camera on the tile's
    /// projected midpoint.
    pub fn for_tile(
        scheme: &WebMercatorTilingScheme,
        coord: &TileCoordinate,
        width: u32,
        height: u32,
    ) -> Result<Self, TilingError> {
        let bounds = scheme.rectangle_of(coord)?;
        let (lon, lat) = scheme.center_of(&bounds);

        Ok(Self {
            zoom: coord.zoom,
            center: [lon, lat],
            bounds,
            width,
            height,
            bearing: 0.0,
            pitch: 0.0,
        })
    }

    /// Number of output pixels.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// A stateful renderer handle.
///
/// Implementations must fully overwrite camera, viewport and output buffer
/// on every call: the same context serves unrelated requests back to back.
pub trait RenderContext: Send + 'static {
    /// Render one frame and return the raw output buffer.
    ///
    /// This call blocks; the pipeline runs it on a blocking worker thread.
    fn render(&mut self, request: &RenderRequest) -> Result<Vec<u8>, RenderError>;
}

/// Builds and tears down render contexts for a pool.
pub trait ContextFactory: Send + Sync + 'static {
    type Context: RenderContext;

    /// Construct a context (load the style, initialise the renderer).
    ///
    /// Called lazily, at most once per pool slot, on a blocking thread.
    fn create(&self) -> Result<Self::Context, RenderError>;

    /// Release native resources held by a context.
    fn destroy(&self, context: Self::Context) {
        drop(context);
    }
}
