//! Built-in terrain renderer.
//!
//! A terrain "render" samples an elevation model on a regular grid over the
//! tile rectangle, edges included, so neighbouring tiles share their border
//! samples. The raw output is row-major little-endian `f32` metres, starting
//! at the north-west corner.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::RenderError;

use super::context::{ContextFactory, RenderContext, RenderRequest};

/// Source of elevations in metres.
pub trait ElevationModel: Send + Sync + 'static {
    fn elevation(&self, lon: f64, lat: f64) -> f32;
}

/// Elevation model declared in the tile set manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ElevationConfig {
    /// Constant height everywhere
    Flat {
        #[serde(default)]
        height: f32,
    },

    /// Height rising linearly eastwards: `base + perDegree * lon`
    #[serde(rename_all = "camelCase")]
    Ramp { base: f32, per_degree: f32 },
}

impl Default for ElevationConfig {
    fn default() -> Self {
        ElevationConfig::Flat { height: 0.0 }
    }
}

impl ElevationModel for ElevationConfig {
    fn elevation(&self, lon: f64, _lat: f64) -> f32 {
        match self {
            ElevationConfig::Flat { height } => *height,
            ElevationConfig::Ramp { base, per_degree } => base + per_degree * lon as f32,
        }
    }
}

/// Builds [`TerrainContext`]s over a shared elevation model.
#[derive(Clone)]
pub struct TerrainContextFactory {
    model: Arc<dyn ElevationModel>,
}

impl TerrainContextFactory {
    pub fn new(model: impl ElevationModel) -> Self {
        Self {
            model: Arc::new(model),
        }
    }
}

impl ContextFactory for TerrainContextFactory {
    type Context = TerrainContext;

    fn create(&self) -> Result<TerrainContext, RenderError> {
        Ok(TerrainContext {
            model: Arc::clone(&self.model),
            scratch: Vec::new(),
        })
    }
}

/// Grid sampler for one elevation model.
pub struct TerrainContext {
    model: Arc<dyn ElevationModel>,
    scratch: Vec<f32>,
}

impl RenderContext for TerrainContext {
    fn render(&mut self, request: &RenderRequest) -> Result<Vec<u8>, RenderError> {
        let (width, height) = (request.width as usize, request.height as usize);
        if width < 2 || height < 2 {
            return Err(RenderError::Failed(format!(
                "terrain grid needs at least 2x2 samples, got {}x{}",
                width, height
            )));
        }

        let bounds = &request.bounds;
        let lon_step = bounds.width() / (width - 1) as f64;
        let lat_step = bounds.height() / (height - 1) as f64;

        self.scratch.clear();
        self.scratch.reserve(width * height);
        for row in 0..height {
            let lat = bounds.north - lat_step * row as f64;
            for col in 0..width {
                let lon = bounds.west + lon_step * col as f64;
                self.scratch.push(self.model.elevation(lon, lat));
            }
        }

        Ok(self
            .scratch
            .iter()
            .flat_map(|h| h.to_le_bytes())
            .collect())
    }
}
