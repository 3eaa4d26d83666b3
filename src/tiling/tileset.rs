//! Tile set descriptors.
//!
//! A tile set is one logical tile source: a namespace `path` (for example a
//! style identifier), the zoom range it serves, the sub-range for which the
//! backing data actually exists, and the output tile size. Descriptors are
//! configured once at startup and shared read-only afterwards.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

use super::mercator::MAX_ZOOM;

/// Default edge length of a rendered tile in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Largest accepted tile edge in pixels.
pub const MAX_TILE_SIZE: u32 = 4096;

/// Describes a logical tile source and its zoom policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileSetDescriptor {
    /// Namespace of the tile set, also the first cache path segment
    pub path: String,

    /// Lowest zoom level served
    pub minimum_level: u32,

    /// Highest zoom level served
    pub maximum_level: u32,

    /// Lowest zoom level for which source data exists
    #[serde(default)]
    pub minimum_data_level: Option<u32>,

    /// Highest zoom level for which source data exists
    #[serde(default)]
    pub maximum_data_level: Option<u32>,

    /// Tile edge length in pixels (or samples, for terrain)
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
}

fn default_tile_size() -> u32 {
    DEFAULT_TILE_SIZE
}

impl TileSetDescriptor {
    /// Create a descriptor serving `[minimum_level, maximum_level]` with the
    /// default tile size and data available at every served level.
    pub fn new(path: impl Into<String>, minimum_level: u32, maximum_level: u32) -> Self {
        Self {
            path: path.into(),
            minimum_level,
            maximum_level,
            minimum_data_level: None,
            maximum_data_level: None,
            tile_size: DEFAULT_TILE_SIZE,
        }
    }

    /// Set the range for which backing data exists.
    pub fn with_data_levels(mut self, minimum: u32, maximum: u32) -> Self {
        self.minimum_data_level = Some(minimum);
        self.maximum_data_level = Some(maximum);
        self
    }

    /// Set the tile edge length.
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Whether `zoom` is inside the serving range.
    #[inline]
    pub fn serves_zoom(&self, zoom: u32) -> bool {
        zoom >= self.minimum_level && zoom <= self.maximum_level
    }

    /// Data range, defaulting to the serving range.
    pub fn data_levels(&self) -> (u32, u32) {
        (
            self.minimum_data_level.unwrap_or(self.minimum_level),
            self.maximum_data_level.unwrap_or(self.maximum_level),
        )
    }

    /// Whether source data exists at `zoom` without over- or underzooming.
    pub fn has_data_at(&self, zoom: u32) -> bool {
        let (min, max) = self.data_levels();
        zoom >= min && zoom <= max
    }

    /// Check the descriptor for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidTileSet {
            path: self.path.clone(),
            reason,
        };

        if self.path.is_empty() {
            return Err(invalid("path must not be empty".to_string()));
        }
        if self
            .path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(invalid(
                "path segments must be non-empty and not '.' or '..'".to_string(),
            ));
        }
        if self.minimum_level > self.maximum_level {
            return Err(invalid(format!(
                "minimumLevel {} exceeds maximumLevel {}",
                self.minimum_level, self.maximum_level
            )));
        }
        if self.maximum_level > MAX_ZOOM {
            return Err(invalid(format!(
                "maximumLevel {} exceeds supported zoom {}",
                self.maximum_level, MAX_ZOOM
            )));
        }

        let (data_min, data_max) = self.data_levels();
        if data_min > data_max {
            return Err(invalid(format!(
                "minimumDataLevel {} exceeds maximumDataLevel {}",
                data_min, data_max
            )));
        }
        if data_min < self.minimum_level || data_max > self.maximum_level {
            return Err(invalid(format!(
                "data levels {}-{} fall outside serving levels {}-{}",
                data_min, data_max, self.minimum_level, self.maximum_level
            )));
        }

        if self.tile_size == 0 || self.tile_size > MAX_TILE_SIZE {
            return Err(invalid(format!(
                "tileSize {} must be between 1 and {}",
                self.tile_size, MAX_TILE_SIZE
            )));
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
