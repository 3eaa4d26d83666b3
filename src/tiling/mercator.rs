//! Web-Mercator tiling scheme.
//!
//! The world between ±[`MAX_LATITUDE`] is a square in projected metres,
//! subdivided into `2^zoom × 2^zoom` tiles at each zoom level. Tile `(0, 0)`
//! is the north-west corner; `y` grows southwards.
//!
//! Latitude is non-linear under the projection, so the visual center of a
//! tile is found by projecting its north and south edges, averaging the
//! projected `y`, and unprojecting. Averaging degrees would shift the camera
//! towards the equator on every tile that is not on it.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TilingError;

/// WGS84 semi-major axis in metres.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Latitude at which the projected world becomes square.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Deepest zoom level the scheme addresses (tile indices stay within `u32`).
pub const MAX_ZOOM: u32 = 30;

// =============================================================================
// Tile Coordinate
// =============================================================================

/// Address of one tile: zoom level, column and row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoordinate {
    pub zoom: u32,
    pub x: u32,
    pub y: u32,
}

impl TileCoordinate {
    /// Create a coordinate without validating it.
    pub const fn new(zoom: u32, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Number of tiles along each axis at `zoom`.
    #[inline]
    pub fn tiles_per_axis(zoom: u32) -> u64 {
        1u64 << zoom.min(63)
    }

    /// Check `zoom ≤ MAX_ZOOM` and `0 ≤ x, y < 2^zoom`.
    pub fn validate(&self) -> Result<(), TilingError> {
        if self.zoom > MAX_ZOOM {
            return Err(TilingError::InvalidZoom {
                zoom: self.zoom,
                max: MAX_ZOOM,
            });
        }

        let limit = Self::tiles_per_axis(self.zoom);
        if u64::from(self.x) >= limit || u64::from(self.y) >= limit {
            return Err(TilingError::InvalidCoordinate {
                zoom: self.zoom,
                x: self.x,
                y: self.y,
                limit,
            });
        }

        Ok(())
    }
}

impl fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

// =============================================================================
// Geographic Rectangle
// =============================================================================

/// Geographic extent in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoRectangle {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoRectangle {
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// Whether `(lon, lat)` lies strictly inside the rectangle.
    pub fn contains_strict(&self, lon: f64, lat: f64) -> bool {
        lon > self.west && lon < self.east && lat > self.south && lat < self.north
    }
}

// =============================================================================
// Tiling Scheme
// =============================================================================

/// Spherical Web-Mercator tiling scheme (EPSG:3857).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WebMercatorTilingScheme {
    radius: f64,
}

impl Default for WebMercatorTilingScheme {
    fn default() -> Self {
        Self::new()
    }
}

impl WebMercatorTilingScheme {
    pub fn new() -> Self {
        Self {
            radius: EARTH_RADIUS,
        }
    }

    /// Half the width of the projected world in metres.
    fn half_extent(&self) -> f64 {
        PI * self.radius
    }

    /// Project degrees to Web-Mercator metres.
    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        let x = self.radius * lon.to_radians();
        let y = self.radius * (FRAC_PI_4 + lat / 2.0).tan().ln();
        (x, y)
    }

    /// Unproject Web-Mercator metres to degrees.
    pub fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        let lon = (x / self.radius).to_degrees();
        let lat = (2.0 * (y / self.radius).exp().atan() - FRAC_PI_2).to_degrees();
        (lon, lat)
    }

    /// Geographic rectangle covered by `coord`.
    pub fn rectangle_of(&self, coord: &TileCoordinate) -> Result<GeoRectangle, TilingError> {
        coord.validate()?;

        let half = self.half_extent();
        let tiles = TileCoordinate::tiles_per_axis(coord.zoom) as f64;
        let tile_span = 2.0 * half / tiles;

        let west_m = -half + f64::from(coord.x) * tile_span;
        let east_m = west_m + tile_span;
        let north_m = half - f64::from(coord.y) * tile_span;
        let south_m = north_m - tile_span;

        let (west, north) = self.unproject(west_m, north_m);
        let (east, south) = self.unproject(east_m, south_m);

        Ok(GeoRectangle {
            west,
            south,
            east,
            north,
        })
    }

    /// Visual center `(lon, lat)` of a rectangle in degrees.
    pub fn center_of(&self, rect: &GeoRectangle) -> (f64, f64) {
        let (_, north_y) = self.project(0.0, rect.north);
        let (_, south_y) = self.project(0.0, rect.south);
        let (_, lat) = self.unproject(0.0, (north_y + south_y) / 2.0);
        ((rect.west + rect.east) / 2.0, lat)
    }

    /// Tile containing `(lon, lat)` at `zoom`.
    pub fn tile_at(&self, lon: f64, lat: f64, zoom: u32) -> Result<TileCoordinate, TilingError> {
        if zoom > MAX_ZOOM {
            return Err(TilingError::InvalidZoom {
                zoom,
                max: MAX_ZOOM,
            });
        }

        let half = self.half_extent();
        let (x_m, y_m) = self.project(lon.clamp(-180.0, 180.0), lat);
        let tiles = TileCoordinate::tiles_per_axis(zoom);
        let tile_span = 2.0 * half / tiles as f64;

        let max_index = (tiles - 1) as f64;
        let x = ((x_m + half) / tile_span).floor().clamp(0.0, max_index);
        let y = ((half - y_m) / tile_span).floor().clamp(0.0, max_index);

        Ok(TileCoordinate::new(zoom, x as u32, y as u32))
    }
}

// =============================================================================
// Tests
// =============================================================================
