//! Tiling-scheme math and tile set descriptors.
//!
//! Pure functions only: mapping `(zoom, x, y)` tile indices to geographic
//! rectangles and back under Web-Mercator, plus the per-tile-set zoom policy.

mod mercator;
mod tileset;

pub use mercator::{
    GeoRectangle, TileCoordinate, WebMercatorTilingScheme, EARTH_RADIUS, MAX_LATITUDE, MAX_ZOOM,
};
pub use tileset::{TileSetDescriptor, DEFAULT_TILE_SIZE, MAX_TILE_SIZE};
