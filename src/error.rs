use std::time::Duration;

use thiserror::Error;

/// Errors from tiling-scheme math and coordinate validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TilingError {
    /// Tile indices fall outside the `2^zoom × 2^zoom` grid
    #[error("Invalid tile coordinate {zoom}/{x}/{y}: indices must be below {limit}")]
    InvalidCoordinate {
        zoom: u32,
        x: u32,
        y: u32,
        limit: u64,
    },

    /// Zoom level beyond what the tiling scheme can address
    #[error("Invalid zoom level {zoom}: maximum supported is {max}")]
    InvalidZoom { zoom: u32, max: u32 },
}

/// Errors from the render context pool.
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    /// Every context stayed busy for the whole wait budget
    #[error("Render context unavailable: pool of {capacity} exhausted for {timeout:?}")]
    Unavailable { capacity: usize, timeout: Duration },

    /// Building a fresh context failed (e.g. style assets missing)
    #[error("Render context construction failed: {0}")]
    Construction(String),

    /// The pool has been shut down
    #[error("Render context pool is shut down")]
    Closed,
}

/// Errors raised by a render context while producing raw output.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// The renderer rejected or failed the request
    #[error("Render failed: {0}")]
    Failed(String),

    /// Raw output does not match the requested dimensions
    #[error("Render output has {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    /// The renderer panicked or its worker thread was lost
    #[error("Render worker aborted: {0}")]
    Aborted(String),
}

/// Faults in the tile cache store.
///
/// Both variants are absorbed by the tile service: reads degrade to a miss,
/// writes degrade to "served but not cached".
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Cache read error for {key}: {message}")]
    Read { key: String, message: String },

    #[error("Cache write error for {key}: {message}")]
    Write { key: String, message: String },
}

/// Errors while loading or validating configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid tile set '{path}': {reason}")]
    InvalidTileSet { path: String, reason: String },

    #[error("Duplicate tile set path '{0}'")]
    DuplicateTileSet(String),
}

/// Request-level errors surfaced by the tile service.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Malformed tile indices, rejected before any I/O
    #[error(transparent)]
    Tiling(#[from] TilingError),

    /// No tile set is registered under this path
    #[error("Tile set not found: {path}")]
    TileSetNotFound { path: String },

    /// The tile path could not be parsed into a coordinate and format
    #[error("Invalid tile path: {path}")]
    InvalidTilePath { path: String },

    /// The requested output format is not produced by this tile set
    #[error("Unsupported tile format '{format}'")]
    UnsupportedFormat { format: String },

    /// Requested output dimensions are unusable
    #[error("Invalid tile dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// Pool exhausted or context construction failed; safe to retry later
    #[error(transparent)]
    ContextUnavailable(#[from] PoolError),

    /// Native renderer failed for valid inputs
    #[error(transparent)]
    RenderFailed(#[from] RenderError),

    /// Raw output could not be encoded to the target format
    #[error("Failed to encode tile: {message}")]
    EncodeError { message: String },
}
