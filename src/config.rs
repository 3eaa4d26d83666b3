//! Configuration management for tilecast.
//!
//! This module provides:
//! - Command-line arguments via clap
//! - Environment variables with `TILECAST_` prefix
//! - The JSON tile set manifest
//!
//! # Example
//!
//! ```ignore
//! use tilecast::config::{load_tilesets, Config};
//!
//! let config = Config::parse();
//! config.validate()?;
//! let tilesets = load_tilesets(&config.tilesets)?;
//! ```
//!
//! # Environment Variables
//!
//! - `TILECAST_HOST` - Server bind address (default: 0.0.0.0)
//! - `TILECAST_PORT` - Server port (default: 3000)
//! - `TILECAST_TILESETS` - Path to the tile set manifest (required)
//! - `TILECAST_POOL_SIZE` - Render contexts per tile set (default: 32)
//! - `TILECAST_POOL_ACQUIRE_TIMEOUT_MS` - Wait budget for a context, 0 = forever (default: 0)
//! - `TILECAST_CACHE_DIR` - Persistent tile cache root; unset or empty disables it
//! - `TILECAST_MEMORY_CACHE_BYTES` - In-memory layer in front of the cache dir, 0 disables it (default: 64MB)
//! - `TILECAST_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `TILECAST_CORS_ORIGINS` - Allowed CORS origins, comma-separated
//!
//! # Tile Set Manifest
//!
//! ```json
//! [
//!   { "kind": "vector", "path": "basemaps/light", "minimumLevel": 0,
//!     "maximumLevel": 14, "tileSize": 512, "format": "png", "style": "light.json" },
//!   { "kind": "terrain", "path": "terrain", "minimumLevel": 0, "maximumLevel": 12,
//!     "tileSize": 65, "elevation": { "type": "flat", "height": 0 } }
//! ]
//! ```
//!
//! Relative style paths are resolved against the manifest's directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::render::{ElevationConfig, PoolConfig, DEFAULT_POOL_SIZE};
use crate::tile::{TileFormat, DEFAULT_MEMORY_CACHE_CAPACITY};
use crate::tiling::TileSetDescriptor;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

// =============================================================================
// CLI Arguments
// =============================================================================

/// tilecast - A map and terrain tile server.
///
/// Renders tiles on demand with pooled render contexts and caches the
/// encoded results on disk.
#[derive(Parser, Debug, Clone)]
#[command(name = "tilecast")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "TILECAST_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "TILECAST_PORT")]
    pub port: u16,

    /// Path to the JSON tile set manifest.
    #[arg(long, env = "TILECAST_TILESETS")]
    pub tilesets: PathBuf,

    // =========================================================================
    // Render Configuration
    // =========================================================================
    /// Maximum number of render contexts per tile set.
    #[arg(long, default_value_t = DEFAULT_POOL_SIZE, env = "TILECAST_POOL_SIZE")]
    pub pool_size: usize,

    /// How long a request may wait for a render context, in milliseconds.
    ///
    /// 0 waits indefinitely.
    #[arg(long, default_value_t = 0, env = "TILECAST_POOL_ACQUIRE_TIMEOUT_MS")]
    pub pool_acquire_timeout_ms: u64,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Root directory of the persistent tile cache.
    ///
    /// If not specified (or empty), tiles are not persisted.
    #[arg(long, env = "TILECAST_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Size of the in-memory layer in front of the persistent cache, in bytes.
    ///
    /// Ignored without `--cache-dir`. 0 disables it.
    #[arg(long, default_value_t = DEFAULT_MEMORY_CACHE_CAPACITY, env = "TILECAST_MEMORY_CACHE_BYTES")]
    pub memory_cache_bytes: usize,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "TILECAST_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "TILECAST_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.tilesets.as_os_str().is_empty() {
            return Err(
                "Tile set manifest is required. Set --tilesets or TILECAST_TILESETS".to_string(),
            );
        }

        if self.pool_size == 0 {
            return Err("pool_size must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Persistent cache root, `None` when caching to disk is disabled.
    pub fn cache_root(&self) -> Option<&Path> {
        self.cache_dir
            .as_deref()
            .filter(|dir| !dir.as_os_str().is_empty())
    }

    /// Pool settings shared by every tile set.
    pub fn pool_config(&self) -> PoolConfig {
        let timeout = match self.pool_acquire_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        PoolConfig::default()
            .with_max_size(self.pool_size)
            .with_acquire_timeout(timeout)
    }
}

// =============================================================================
// Tile Set Manifest
// =============================================================================

/// Which renderer serves a tile set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileSetKind {
    Vector,
    Terrain,
}

/// One manifest entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileSetConfig {
    pub kind: TileSetKind,

    #[serde(flatten)]
    pub descriptor: TileSetDescriptor,

    /// Default output format (vector tile sets only)
    #[serde(default)]
    pub format: Option<TileFormat>,

    /// Style document (vector tile sets only)
    #[serde(default)]
    pub style: Option<PathBuf>,

    /// Elevation model (terrain tile sets only, flat when omitted)
    #[serde(default)]
    pub elevation: Option<ElevationConfig>,
}

impl TileSetConfig {
    /// Check the entry for consistency with its kind.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.descriptor.validate()?;

        let invalid = |reason: &str| ConfigError::InvalidTileSet {
            path: self.descriptor.path.clone(),
            reason: reason.to_string(),
        };

        match self.kind {
            TileSetKind::Vector => {
                if self.style.is_none() {
                    return Err(invalid("vector tile sets need a style"));
                }
                if self.format == Some(TileFormat::Terrain) {
                    return Err(invalid("vector tile sets cannot serve terrain"));
                }
            }
            TileSetKind::Terrain => {
                if self.style.is_some() {
                    return Err(invalid("terrain tile sets take no style"));
                }
                if matches!(self.format, Some(f) if f != TileFormat::Terrain) {
                    return Err(invalid("terrain tile sets only serve terrain"));
                }
            }
        }

        Ok(())
    }
}

/// Parse a manifest, resolving relative style paths against `base_dir`.
pub fn parse_tilesets(
    source: &str,
    json: &str,
    base_dir: &Path,
) -> Result<Vec<TileSetConfig>, ConfigError> {
    let mut tilesets: Vec<TileSetConfig> =
        serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            path: source.to_string(),
            message: e.to_string(),
        })?;

    let mut seen = HashSet::new();
    for tileset in &mut tilesets {
        tileset.validate()?;
        if !seen.insert(tileset.descriptor.path.clone()) {
            return Err(ConfigError::DuplicateTileSet(
                tileset.descriptor.path.clone(),
            ));
        }
        if let Some(style) = &tileset.style {
            if style.is_relative() {
                tileset.style = Some(base_dir.join(style));
            }
        }
    }

    Ok(tilesets)
}

/// Read and parse the tile set manifest at `path`.
pub fn load_tilesets(path: &Path) -> Result<Vec<TileSetConfig>, ConfigError> {
    let display = path.display().to_string();
    let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: display.clone(),
        message: e.to_string(),
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    parse_tilesets(&display, &json, base_dir)
}

// =============================================================================
// Tests
// =============================================================================
