//! Output formats and per-request render options.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::TileError;
use crate::tiling::MAX_TILE_SIZE;

/// Number of hex characters kept from the options digest.
const OPTIONS_TAG_LEN: usize = 16;

// =============================================================================
// Tile Format
// =============================================================================

/// Wire format of an encoded tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    Png,
    Webp,
    Jpeg,
    /// Heightmap terrain (65×65 quantized `u16` samples plus masks)
    Terrain,
}

impl TileFormat {
    /// MIME type sent with the tile.
    pub fn content_type(&self) -> &'static str {
        match self {
            TileFormat::Png => "image/png",
            TileFormat::Webp => "image/webp",
            TileFormat::Jpeg => "image/jpeg",
            TileFormat::Terrain => "application/octet-stream",
        }
    }

    /// File extension used in URLs and cache paths.
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Webp => "webp",
            TileFormat::Jpeg => "jpg",
            TileFormat::Terrain => "terrain",
        }
    }

    /// Parse a file extension (case-insensitive, `jpeg` accepted for JPEG).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(TileFormat::Png),
            "webp" => Some(TileFormat::Webp),
            "jpg" | "jpeg" => Some(TileFormat::Jpeg),
            "terrain" => Some(TileFormat::Terrain),
            _ => None,
        }
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TileFormat {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| TileError::UnsupportedFormat {
            format: s.to_string(),
        })
    }
}

// =============================================================================
// Render Options
// =============================================================================

/// Optional overrides supplied with a tile request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct RenderTileOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<TileFormat>,
}

impl RenderTileOptions {
    pub fn with_format(mut self, format: TileFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Fill in defaults from the tile set and validate dimensions.
    pub fn resolve(
        &self,
        tile_size: u32,
        default_format: TileFormat,
    ) -> Result<ResolvedOptions, TileError> {
        let width = self.width.unwrap_or(tile_size);
        let height = self.height.unwrap_or(tile_size);
        let format = self.format.unwrap_or(default_format);

        if width == 0 || height == 0 || width > MAX_TILE_SIZE || height > MAX_TILE_SIZE {
            return Err(TileError::InvalidDimensions { width, height });
        }

        Ok(ResolvedOptions {
            width,
            height,
            format,
            is_default: width == tile_size && height == tile_size && format == default_format,
        })
    }
}

/// Fully-specified render options, part of every cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedOptions {
    pub width: u32,
    pub height: u32,
    pub format: TileFormat,
    /// Whether these equal the tile set's defaults
    pub is_default: bool,
}

impl ResolvedOptions {
    /// Stable tag distinguishing non-default options in cache paths.
    ///
    /// `None` for the tile set defaults, so default tiles live at the bare
    /// `z/x/y.ext` path.
    pub fn cache_tag(&self) -> Option<String> {
        if self.is_default {
            return None;
        }

        let mut hasher = Sha256::new();
        hasher.update(format!(
            "width={};height={};format={}",
            self.width,
            self.height,
            self.format.extension()
        ));
        let digest = hex::encode(hasher.finalize());
        Some(digest[..OPTIONS_TAG_LEN].to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================
