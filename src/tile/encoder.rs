//! Tile encoders.
//!
//! Encoders turn the raw buffer produced by a render context into the bytes
//! served to clients:
//!
//! - [`ImageTileEncoder`] interprets the buffer as a `width × height` RGBA
//!   raster and writes PNG, lossless WebP or JPEG.
//! - [`TerrainTileEncoder`] interprets the buffer as little-endian `f32`
//!   heights in metres and packs them into the `heightmap-1.0` format.
//!
//! Encoding is CPU-bound and synchronous; the pipeline runs it on a blocking
//! worker thread.

use bytes::{BufMut, Bytes, BytesMut};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};

use crate::error::{RenderError, TileError};
use crate::tiling::TileCoordinate;

use super::options::{ResolvedOptions, TileFormat};

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// Samples per side of a heightmap tile.
pub const HEIGHTMAP_SIZE: u32 = 65;

/// Offset added to heights before quantization, in metres.
pub const HEIGHTMAP_OFFSET: f32 = 1000.0;

/// Quantization steps per metre.
pub const HEIGHTMAP_SCALE: f32 = 5.0;

/// Child mask advertising all four children.
const ALL_CHILDREN: u8 = 0x0F;

// =============================================================================
// Encoder Trait
// =============================================================================

/// Converts raw render output into a wire format.
pub trait TileEncoder: Send + Sync + 'static {
    /// Format used when a request does not name one.
    fn default_format(&self) -> TileFormat;

    /// Whether this encoder can produce `format`.
    fn supports(&self, format: TileFormat) -> bool;

    /// Reject options this encoder cannot honour, before any render work.
    fn validate(&self, options: &ResolvedOptions) -> Result<(), TileError> {
        if self.supports(options.format) {
            Ok(())
        } else {
            Err(TileError::UnsupportedFormat {
                format: options.format.to_string(),
            })
        }
    }

    /// Encode one tile.
    fn encode(
        &self,
        raw: &[u8],
        coord: &TileCoordinate,
        options: &ResolvedOptions,
    ) -> Result<Bytes, TileError>;
}

fn check_buffer(raw: &[u8], expected: usize) -> Result<(), TileError> {
    if raw.len() != expected {
        return Err(RenderError::BufferSize {
            expected,
            actual: raw.len(),
        }
        .into());
    }
    Ok(())
}

fn encode_error(e: impl std::fmt::Display) -> TileError {
    TileError::EncodeError {
        message: e.to_string(),
    }
}

// =============================================================================
// Image Encoder
// =============================================================================

/// RGBA raster encoder for style-rendered tiles.
///
/// # Example
///
/// ```ignore
/// use tilecast::tile::{ImageTileEncoder, TileEncoder};
///
/// let encoder = ImageTileEncoder::new();
/// let png = encoder.encode(&rgba, &coord, &options)?;
/// ```
#[derive(Debug, Clone)]
pub struct ImageTileEncoder {
    jpeg_quality: u8,
    default_format: TileFormat,
}

impl Default for ImageTileEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageTileEncoder {
    /// Create a PNG-by-default encoder with the default JPEG quality.
    pub fn new() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            default_format: TileFormat::Png,
        }
    }

    /// Set the format used when a request does not name one.
    pub fn with_default_format(mut self, format: TileFormat) -> Result<Self, TileError> {
        if !self.supports(format) {
            return Err(TileError::UnsupportedFormat {
                format: format.to_string(),
            });
        }
        self.default_format = format;
        Ok(self)
    }

    /// Set the JPEG quality, clamped to 1-100.
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = clamp_quality(quality);
        self
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    fn encode_png(&self, raw: &[u8], width: u32, height: u32) -> Result<Vec<u8>, TileError> {
        let mut output = Vec::new();
        PngEncoder::new(&mut output)
            .write_image(raw, width, height, ExtendedColorType::Rgba8)
            .map_err(encode_error)?;
        Ok(output)
    }

    fn encode_webp(&self, raw: &[u8], width: u32, height: u32) -> Result<Vec<u8>, TileError> {
        let mut output = Vec::new();
        WebPEncoder::new_lossless(&mut output)
            .write_image(raw, width, height, ExtendedColorType::Rgba8)
            .map_err(encode_error)?;
        Ok(output)
    }

    fn encode_jpeg(&self, raw: &[u8], width: u32, height: u32) -> Result<Vec<u8>, TileError> {
        // JPEG has no alpha channel
        let rgba = RgbaImage::from_raw(width, height, raw.to_vec()).ok_or_else(|| {
            encode_error(format!("buffer does not hold a {}x{} raster", width, height))
        })?;
        let rgb = DynamicImage::ImageRgba8(rgba).to_rgb8();

        let mut output = Vec::new();
        JpegEncoder::new_with_quality(&mut output, self.jpeg_quality)
            .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
            .map_err(encode_error)?;
        Ok(output)
    }
}

impl TileEncoder for ImageTileEncoder {
    fn default_format(&self) -> TileFormat {
        self.default_format
    }

    fn supports(&self, format: TileFormat) -> bool {
        matches!(
            format,
            TileFormat::Png | TileFormat::Webp | TileFormat::Jpeg
        )
    }

    fn encode(
        &self,
        raw: &[u8],
        _coord: &TileCoordinate,
        options: &ResolvedOptions,
    ) -> Result<Bytes, TileError> {
        self.validate(options)?;
        let (width, height) = (options.width, options.height);
        check_buffer(raw, width as usize * height as usize * 4)?;

        let output = match options.format {
            TileFormat::Png => self.encode_png(raw, width, height)?,
            TileFormat::Webp => self.encode_webp(raw, width, height)?,
            TileFormat::Jpeg => self.encode_jpeg(raw, width, height)?,
            TileFormat::Terrain => {
                return Err(TileError::UnsupportedFormat {
                    format: options.format.to_string(),
                })
            }
        };

        Ok(Bytes::from(output))
    }
}

// =============================================================================
// Terrain Encoder
// =============================================================================

/// Packs elevation samples into `heightmap-1.0` tiles.
///
/// Layout: `65 × 65` little-endian `u16` heights, row-major from the
/// north-west corner, each `round((h + 1000) * 5)`; then one child-mask byte
/// and one water-mask byte.
#[derive(Debug, Clone)]
pub struct TerrainTileEncoder {
    max_level: u32,
}

impl TerrainTileEncoder {
    /// Create an encoder for a tile set whose deepest level is `max_level`.
    ///
    /// Tiles at `max_level` advertise no children.
    pub fn new(max_level: u32) -> Self {
        Self { max_level }
    }

    /// Quantize a height in metres.
    pub fn quantize(height: f32) -> u16 {
        if height.is_nan() {
            return 0;
        }
        ((height + HEIGHTMAP_OFFSET) * HEIGHTMAP_SCALE)
            .round()
            .clamp(0.0, u16::MAX as f32) as u16
    }

    /// Recover a height in metres from a quantized sample.
    pub fn dequantize(sample: u16) -> f32 {
        sample as f32 / HEIGHTMAP_SCALE - HEIGHTMAP_OFFSET
    }
}

impl TileEncoder for TerrainTileEncoder {
    fn default_format(&self) -> TileFormat {
        TileFormat::Terrain
    }

    fn supports(&self, format: TileFormat) -> bool {
        format == TileFormat::Terrain
    }

    fn validate(&self, options: &ResolvedOptions) -> Result<(), TileError> {
        if !self.supports(options.format) {
            return Err(TileError::UnsupportedFormat {
                format: options.format.to_string(),
            });
        }
        if options.width != HEIGHTMAP_SIZE || options.height != HEIGHTMAP_SIZE {
            return Err(TileError::InvalidDimensions {
                width: options.width,
                height: options.height,
            });
        }
        Ok(())
    }

    fn encode(
        &self,
        raw: &[u8],
        coord: &TileCoordinate,
        options: &ResolvedOptions,
    ) -> Result<Bytes, TileError> {
        self.validate(options)?;
        let samples = (HEIGHTMAP_SIZE * HEIGHTMAP_SIZE) as usize;
        check_buffer(raw, samples * 4)?;

        let mut output = BytesMut::with_capacity(samples * 2 + 2);
        for chunk in raw.chunks_exact(4) {
            let height = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            output.put_u16_le(Self::quantize(height));
        }

        let child_mask = if coord.zoom < self.max_level {
            ALL_CHILDREN
        } else {
            0
        };
        output.put_u8(child_mask);
        output.put_u8(0);

        Ok(output.freeze())
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Clamp quality to valid range.
///
/// Values below 1 become 1, values above 100 become 100.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
