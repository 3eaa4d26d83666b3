//! Built-in software style renderer.
//!
//! Renders MapLibre-style JSON documents without a native engine. Only
//! `background` layers are drawn; other layer types are accepted and
//! skipped, so real styles load unchanged. Native engines plug in through
//! [`ContextFactory`] instead.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{ConfigError, RenderError};

use super::context::{ContextFactory, RenderContext, RenderRequest};

/// The only style specification version accepted.
pub const STYLE_VERSION: u8 = 8;

// =============================================================================
// Style Document
// =============================================================================

/// A parsed map style.
#[derive(Debug, Clone, Deserialize)]
pub struct MapStyle {
    pub version: u8,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub layers: Vec<StyleLayer>,
}

/// One style layer.
#[derive(Debug, Clone, Deserialize)]
pub struct StyleLayer {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub paint: Map<String, Value>,

    #[serde(default)]
    pub layout: Map<String, Value>,

    #[serde(default)]
    pub minzoom: Option<f64>,

    #[serde(default)]
    pub maxzoom: Option<f64>,
}

impl StyleLayer {
    /// Whether the layer draws at `zoom`.
    pub fn is_visible_at(&self, zoom: u32) -> bool {
        let zoom = zoom as f64;
        let hidden = self.layout.get("visibility").and_then(Value::as_str) == Some("none");

        !hidden
            && self.minzoom.map_or(true, |min| zoom >= min)
            && self.maxzoom.map_or(true, |max| zoom < max)
    }

    fn paint_color(&self, property: &str) -> Option<Color> {
        self.paint
            .get(property)
            .and_then(Value::as_str)
            .and_then(parse_color)
    }

    fn paint_number(&self, property: &str) -> Option<f64> {
        self.paint.get(property).and_then(Value::as_f64)
    }
}

impl MapStyle {
    /// Parse a style document.
    pub fn from_json(source: &str, json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            path: source.to_string(),
            message: e.to_string(),
        })
    }

    /// Read and parse a style file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: display.clone(),
            message: e.to_string(),
        })?;
        Self::from_json(&display, &json)
    }

    /// A style with a single opaque background layer.
    pub fn solid(color: &str) -> Self {
        let mut paint = Map::new();
        paint.insert("background-color".into(), Value::String(color.to_string()));
        Self {
            version: STYLE_VERSION,
            name: None,
            layers: vec![StyleLayer {
                id: "background".into(),
                kind: "background".into(),
                paint,
                layout: Map::new(),
                minzoom: None,
                maxzoom: None,
            }],
        }
    }

    /// Composite every visible background layer into a single colour.
    fn background_at(&self, zoom: u32) -> Color {
        self.layers
            .iter()
            .filter(|layer| layer.kind == "background" && layer.is_visible_at(zoom))
            .fold(Color::TRANSPARENT, |below, layer| {
                let color = layer
                    .paint_color("background-color")
                    .unwrap_or(Color::BLACK);
                let opacity = layer
                    .paint_number("background-opacity")
                    .unwrap_or(1.0)
                    .clamp(0.0, 1.0) as f32;
                color.with_alpha(color.a * opacity).over(below)
            })
    }
}

// =============================================================================
// Colours
// =============================================================================

/// Straight-alpha colour: channels 0-255, alpha 0-1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    /// Source-over compositing of `self` onto `below`.
    fn over(self, below: Color) -> Color {
        let a = self.a + below.a * (1.0 - self.a);
        if a <= 0.0 {
            return Color::TRANSPARENT;
        }
        let mix = |top: f32, bottom: f32| (top * self.a + bottom * below.a * (1.0 - self.a)) / a;
        Color::rgba(
            mix(self.r, below.r),
            mix(self.g, below.g),
            mix(self.b, below.b),
            a,
        )
    }

    /// RGBA8 pixel.
    pub fn to_rgba8(self) -> [u8; 4] {
        let channel = |v: f32| v.round().clamp(0.0, 255.0) as u8;
        [
            channel(self.r),
            channel(self.g),
            channel(self.b),
            channel(self.a * 255.0),
        ]
    }
}

/// Parse `#rgb`, `#rrggbb`, `rgb(r, g, b)`, `rgba(r, g, b, a)` or
/// `transparent`.
pub fn parse_color(input: &str) -> Option<Color> {
    let input = input.trim();

    if input.eq_ignore_ascii_case("transparent") {
        return Some(Color::TRANSPARENT);
    }

    if let Some(hex) = input.strip_prefix('#') {
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let digit = |i: usize| u8::from_str_radix(hex.get(i..i + 1)?, 16).ok();
        let pair = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        return match hex.len() {
            3 => Some(Color::rgba(
                (digit(0)? * 17) as f32,
                (digit(1)? * 17) as f32,
                (digit(2)? * 17) as f32,
                1.0,
            )),
            6 => Some(Color::rgba(
                pair(0)? as f32,
                pair(2)? as f32,
                pair(4)? as f32,
                1.0,
            )),
            _ => None,
        };
    }

    let (args, with_alpha) = if let Some(rest) = input.strip_prefix("rgba(") {
        (rest.strip_suffix(')')?, true)
    } else if let Some(rest) = input.strip_prefix("rgb(") {
        (rest.strip_suffix(')')?, false)
    } else {
        return None;
    };

    let parts: Vec<f32> = args
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .ok()?;

    match (parts.as_slice(), with_alpha) {
        ([r, g, b], false) => Some(Color::rgba(*r, *g, *b, 1.0)),
        ([r, g, b, a], true) => Some(Color::rgba(*r, *g, *b, a.clamp(0.0, 1.0))),
        _ => None,
    }
}

// =============================================================================
// Context
// =============================================================================

/// Builds [`StyleContext`]s bound to one style.
#[derive(Debug, Clone)]
pub struct StyleContextFactory {
    style: Arc<MapStyle>,
}

impl StyleContextFactory {
    pub fn new(style: MapStyle) -> Self {
        Self {
            style: Arc::new(style),
        }
    }

    pub fn style(&self) -> &MapStyle {
        &self.style
    }
}

impl ContextFactory for StyleContextFactory {
    type Context = StyleContext;

    fn create(&self) -> Result<StyleContext, RenderError> {
        if self.style.version != STYLE_VERSION {
            return Err(RenderError::Failed(format!(
                "unsupported style version {} (expected {})",
                self.style.version, STYLE_VERSION
            )));
        }
        Ok(StyleContext {
            style: Arc::clone(&self.style),
            frames: 0,
        })
    }
}

/// Software renderer for one style.
#[derive(Debug)]
pub struct StyleContext {
    style: Arc<MapStyle>,
    frames: u64,
}

impl StyleContext {
    /// Number of frames rendered by this context.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl RenderContext for StyleContext {
    fn render(&mut self, request: &RenderRequest) -> Result<Vec<u8>, RenderError> {
        if request.width == 0 || request.height == 0 {
            return Err(RenderError::Failed(format!(
                "empty viewport {}x{}",
                request.width, request.height
            )));
        }

        let pixel = self.style.background_at(request.zoom).to_rgba8();
        self.frames += 1;
        Ok(pixel.repeat(request.pixel_count()))
    }
}

// =============================================================================
// Tests
// =============================================================================
