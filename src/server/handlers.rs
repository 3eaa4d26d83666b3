//! HTTP request handlers for the tilecast tile API.
//!
//! This module contains the Axum handlers for serving tiles and health checks.
//!
//! # Endpoints
//!
//! - `GET /tiles/{tileset}/{z}/{x}/{y}.{ext}` - Serve a tile
//! - `GET /health` - Health check endpoint

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::TileError;
use crate::render::PoolStats;
use crate::tile::{RenderTileOptions, TileFormat, TileLookup, TileSetRegistry};
use crate::tiling::TileCoordinate;

/// Default Cache-Control max-age in seconds.
const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the tile set registry.
///
/// This is passed to all handlers via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Every configured tile set, by path
    pub registry: Arc<TileSetRegistry>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// Name of the tile cache store, reported by the health check
    pub cache_store: &'static str,
}

impl AppState {
    pub fn new(registry: Arc<TileSetRegistry>) -> Self {
        Self {
            registry,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            cache_store: "disabled",
        }
    }

    pub fn with_cache_max_age(mut self, cache_max_age: u32) -> Self {
        self.cache_max_age = cache_max_age;
        self
    }

    pub fn with_cache_store(mut self, name: &'static str) -> Self {
        self.cache_store = name;
        self
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// A tile path split into its parts.
///
/// Parsed from the wildcard `{tileset...}/{z}/{x}/{y}[.{ext}]`. The tile set
/// path may itself contain slashes (`basemaps/light`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePathParams {
    pub tileset: String,
    pub coord: TileCoordinate,
    /// Format named by the file extension, if there was one
    pub format: Option<TileFormat>,
}

impl TilePathParams {
    pub fn parse(path: &str) -> Result<Self, TileError> {
        let invalid = || TileError::InvalidTilePath {
            path: path.to_string(),
        };

        let trimmed = path.trim_matches('/');
        let mut parts = trimmed.rsplitn(4, '/');
        let file = parts.next().ok_or_else(invalid)?;
        let x = parts.next().ok_or_else(invalid)?;
        let z = parts.next().ok_or_else(invalid)?;
        let tileset = parts.next().filter(|t| !t.is_empty()).ok_or_else(invalid)?;

        let (y, format) = match file.rsplit_once('.') {
            Some((y, ext)) => {
                let format = TileFormat::from_extension(ext).ok_or_else(|| {
                    TileError::UnsupportedFormat {
                        format: ext.to_string(),
                    }
                })?;
                (y, Some(format))
            }
            None => (file, None),
        };

        let zoom = z.parse().map_err(|_| invalid())?;
        let x = x.parse().map_err(|_| invalid())?;
        let y = y.parse().map_err(|_| invalid())?;

        Ok(Self {
            tileset: tileset.to_string(),
            coord: TileCoordinate::new(zoom, x, y),
            format,
        })
    }
}

/// Query parameters for tile requests.
#[derive(Debug, Default, Deserialize)]
pub struct TileQueryParams {
    /// Output width in pixels (defaults to the tile set's tile size)
    pub width: Option<u32>,

    /// Output height in pixels (defaults to the tile set's tile size)
    pub height: Option<u32>,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_request")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code, repeated from the response line
    pub status: u16,
}

impl ErrorResponse {
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: status.as_u16(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,

    /// Tile cache store in use
    pub cache: String,

    /// Registered tile set paths
    pub tilesets: Vec<String>,

    /// Render pool statistics by tile set path
    pub pools: BTreeMap<String, PoolStats>,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert TileError to HTTP response.
///
/// 5xx errors are logged at ERROR, 404 at DEBUG and other 4xx at WARN.
impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            TileError::TileSetNotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),

            TileError::Tiling(_) => (StatusCode::BAD_REQUEST, "invalid_coordinate"),
            TileError::InvalidTilePath { .. } => (StatusCode::BAD_REQUEST, "invalid_path"),
            TileError::UnsupportedFormat { .. } => (StatusCode::BAD_REQUEST, "unsupported_format"),
            TileError::InvalidDimensions { .. } => {
                (StatusCode::BAD_REQUEST, "invalid_dimensions")
            }

            TileError::ContextUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "context_unavailable")
            }

            TileError::RenderFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "render_error"),
            TileError::EncodeError { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error"),
        };
        let message = self.to_string();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);

        (status, Json(error_response)).into_response()
    }
}

/// Wrapper for handler errors to implement IntoResponse.
pub struct HandlerError(pub TileError);

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

impl From<TileError> for HandlerError {
    fn from(err: TileError) -> Self {
        HandlerError(err)
    }
}

impl From<axum::http::Error> for HandlerError {
    fn from(err: axum::http::Error) -> Self {
        HandlerError(TileError::EncodeError {
            message: err.to_string(),
        })
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /tiles/{tileset}/{z}/{x}/{y}.{ext}`
///
/// The extension selects the output format (`png`, `webp`, `jpg`,
/// `terrain`); without one the tile set's default format is used.
///
/// # Query Parameters
///
/// - `width`, `height`: output size in pixels (default: the tile size)
///
/// # Response
///
/// - `200 OK`: encoded tile
/// - `204 No Content`: zoom outside the tile set's serving range
/// - `400 Bad Request`: malformed path, coordinate, format or size
/// - `404 Not Found`: unknown tile set
/// - `503 Service Unavailable`: no render context available
/// - `500 Internal Server Error`: render or encode failure
///
/// # Headers
///
/// - `Content-Type` of the tile format
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Tile-Cache-Hit: true|false`
pub async fn tile_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<TileQueryParams>,
) -> Result<Response, HandlerError> {
    let params = TilePathParams::parse(&path)?;

    let options = RenderTileOptions {
        width: query.width,
        height: query.height,
        format: params.format,
    };

    let lookup = state
        .registry
        .get_tile(&params.tileset, params.coord, &options)
        .await?;

    let response = match lookup {
        TileLookup::Found(tile) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, tile.format.content_type())
            .header(
                header::CACHE_CONTROL,
                format!("public, max-age={}", state.cache_max_age),
            )
            .header("X-Tile-Cache-Hit", tile.cache_hit.to_string())
            .body(Body::from(tile.data))?,
        TileLookup::OutOfBounds { .. } => Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header(
                header::CACHE_CONTROL,
                format!("public, max-age={}", state.cache_max_age),
            )
            .body(Body::empty())?,
    };

    Ok(response)
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "cache": "layered",
///   "tilesets": ["basemaps/light"],
///   "pools": { "basemaps/light": { "capacity": 32, "created": 4, ... } }
/// }
/// ```
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let pools = state
        .registry
        .pool_stats()
        .into_iter()
        .map(|(path, stats)| (path.to_string(), stats))
        .collect();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cache: state.cache_store.to_string(),
        tilesets: state
            .registry
            .paths()
            .into_iter()
            .map(str::to_string)
            .collect(),
        pools,
    })
}

// =============================================================================
// Tests
// =============================================================================
