//! Router configuration for tilecast.
//!
//! This module defines the HTTP routes and applies CORS and request tracing.
//!
//! # Route Structure
//!
//! ```text
//! /health                                    - Health check and pool statistics
//! /tiles/{tileset}/{z}/{x}/{y}.{ext}         - Tile endpoint
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tilecast::server::{create_router, RouterConfig};
//!
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(Arc::new(registry), config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{health_handler, tile_handler, AppState};
use crate::tile::TileSetRegistry;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age for tile responses, in seconds
    pub cache_max_age: u32,

    /// Name of the tile cache store, reported by `/health`
    pub cache_store: &'static str,

    /// Whether to wrap the router in a `TraceLayer`
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: 3600,
            cache_store: "disabled",
            enable_tracing: true,
        }
    }
}

impl RouterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict CORS to specific origins.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_cache_store(mut self, name: &'static str) -> Self {
        self.cache_store = name;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router over a tile set registry.
pub fn create_router(registry: Arc<TileSetRegistry>, config: RouterConfig) -> Router {
    let app_state = AppState::new(registry)
        .with_cache_max_age(config.cache_max_age)
        .with_cache_store(config.cache_store);

    let cors = build_cors_layer(&config);

    // The wildcard keeps multi-segment tile set paths like "basemaps/light"
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/tiles/{*path}", get(tile_handler))
        .with_state(app_state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .expose_headers([http::HeaderName::from_static("x-tile-cache-hit")])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        // No origins allowed
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
