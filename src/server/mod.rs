//! HTTP server layer for tilecast.
//!
//! A thin transport adapter: it parses tile paths, hands them to the
//! [`TileSetRegistry`](crate::tile::TileSetRegistry) and maps the outcome to
//! HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │          GET /tiles/{tileset}/{z}/{x}/{y}.{ext}                 │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │           routes            │  │
//! │  │ (path parsing, errors)   │  │  (CORS, tracing, router)    │  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    health_handler, tile_handler, AppState, ErrorResponse, HandlerError, HealthResponse,
    TilePathParams, TileQueryParams,
};
pub use routes::{create_router, RouterConfig};
