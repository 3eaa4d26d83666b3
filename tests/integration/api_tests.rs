//! API integration tests for tile retrieval and error handling.
//!
//! Tests verify:
//! - Tile retrieval for vector and terrain tile sets built from a manifest
//! - Error cases (unknown tile set, invalid coordinates, unsupported format)
//! - HTTP response codes and headers

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use tilecast::render::PoolConfig;
use tilecast::tile::{build_cache, TileSetRegistry};
use tilecast::{create_router, load_tilesets, RouterConfig};

use super::test_utils::{is_png, write_manifest};

struct TestServer {
    router: Router,
    registry: Arc<TileSetRegistry>,
    _dir: tempfile::TempDir,
}

async fn server() -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_manifest(dir.path());
    let tilesets = load_tilesets(&manifest).unwrap();

    let cache_dir = dir.path().join("cache");
    let cache = build_cache(Some(&cache_dir), 1024 * 1024).await.unwrap();
    let cache_store = cache.name();
    let registry = Arc::new(
        TileSetRegistry::from_configs(&tilesets, cache, PoolConfig::default().with_max_size(2))
            .unwrap(),
    );

    let router = create_router(
        Arc::clone(&registry),
        RouterConfig::new()
            .with_cache_max_age(600)
            .with_cache_store(cache_store)
            .with_tracing(false),
    );

    TestServer {
        router,
        registry,
        _dir: dir,
    }
}

async fn get(router: &Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    router.clone().oneshot(request).await.unwrap()
}

async fn body_bytes(response: Response<Body>) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

async fn error_type(response: Response<Body>) -> String {
    let body = body_bytes(response).await;
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    error["error"].as_str().unwrap().to_string()
}

// =============================================================================
// Tile Retrieval
// =============================================================================

#[tokio::test]
async fn test_vector_tile_success() {
    let server = server().await;

    let response = get(&server.router, "/tiles/basemaps/light/10/512/380.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=600"
    );
    assert_eq!(response.headers().get("x-tile-cache-hit").unwrap(), "false");

    let body = body_bytes(response).await;
    assert!(is_png(&body));

    let decoded = image::load_from_memory(&body).unwrap().to_rgba8();
    assert_eq!(decoded.dimensions(), (256, 256));
    assert_eq!(decoded.get_pixel(0, 0).0, [0xf2, 0xef, 0xe9, 0xff]);
}

#[tokio::test]
async fn test_second_request_hits_cache() {
    let server = server().await;

    let first = body_bytes(get(&server.router, "/tiles/basemaps/light/3/2/1.png").await).await;
    server.registry.flush_all().await;

    let response = get(&server.router, "/tiles/basemaps/light/3/2/1.png").await;
    assert_eq!(response.headers().get("x-tile-cache-hit").unwrap(), "true");
    assert_eq!(body_bytes(response).await, first);
}

#[tokio::test]
async fn test_tile_without_extension_uses_default_format() {
    let server = server().await;

    let response = get(&server.router, "/tiles/basemaps/light/3/2/1").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
}

#[tokio::test]
async fn test_tile_format_and_size_overrides() {
    let server = server().await;

    let response = get(&server.router, "/tiles/basemaps/light/3/2/1.webp?width=64&height=32").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/webp");

    let body = body_bytes(response).await;
    let decoded = image::load_from_memory(&body).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (64, 32));

    let response = get(&server.router, "/tiles/basemaps/light/3/2/1.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/jpeg");
}

#[tokio::test]
async fn test_terrain_tile_success() {
    let server = server().await;

    let response = get(&server.router, "/tiles/terrain/12/0/0.terrain").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/octet-stream"
    );

    let body = body_bytes(response).await;
    assert_eq!(body.len(), 65 * 65 * 2 + 2);
    // Maximum level: no children
    assert_eq!(body[body.len() - 2], 0);

    let response = get(&server.router, "/tiles/terrain/3/1/1.terrain").await;
    let body = body_bytes(response).await;
    assert_eq!(body[body.len() - 2], 0x0F);
}

#[tokio::test]
async fn test_out_of_range_zoom_no_content() {
    let server = server().await;

    let response = get(&server.router, "/tiles/terrain/20/0/0.terrain").await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(response).await.is_empty());

    let stats = server.registry.get("terrain").unwrap().pool_stats().unwrap();
    assert_eq!(stats.acquisitions, 0);
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_unknown_tileset_not_found() {
    let server = server().await;

    let response = get(&server.router, "/tiles/basemaps/dark/3/2/1.png").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_type(response).await, "not_found");
}

#[tokio::test]
async fn test_invalid_coordinate_bad_request() {
    let server = server().await;

    let response = get(&server.router, "/tiles/basemaps/light/2/4/0.png").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_type(response).await, "invalid_coordinate");
}

#[tokio::test]
async fn test_malformed_path_bad_request() {
    let server = server().await;

    let response = get(&server.router, "/tiles/basemaps/light/two/0/0.png").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_type(response).await, "invalid_path");
}

#[tokio::test]
async fn test_unsupported_format_bad_request() {
    let server = server().await;

    let response = get(&server.router, "/tiles/basemaps/light/3/2/1.gif").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_type(response).await, "unsupported_format");

    // Vector tile sets do not produce heightmaps
    let response = get(&server.router, "/tiles/basemaps/light/3/2/1.terrain").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_type(response).await, "unsupported_format");
}

#[tokio::test]
async fn test_invalid_dimensions_bad_request() {
    let server = server().await;

    let response = get(&server.router, "/tiles/basemaps/light/3/2/1.png?width=0").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_type(response).await, "invalid_dimensions");
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_reports_tilesets_and_pools() {
    let server = server().await;
    get(&server.router, "/tiles/basemaps/light/3/2/1.png").await;

    let response = get(&server.router, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_bytes(response).await;
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["cache"], "layered");
    assert_eq!(
        health["tilesets"],
        serde_json::json!(["basemaps/light", "terrain"])
    );
    assert_eq!(health["pools"]["basemaps/light"]["capacity"], 2);
    assert_eq!(health["pools"]["basemaps/light"]["acquisitions"], 1);
    assert_eq!(health["pools"]["terrain"]["created"], 0);
}
