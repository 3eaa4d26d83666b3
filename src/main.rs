//! tilecast - map and terrain tile server.
//!
//! This binary loads the tile set manifest, builds the cache and render
//! pools, and starts the HTTP server.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tilecast::{
    config::{load_tilesets, Config},
    server::{create_router, RouterConfig},
    tile::{build_cache, TileSetRegistry},
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let tilesets = match load_tilesets(&config.tilesets) {
        Ok(tilesets) => tilesets,
        Err(e) => {
            error!("Failed to load tile sets: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Configuration:");
    info!("  Manifest: {} ({} tile sets)", config.tilesets.display(), tilesets.len());
    info!(
        "  Render pool: {} contexts per tile set, acquire timeout {}",
        config.pool_size,
        match config.pool_acquire_timeout_ms {
            0 => "none".to_string(),
            ms => format!("{}ms", ms),
        }
    );

    let cache = match build_cache(config.cache_root(), config.memory_cache_bytes).await {
        Ok(cache) => cache,
        Err(e) => {
            error!("Failed to open tile cache: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match config.cache_root() {
        Some(root) => {
            info!("  Tile cache: {} ({})", root.display(), cache.name());
            info!(
                "  Memory cache: {}MB",
                config.memory_cache_bytes / (1024 * 1024)
            );
        }
        None => warn!("  Tile cache: disabled, every request renders"),
    }

    let cache_store = cache.name();
    let registry = match TileSetRegistry::from_configs(&tilesets, cache, config.pool_config()) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("Failed to build tile sets: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let router = create_router(
        Arc::clone(&registry),
        build_router_config(&config, cache_store),
    );

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("");
    info!("  Server listening on: http://{}", addr);
    info!("    curl http://{}/health", addr);
    if let Some(path) = registry.paths().first() {
        info!("    curl http://{}/tiles/{}/0/0/0", addr, path);
    }
    info!("");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Stop rendering only once in-flight requests have drained
    registry.shutdown_all().await;

    if let Err(e) = served {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Shutdown complete");
    ExitCode::SUCCESS
}

/// Resolve when the process receives Ctrl-C.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, draining requests"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tilecast=debug,tower_http=debug"
    } else {
        "tilecast=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the command-line Config.
fn build_router_config(config: &Config, cache_store: &'static str) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_cache_store(cache_store)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}
