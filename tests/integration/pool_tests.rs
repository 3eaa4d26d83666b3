//! Render pool integration tests.
//!
//! Tests verify:
//! - The pool never builds more contexts than its capacity under load
//! - Every borrowed context comes back, including after render failures
//!   and panics
//! - Concurrent misses for one tile share a single render
//! - Acquire timeouts surface as "context unavailable"

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tilecast::error::{PoolError, TileError};
use tilecast::render::{PoolConfig, RenderContextPool, RenderPipeline, TileRenderer};
use tilecast::tile::{
    DisabledTileCache, ImageTileEncoder, MemoryTileCache, RenderTileOptions, TileService,
};
use tilecast::tiling::TileCoordinate;

use super::test_utils::{light_map, spy_service, SpyFactory};

// =============================================================================
// Capacity Under Load
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fifty_requests_two_contexts_with_failures() {
    let factory = SpyFactory::new()
        .with_delay(Duration::from_millis(5))
        .failing_every(3);
    let spy = Arc::clone(&factory.spy);
    let service = Arc::new(spy_service(
        light_map(),
        factory,
        2,
        Arc::new(DisabledTileCache),
    ));

    let mut handles = Vec::new();
    for i in 0..50u32 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service
                .get_tile(
                    TileCoordinate::new(10, i, 7),
                    &RenderTileOptions::default().with_size(16, 16),
                )
                .await
        }));
    }

    let mut ok = 0;
    let mut failed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(TileError::RenderFailed(_)) => failed += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(ok + failed, 50);
    assert_eq!(failed, spy.failures());
    assert!(failed > 0);

    assert!(spy.max_live() <= 2, "built {} contexts", spy.max_live());
    assert!(spy.max_rendering() <= 2);

    let stats = service.renderer().pool_stats().unwrap();
    assert_eq!(stats.in_use, 0, "every acquire must be released");
    assert_eq!(stats.acquisitions, 50);
    assert!(stats.peak_in_use <= 2);
    assert_eq!(stats.created, spy.live());

    service.shutdown().await;
    assert_eq!(spy.live(), 0);
    assert_eq!(spy.created(), spy.destroyed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_survives_panicking_borrowers() {
    let factory = SpyFactory::new();
    let spy = Arc::clone(&factory.spy);
    let pool = RenderContextPool::new(factory, PoolConfig::default().with_max_size(2));

    let mut handles = Vec::new();
    for i in 0..50u32 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let context = pool.acquire().await.unwrap();
            tokio::task::spawn_blocking(move || {
                let _context = context;
                std::thread::sleep(Duration::from_millis(1));
                if i % 7 == 0 {
                    panic!("simulated renderer crash");
                }
            })
            .await
        }));
    }

    let mut panicked = 0;
    for handle in handles {
        if handle.await.unwrap().is_err() {
            panicked += 1;
        }
    }
    assert_eq!(panicked, 8);

    let stats = pool.stats();
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.acquisitions, 50);
    assert!(spy.max_live() <= 2);
    // Contexts dropped during a panic are destroyed, never reused
    assert_eq!(spy.destroyed(), 8);
    assert_eq!(stats.created, spy.live());

    pool.shutdown().await;
    assert!(pool.is_closed());
    assert_eq!(spy.live(), 0);
    assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));
}

// =============================================================================
// Single Flight
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_render_once() {
    let factory = SpyFactory::new().with_delay(Duration::from_millis(50));
    let spy = Arc::clone(&factory.spy);
    let service = Arc::new(spy_service(
        light_map(),
        factory,
        4,
        Arc::new(MemoryTileCache::new()),
    ));

    let coord = TileCoordinate::new(10, 512, 380);
    let mut handles = Vec::new();
    for _ in 0..20 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service
                .get_tile(coord, &RenderTileOptions::default())
                .await
                .unwrap()
                .into_response()
                .unwrap()
        }));
    }

    let mut tiles = Vec::new();
    for handle in handles {
        tiles.push(handle.await.unwrap());
    }

    assert_eq!(spy.renders(), 1);
    assert!(tiles.windows(2).all(|w| w[0].data == w[1].data));
}

// =============================================================================
// Acquire Timeout
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_acquire_timeout_reports_unavailable() {
    let factory = SpyFactory::new().with_delay(Duration::from_millis(300));
    let spy = Arc::clone(&factory.spy);
    let pipeline = RenderPipeline::new(
        factory,
        PoolConfig::default()
            .with_max_size(1)
            .with_acquire_timeout(Some(Duration::from_millis(20))),
        ImageTileEncoder::new(),
    );
    let service = Arc::new(TileService::new(
        light_map(),
        pipeline,
        Arc::new(DisabledTileCache),
    ));

    let busy = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .get_tile(
                    TileCoordinate::new(5, 0, 0),
                    &RenderTileOptions::default().with_size(8, 8),
                )
                .await
        })
    };

    // Let the first request take the only context
    while spy.renders.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let result = service
        .get_tile(
            TileCoordinate::new(5, 1, 1),
            &RenderTileOptions::default().with_size(8, 8),
        )
        .await;
    assert!(matches!(
        result,
        Err(TileError::ContextUnavailable(PoolError::Unavailable { capacity: 1, .. }))
    ));

    assert!(busy.await.unwrap().is_ok());
}
