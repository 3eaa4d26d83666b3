//! Tile service integration tests.
//!
//! Tests verify:
//! - Cold and warm requests against the "light-map" tile set
//! - Out-of-range zooms touch neither the pool nor the cache
//! - Cache faults degrade to rendering
//! - Persistent cache layout on disk

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tilecast::render::TileRenderer;
use tilecast::tile::{
    DiskTileCache, LayeredTileCache, MemoryTileCache, RenderTileOptions, TileCacheStore,
    TileFormat, TileLookup,
};
use tilecast::tiling::{TileCoordinate, WebMercatorTilingScheme};

use super::test_utils::{is_png, light_map, spy_service, BrokenCache, CountingCache, SpyFactory};

fn acquisitions(service: &super::test_utils::SpyService) -> u64 {
    service
        .renderer()
        .pool_stats()
        .map(|s| s.acquisitions)
        .unwrap_or_default()
}

// =============================================================================
// Light-Map Scenario
// =============================================================================

#[tokio::test]
async fn test_cold_then_warm_request() {
    let cache = Arc::new(CountingCache::new(Arc::new(MemoryTileCache::new())));
    let factory = SpyFactory::new();
    let spy = Arc::clone(&factory.spy);
    let service = spy_service(light_map(), factory, 4, cache.clone());

    let coord = TileCoordinate::new(10, 512, 380);
    let first = service
        .get_tile(coord, &RenderTileOptions::default())
        .await
        .unwrap()
        .into_response()
        .unwrap();

    assert!(!first.cache_hit);
    assert_eq!(first.format, TileFormat::Png);
    assert!(is_png(&first.data));
    assert_eq!(acquisitions(&service), 1);
    assert_eq!(spy.renders(), 1);

    service.flush_cache_writes().await;
    let keys = cache.stored_keys();
    assert_eq!(keys.len(), 1);
    assert_eq!(&*keys[0].tileset, "light-map");
    assert_eq!(keys[0].coord, coord);
    assert!(keys[0].options.is_default);
    assert_eq!(keys[0].options.width, 512);
    assert_eq!(keys[0].options.height, 512);

    let second = service
        .get_tile(coord, &RenderTileOptions::default())
        .await
        .unwrap()
        .into_response()
        .unwrap();

    assert!(second.cache_hit);
    assert_eq!(second.data, first.data);
    assert_eq!(acquisitions(&service), 1, "warm request must not render");
    assert_eq!(spy.renders(), 1);
}

#[tokio::test]
async fn test_out_of_range_zoom_touches_nothing() {
    let cache = Arc::new(CountingCache::new(Arc::new(MemoryTileCache::new())));
    let service = spy_service(light_map(), SpyFactory::new(), 4, cache.clone());

    let lookup = service
        .get_tile(TileCoordinate::new(20, 0, 0), &RenderTileOptions::default())
        .await
        .unwrap();

    assert_eq!(
        lookup,
        TileLookup::OutOfBounds {
            zoom: 20,
            minimum_level: 4,
            maximum_level: 16,
        }
    );
    assert_eq!(acquisitions(&service), 0);
    assert_eq!(cache.finds(), 0);
    assert_eq!(cache.stores(), 0);

    // Below the range too
    let lookup = service
        .get_tile(TileCoordinate::new(3, 0, 0), &RenderTileOptions::default())
        .await
        .unwrap();
    assert!(matches!(lookup, TileLookup::OutOfBounds { zoom: 3, .. }));
    assert_eq!(cache.finds(), 0);
}

#[tokio::test]
async fn test_repeated_requests_are_identical() {
    let service = spy_service(
        light_map(),
        SpyFactory::new(),
        2,
        Arc::new(MemoryTileCache::new()),
    );

    for zoom in [4, 9, 16] {
        let coord = TileCoordinate::new(zoom, 3, 5);
        let a = service
            .get_tile(coord, &RenderTileOptions::default())
            .await
            .unwrap();
        service.flush_cache_writes().await;
        let b = service
            .get_tile(coord, &RenderTileOptions::default())
            .await
            .unwrap();

        let (a, b) = (a.into_response().unwrap(), b.into_response().unwrap());
        assert_eq!(a.data, b.data);
        assert!(b.cache_hit);
    }
    assert_eq!(acquisitions(&service), 3);
}

// =============================================================================
// Fail-Open Cache
// =============================================================================

#[tokio::test]
async fn test_broken_cache_still_serves() {
    let broken = Arc::new(BrokenCache::default());
    let factory = SpyFactory::new();
    let spy = Arc::clone(&factory.spy);
    let service = spy_service(light_map(), factory, 2, broken.clone());

    let reference = spy_service(
        light_map(),
        SpyFactory::new(),
        1,
        Arc::new(MemoryTileCache::new()),
    );

    for i in 0..5 {
        let coord = TileCoordinate::new(8, i, i);
        let tile = service
            .get_tile(coord, &RenderTileOptions::default())
            .await
            .unwrap()
            .into_response()
            .unwrap();
        let expected = reference
            .get_tile(coord, &RenderTileOptions::default())
            .await
            .unwrap()
            .into_response()
            .unwrap();

        assert!(!tile.cache_hit);
        assert_eq!(tile.data, expected.data);
    }
    service.flush_cache_writes().await;

    assert_eq!(spy.renders(), 5);
    assert_eq!(broken.read_attempts.load(Ordering::SeqCst), 5);
    assert_eq!(broken.write_attempts.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_failed_writes_mean_rerender() {
    let broken = Arc::new(BrokenCache::default());
    broken.fail_writes_only.store(true, Ordering::SeqCst);
    let factory = SpyFactory::new();
    let spy = Arc::clone(&factory.spy);
    let service = spy_service(light_map(), factory, 2, broken);

    let coord = TileCoordinate::new(6, 1, 1);
    for _ in 0..3 {
        service
            .get_tile(coord, &RenderTileOptions::default())
            .await
            .unwrap();
        service.flush_cache_writes().await;
    }
    assert_eq!(spy.renders(), 3);
}

// =============================================================================
// Persistent Cache
// =============================================================================

#[tokio::test]
async fn test_disk_cache_layout() {
    let dir = tempfile::tempdir().unwrap();
    let disk = Arc::new(DiskTileCache::open(dir.path()).await.unwrap());
    let service = spy_service(light_map(), SpyFactory::new(), 2, disk.clone());

    let coord = TileCoordinate::new(10, 512, 380);
    let tile = service
        .get_tile(coord, &RenderTileOptions::default())
        .await
        .unwrap()
        .into_response()
        .unwrap();
    service.flush_cache_writes().await;

    let path = dir.path().join("light-map/10/512/380.png");
    assert_eq!(std::fs::read(&path).unwrap(), tile.data.to_vec());

    // Non-default options live beside the default tile under a tagged name
    let small = RenderTileOptions::default().with_size(256, 256);
    service.get_tile(coord, &small).await.unwrap();
    service.flush_cache_writes().await;

    let mut names: Vec<String> = std::fs::read_dir(dir.path().join("light-map/10/512"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names.len(), 2);
    assert_eq!(names[0], "380.png");
    assert!(names[1].starts_with("380@") && names[1].ends_with(".png"));
    assert_eq!(names[1].len(), "380@".len() + 16 + ".png".len());
}

#[tokio::test]
async fn test_disk_cache_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let coord = TileCoordinate::new(12, 100, 200);

    let first = {
        let disk = Arc::new(DiskTileCache::open(dir.path()).await.unwrap());
        let service = spy_service(light_map(), SpyFactory::new(), 1, disk);
        let tile = service
            .get_tile(coord, &RenderTileOptions::default())
            .await
            .unwrap()
            .into_response()
            .unwrap();
        service.shutdown().await;
        tile
    };

    let factory = SpyFactory::new();
    let spy = Arc::clone(&factory.spy);
    let disk = Arc::new(DiskTileCache::open(dir.path()).await.unwrap());
    let service = spy_service(light_map(), factory, 1, disk);

    let second = service
        .get_tile(coord, &RenderTileOptions::default())
        .await
        .unwrap()
        .into_response()
        .unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.data, first.data);
    assert_eq!(spy.renders(), 0);
}

#[tokio::test]
async fn test_layered_cache_promotes_disk_hits() {
    let dir = tempfile::tempdir().unwrap();
    let disk: Arc<dyn TileCacheStore> = Arc::new(DiskTileCache::open(dir.path()).await.unwrap());
    let coord = TileCoordinate::new(7, 10, 20);

    let seeded = spy_service(light_map(), SpyFactory::new(), 1, Arc::clone(&disk));
    seeded
        .get_tile(coord, &RenderTileOptions::default())
        .await
        .unwrap();
    seeded.flush_cache_writes().await;

    let layered = Arc::new(LayeredTileCache::new(MemoryTileCache::new(), disk));
    let service = spy_service(light_map(), SpyFactory::new(), 1, layered.clone());

    let tile = service
        .get_tile(coord, &RenderTileOptions::default())
        .await
        .unwrap()
        .into_response()
        .unwrap();
    assert!(tile.cache_hit);
    assert_eq!(layered.memory().len().await, 1);
}

// =============================================================================
// Tiling Math
// =============================================================================

#[test]
fn test_tile_rectangles_contain_their_centers() {
    let scheme = WebMercatorTilingScheme::new();

    for zoom in 0..=12u32 {
        let n = 1u32 << zoom;
        let samples = [0, n / 3, n / 2, n.saturating_sub(1)];
        for &x in &samples {
            for &y in &samples {
                let coord = TileCoordinate::new(zoom, x, y);
                let rect = scheme.rectangle_of(&coord).unwrap();
                assert!(rect.west < rect.east, "{}", coord);
                assert!(rect.south < rect.north, "{}", coord);

                let (lon, lat) = scheme.center_of(&rect);
                assert!(rect.contains_strict(lon, lat), "{}", coord);
            }
        }
    }
}
