//! Test utilities for integration tests.
//!
//! This module provides instrumented render contexts and cache stores, plus
//! helpers for building tile sets and manifests on disk.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use tilecast::error::{CacheError, RenderError};
use tilecast::render::{ContextFactory, PoolConfig, RenderContext, RenderPipeline, RenderRequest};
use tilecast::tile::{ImageTileEncoder, TileCacheKey, TileCacheStore, TileService};
use tilecast::tiling::TileSetDescriptor;

// =============================================================================
// Instrumented Render Contexts
// =============================================================================

/// Counters shared by a [`SpyFactory`] and every context it builds.
#[derive(Default)]
pub struct RenderSpy {
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
    pub rendering: AtomicUsize,
    pub max_rendering: AtomicUsize,
    pub renders: AtomicUsize,
    pub failures: AtomicUsize,
}

impl RenderSpy {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn max_rendering(&self) -> usize {
        self.max_rendering.load(Ordering::SeqCst)
    }

    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

/// Builds [`SpyContext`]s that paint a solid colour, optionally sleeping and
/// failing every `fail_every`-th render.
#[derive(Clone)]
pub struct SpyFactory {
    pub spy: Arc<RenderSpy>,
    pub render_delay: Duration,
    pub fail_every: Option<usize>,
}

impl SpyFactory {
    pub fn new() -> Self {
        Self {
            spy: Arc::new(RenderSpy::default()),
            render_delay: Duration::ZERO,
            fail_every: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    pub fn failing_every(mut self, n: usize) -> Self {
        self.fail_every = Some(n);
        self
    }
}

pub struct SpyContext {
    spy: Arc<RenderSpy>,
    delay: Duration,
    fail_every: Option<usize>,
}

impl RenderContext for SpyContext {
    fn render(&mut self, request: &RenderRequest) -> Result<Vec<u8>, RenderError> {
        let rendering = self.spy.rendering.fetch_add(1, Ordering::SeqCst) + 1;
        self.spy.max_rendering.fetch_max(rendering, Ordering::SeqCst);
        let count = self.spy.renders.fetch_add(1, Ordering::SeqCst) + 1;

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.spy.rendering.fetch_sub(1, Ordering::SeqCst);

        if let Some(n) = self.fail_every {
            if count % n == 0 {
                self.spy.failures.fetch_add(1, Ordering::SeqCst);
                return Err(RenderError::Failed(format!("simulated failure #{}", count)));
            }
        }

        // Shade by zoom so different tiles produce different bytes
        let shade = (request.zoom * 10) as u8;
        Ok([shade, 0x40, 0x80, 0xFF].repeat(request.pixel_count()))
    }
}

impl ContextFactory for SpyFactory {
    type Context = SpyContext;

    fn create(&self) -> Result<SpyContext, RenderError> {
        self.spy.created.fetch_add(1, Ordering::SeqCst);
        let live = self.spy.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.spy.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(SpyContext {
            spy: Arc::clone(&self.spy),
            delay: self.render_delay,
            fail_every: self.fail_every,
        })
    }

    fn destroy(&self, context: SpyContext) {
        self.spy.destroyed.fetch_add(1, Ordering::SeqCst);
        self.spy.live.fetch_sub(1, Ordering::SeqCst);
        drop(context);
    }
}

pub type SpyService = TileService<RenderPipeline<SpyFactory>>;

/// A PNG tile service over a spy factory.
pub fn spy_service(
    descriptor: TileSetDescriptor,
    factory: SpyFactory,
    pool_size: usize,
    cache: Arc<dyn TileCacheStore>,
) -> SpyService {
    let pipeline = RenderPipeline::new(
        factory,
        PoolConfig::default().with_max_size(pool_size),
        ImageTileEncoder::new(),
    );
    TileService::new(descriptor, pipeline, cache)
}

/// The "light-map" tile set used across scenarios.
pub fn light_map() -> TileSetDescriptor {
    TileSetDescriptor::new("light-map", 4, 16).with_tile_size(512)
}

// =============================================================================
// Instrumented Cache Stores
// =============================================================================

/// Wraps a store and counts lookups and writes.
pub struct CountingCache {
    inner: Arc<dyn TileCacheStore>,
    pub finds: AtomicU64,
    pub stores: AtomicU64,
    pub stored_keys: std::sync::Mutex<Vec<TileCacheKey>>,
}

impl CountingCache {
    pub fn new(inner: Arc<dyn TileCacheStore>) -> Self {
        Self {
            inner,
            finds: AtomicU64::new(0),
            stores: AtomicU64::new(0),
            stored_keys: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn finds(&self) -> u64 {
        self.finds.load(Ordering::SeqCst)
    }

    pub fn stores(&self) -> u64 {
        self.stores.load(Ordering::SeqCst)
    }

    pub fn stored_keys(&self) -> Vec<TileCacheKey> {
        self.stored_keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl TileCacheStore for CountingCache {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn find(&self, key: &TileCacheKey) -> Result<Option<Bytes>, CacheError> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.inner.find(key).await
    }

    async fn store(&self, key: &TileCacheKey, data: Bytes) -> Result<(), CacheError> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.stored_keys.lock().unwrap().push(key.clone());
        self.inner.store(key, data).await
    }
}

/// A store whose every read and write fails.
#[derive(Default)]
pub struct BrokenCache {
    pub read_attempts: AtomicU64,
    pub write_attempts: AtomicU64,
    pub fail_writes_only: AtomicBool,
}

#[async_trait]
impl TileCacheStore for BrokenCache {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn find(&self, key: &TileCacheKey) -> Result<Option<Bytes>, CacheError> {
        self.read_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes_only.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Err(CacheError::Read {
            key: key.to_string(),
            message: "disk unplugged".to_string(),
        })
    }

    async fn store(&self, key: &TileCacheKey, _data: Bytes) -> Result<(), CacheError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Write {
            key: key.to_string(),
            message: "disk full".to_string(),
        })
    }
}

// =============================================================================
// Manifest Helpers
// =============================================================================

pub const LIGHT_STYLE: &str = r##"{
    "version": 8,
    "name": "light",
    "layers": [
        { "id": "land", "type": "background", "paint": { "background-color": "#f2efe9" } }
    ]
}"##;

/// Write a style and a two-entry manifest (vector + terrain) into `dir`.
pub fn write_manifest(dir: &Path) -> PathBuf {
    std::fs::write(dir.join("light.json"), LIGHT_STYLE).unwrap();

    let manifest = r#"[
        {
            "kind": "vector",
            "path": "basemaps/light",
            "minimumLevel": 0,
            "maximumLevel": 16,
            "tileSize": 256,
            "style": "light.json"
        },
        {
            "kind": "terrain",
            "path": "terrain",
            "minimumLevel": 0,
            "maximumLevel": 12,
            "tileSize": 65,
            "elevation": { "type": "ramp", "base": 100.0, "perDegree": 2.0 }
        }
    ]"#;
    let path = dir.join("tilesets.json");
    std::fs::write(&path, manifest).unwrap();
    path
}

/// Check for the PNG signature.
pub fn is_png(data: &[u8]) -> bool {
    data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
}
