//! Tile set registry.
//!
//! Maps tile set paths to the services that serve them. The registry is
//! built once at startup from the manifest and is read-only afterwards, so
//! lookups need no locking.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{TileSetConfig, TileSetKind};
use crate::error::{ConfigError, TileError};
use crate::render::{MapStyle, PoolConfig, PoolStats};
use crate::tiling::{TileCoordinate, TileSetDescriptor};

use super::cache::TileCacheStore;
use super::encoder::ImageTileEncoder;
use super::options::{RenderTileOptions, TileFormat};
use super::service::{TerrainTileService, TileLookup, VectorTileService};

/// Object-safe view of a tile service, so vector and terrain services can
/// share one registry.
#[async_trait]
pub trait TileProvider: Send + Sync {
    fn descriptor(&self) -> &TileSetDescriptor;

    fn default_format(&self) -> TileFormat;

    async fn get_tile(
        &self,
        coord: TileCoordinate,
        options: &RenderTileOptions,
    ) -> Result<TileLookup, TileError>;

    fn pool_stats(&self) -> Option<PoolStats>;

    async fn flush_cache_writes(&self);

    async fn shutdown(&self);
}

/// All configured tile sets, by path.
#[derive(Default, Clone)]
pub struct TileSetRegistry {
    providers: HashMap<String, Arc<dyn TileProvider>>,
}

impl TileSetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every tile set in a manifest over a shared cache store.
    pub fn from_configs(
        configs: &[TileSetConfig],
        cache: Arc<dyn TileCacheStore>,
        pool: PoolConfig,
    ) -> Result<Self, ConfigError> {
        let mut registry = Self::new();

        for config in configs {
            config.validate()?;
            let descriptor = config.descriptor.clone();
            let invalid = |reason: String| ConfigError::InvalidTileSet {
                path: descriptor.path.clone(),
                reason,
            };

            let provider: Arc<dyn TileProvider> = match config.kind {
                TileSetKind::Vector => {
                    let style_path = config
                        .style
                        .as_ref()
                        .ok_or_else(|| invalid("vector tile sets need a style".to_string()))?;
                    let style = MapStyle::load(style_path)?;

                    let mut encoder = ImageTileEncoder::new();
                    if let Some(format) = config.format {
                        encoder = encoder
                            .with_default_format(format)
                            .map_err(|e| invalid(e.to_string()))?;
                    }

                    Arc::new(VectorTileService::vector(
                        descriptor.clone(),
                        style,
                        encoder,
                        pool,
                        Arc::clone(&cache),
                    ))
                }
                TileSetKind::Terrain => {
                    let model = config.elevation.clone().unwrap_or_default();
                    Arc::new(TerrainTileService::terrain(
                        descriptor.clone(),
                        model,
                        pool,
                        Arc::clone(&cache),
                    )?)
                }
            };

            info!(
                tileset = %descriptor.path,
                kind = ?config.kind,
                min_zoom = descriptor.minimum_level,
                max_zoom = descriptor.maximum_level,
                tile_size = descriptor.tile_size,
                "Registered tile set"
            );
            registry.register(provider)?;
        }

        Ok(registry)
    }

    /// Add a tile set. Paths must be unique.
    pub fn register(&mut self, provider: Arc<dyn TileProvider>) -> Result<(), ConfigError> {
        let path = provider.descriptor().path.clone();
        if self.providers.contains_key(&path) {
            return Err(ConfigError::DuplicateTileSet(path));
        }
        self.providers.insert(path, provider);
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&Arc<dyn TileProvider>> {
        self.providers.get(path)
    }

    /// Route a tile request to its tile set.
    pub async fn get_tile(
        &self,
        path: &str,
        coord: TileCoordinate,
        options: &RenderTileOptions,
    ) -> Result<TileLookup, TileError> {
        let provider = self.get(path).ok_or_else(|| TileError::TileSetNotFound {
            path: path.to_string(),
        })?;
        provider.get_tile(coord, options).await
    }

    /// Registered paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Pool statistics of every pooled tile set, by path.
    pub fn pool_stats(&self) -> Vec<(&str, PoolStats)> {
        let mut stats: Vec<(&str, PoolStats)> = self
            .providers
            .iter()
            .filter_map(|(path, provider)| provider.pool_stats().map(|s| (path.as_str(), s)))
            .collect();
        stats.sort_unstable_by_key(|(path, _)| *path);
        stats
    }

    /// Wait for all pending cache writes.
    pub async fn flush_all(&self) {
        for provider in self.providers.values() {
            provider.flush_cache_writes().await;
        }
    }

    /// Flush caches and shut every render pool down.
    pub async fn shutdown_all(&self) {
        for (path, provider) in &self.providers {
            provider.shutdown().await;
            info!(tileset = %path, "Tile set shut down");
        }
    }
}
