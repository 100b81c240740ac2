//! The cache registry: named caches, routed operations, metrics.
//!
//! The registry owns every backend instance and is the only component that
//! records hit/miss/eviction metrics. Unknown cache names are not errors:
//! reads return `None`, writes are logged no-ops.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;

use tiercache_core::{
    BackendKind, CacheMetrics, LocalCacheConfig, MetricsRegistry, Result, TierCacheConfig,
};

use crate::backend::{self, Backend};

/// Introspection row for one named cache.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStat {
    pub name: String,
    pub backend: BackendKind,
    pub entries: usize,
    pub max_entries: usize,
    pub remote_connected: bool,
    pub metrics: CacheMetrics,
}

/// Introspection snapshot across the whole registry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub caches: Vec<CacheStat>,
    pub global: CacheMetrics,
}

/// Registry of named caches.
pub struct CacheRegistry {
    caches: DashMap<String, Arc<Backend>>,
    metrics: MetricsRegistry,
    pool: Option<deadpool_redis::Pool>,
    config: TierCacheConfig,
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("caches", &self.names())
            .field("remote_pool", &self.pool.is_some())
            .finish()
    }
}

impl CacheRegistry {
    /// Build a registry from validated configuration.
    ///
    /// Fails only on configuration errors; an unreachable remote store is
    /// not fatal (backends degrade per operation).
    pub fn new(config: TierCacheConfig) -> Result<Self> {
        config.validate()?;
        let pool = backend::create_redis_pool(&config);
        Ok(Self {
            caches: DashMap::new(),
            metrics: MetricsRegistry::new(config.metrics_enabled),
            pool,
            config,
        })
    }

    /// Create (or replace) a named cache and return its handle.
    ///
    /// Re-creating a name swaps in a fresh backend and zeroes the cache's
    /// metrics; handles obtained before the swap keep pointing at the old
    /// backend and must not be reused.
    pub fn create(&self, name: &str, kind: BackendKind, local: LocalCacheConfig) -> Result<Arc<Backend>> {
        local.validate()?;
        let backend = Arc::new(backend::create_backend(
            kind,
            name,
            &local,
            &self.config,
            self.pool.as_ref(),
        ));

        if self.caches.insert(name.to_string(), backend.clone()).is_some() {
            tracing::debug!(cache = %name, "replaced existing cache backend");
        }
        self.metrics.reset(name);
        tracing::info!(cache = %name, kind = %kind, "created cache");
        Ok(backend)
    }

    /// Create a cache with the registry's default local settings.
    pub fn create_default(&self, name: &str) -> Result<Arc<Backend>> {
        self.create(name, self.config.backend, self.config.local.clone())
    }

    /// Handle for a named cache, if it exists.
    pub fn get(&self, name: &str) -> Option<Arc<Backend>> {
        self.caches.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.caches.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Store a value. Writing to an unknown cache is a logged no-op.
    pub async fn put(
        &self,
        name: &str,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let Some(backend) = self.get(name) else {
            tracing::debug!(cache = %name, key = %key, "put against unknown cache ignored");
            return Ok(());
        };
        backend.set(key, value, ttl).await?;
        self.metrics.record_evictions(name, backend.take_evictions());
        Ok(())
    }

    /// Fetch a value, recording a hit or miss.
    pub async fn fetch(&self, name: &str, key: &str) -> Option<Value> {
        let backend = self.get(name)?;
        let result = backend.get(key).await;
        self.metrics.record_evictions(name, backend.take_evictions());
        if result.is_some() {
            self.metrics.record_hit(name);
            tracing::debug!(cache = %name, key = %key, "cache hit");
        } else {
            self.metrics.record_miss(name);
            tracing::debug!(cache = %name, key = %key, "cache miss");
        }
        result
    }

    /// Delete a key. Returns false for unknown caches or absent keys.
    pub async fn delete(&self, name: &str, key: &str) -> bool {
        let Some(backend) = self.get(name) else {
            return false;
        };
        backend.delete(key).await
    }

    /// Remove a named cache and drop its metrics.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.caches.remove(name).is_some();
        if removed {
            self.metrics.remove(name);
            tracing::info!(cache = %name, "removed cache");
        }
        removed
    }

    /// Drop every entry of one cache. Metrics are kept.
    pub async fn clear(&self, name: &str) {
        if let Some(backend) = self.get(name) {
            backend.clear().await;
            tracing::info!(cache = %name, "cleared cache");
        }
    }

    /// Drop every entry of every cache.
    pub async fn clear_all(&self) {
        for name in self.names() {
            self.clear(&name).await;
        }
    }

    /// Metrics for one cache (`Some(name)`) or the global aggregate (`None`).
    pub fn metrics(&self, name: Option<&str>) -> CacheMetrics {
        match name {
            Some(name) => self.metrics.snapshot(name),
            None => self.metrics.global(),
        }
    }

    pub fn reset_metrics(&self, name: Option<&str>) {
        match name {
            Some(name) => self.metrics.reset(name),
            None => self.metrics.reset_all(),
        }
    }

    /// Introspection across all caches.
    pub fn stats(&self) -> RegistryStats {
        let mut caches: Vec<CacheStat> = self
            .caches
            .iter()
            .map(|entry| CacheStat {
                name: entry.key().clone(),
                backend: entry.value().classification(),
                entries: entry.value().len(),
                max_entries: entry.value().max_entries(),
                remote_connected: entry.value().is_remote_connected(),
                metrics: self.metrics.snapshot(entry.key()),
            })
            .collect();
        caches.sort_by(|a, b| a.name.cmp(&b.name));

        RegistryStats {
            caches,
            global: self.metrics.global(),
        }
    }

    /// Drop expired entries across every cache, attributing evictions.
    ///
    /// Correctness never needs this (expiry is lazy); the dashboard tick
    /// calls it to bound memory.
    pub fn sweep_expired(&self) {
        for entry in self.caches.iter() {
            let removed = entry.value().sweep_expired();
            let drained = entry.value().take_evictions();
            if removed > 0 {
                tracing::debug!(cache = %entry.key(), removed, "swept expired entries");
            }
            self.metrics.record_evictions(entry.key(), drained);
        }
    }

    pub fn config(&self) -> &TierCacheConfig {
        &self.config
    }
}
