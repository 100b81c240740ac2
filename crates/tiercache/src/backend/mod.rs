//! Cache backends.
//!
//! A closed set of variants behind one surface: time-expiring memory,
//! LRU-bounded memory, and the remote store with local fallback. The
//! variant is chosen at construction time; callers never branch on it.

pub mod codec;
pub mod memory;
pub mod remote;

use std::time::Duration;

use serde_json::Value;
use tiercache_core::{BackendKind, LocalCacheConfig, Result, TierCacheConfig};

pub use memory::{LruCache, TtlCache};
pub use remote::{RemoteCache, RemoteCacheInfo};

/// A single cache backend instance.
#[derive(Debug)]
pub enum Backend {
    Ttl(TtlCache),
    Lru(LruCache),
    Remote(RemoteCache),
}

impl Backend {
    pub async fn get(&self, key: &str) -> Option<Value> {
        match self {
            Backend::Ttl(cache) => cache.get(key),
            Backend::Lru(cache) => cache.get(key),
            Backend::Remote(cache) => cache.get(key).await,
        }
    }

    pub async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        match self {
            Backend::Ttl(cache) => {
                cache.set(key, value, ttl);
                Ok(())
            }
            Backend::Lru(cache) => {
                cache.set(key, value, ttl);
                Ok(())
            }
            Backend::Remote(cache) => cache.set(key, value, ttl).await,
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        match self {
            Backend::Ttl(cache) => cache.delete(key),
            Backend::Lru(cache) => cache.delete(key),
            Backend::Remote(cache) => cache.delete(key).await,
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        match self {
            Backend::Ttl(cache) => cache.contains(key),
            Backend::Lru(cache) => cache.contains(key),
            Backend::Remote(cache) => cache.exists(key).await,
        }
    }

    pub async fn clear(&self) {
        match self {
            Backend::Ttl(cache) => cache.clear(),
            Backend::Lru(cache) => cache.clear(),
            Backend::Remote(cache) => cache.clear().await,
        }
    }

    /// Number of locally held entries (the fallback tier for remote caches).
    pub fn len(&self) -> usize {
        match self {
            Backend::Ttl(cache) => cache.len(),
            Backend::Lru(cache) => cache.len(),
            Backend::Remote(cache) => cache.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_entries(&self) -> usize {
        match self {
            Backend::Ttl(cache) => cache.max_entries(),
            Backend::Lru(cache) => cache.max_entries(),
            Backend::Remote(cache) => cache.max_entries(),
        }
    }

    /// Runtime classification: memory, or remote/hybrid depending on
    /// whether the remote connection is currently healthy.
    pub fn classification(&self) -> BackendKind {
        match self {
            Backend::Ttl(_) | Backend::Lru(_) => BackendKind::Memory,
            Backend::Remote(cache) => {
                if cache.is_connected() {
                    BackendKind::Hybrid
                } else {
                    BackendKind::Remote
                }
            }
        }
    }

    pub fn is_remote_connected(&self) -> bool {
        match self {
            Backend::Ttl(_) | Backend::Lru(_) => false,
            Backend::Remote(cache) => cache.is_connected(),
        }
    }

    pub fn has_remote(&self) -> bool {
        matches!(self, Backend::Remote(_))
    }

    /// Drop expired entries; returns the number removed.
    pub fn sweep_expired(&self) -> u64 {
        match self {
            Backend::Ttl(cache) => cache.sweep_expired(),
            Backend::Lru(cache) => cache.sweep_expired(),
            Backend::Remote(cache) => cache.sweep_expired(),
        }
    }

    /// Drain evictions accumulated since the last call.
    pub fn take_evictions(&self) -> u64 {
        match self {
            Backend::Ttl(cache) => cache.take_evictions(),
            Backend::Lru(cache) => cache.take_evictions(),
            Backend::Remote(cache) => cache.take_evictions(),
        }
    }
}

/// Build the Redis connection pool described by the configuration.
///
/// Returns `None` (after logging) when Redis is disabled or the pool cannot
/// be constructed, in which case callers degrade to memory backends.
pub fn create_redis_pool(config: &TierCacheConfig) -> Option<deadpool_redis::Pool> {
    let wants_remote = config.redis.enabled
        || matches!(config.backend, BackendKind::Remote | BackendKind::Hybrid);
    if !wants_remote {
        return None;
    }

    let url = config.redis.url();
    tracing::info!(host = %config.redis.host, port = config.redis.port, "connecting to remote store");

    // `from_url` leaves `pool` unset; it must be filled in or the size and
    // timeout settings silently fall back to deadpool's defaults.
    let mut redis_config = deadpool_redis::Config::from_url(&url);
    let pool_config = redis_config
        .pool
        .get_or_insert_with(deadpool_redis::PoolConfig::default);
    pool_config.max_size = config.redis.pool_size;
    let timeout = Duration::from_millis(config.redis.connect_timeout_ms);
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);

    match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => Some(pool),
        Err(e) => {
            tracing::warn!(error = %e, "failed to create remote pool, degrading to memory backends");
            None
        }
    }
}

/// Build a backend for one named cache.
///
/// Remote kinds degrade to a memory TTL backend (with a warning) when no
/// pool is available.
pub fn create_backend(
    kind: BackendKind,
    name: &str,
    local: &LocalCacheConfig,
    config: &TierCacheConfig,
    pool: Option<&deadpool_redis::Pool>,
) -> Backend {
    let ttl = Duration::from_secs(local.default_ttl_secs);
    match kind {
        BackendKind::Memory => match local.eviction {
            tiercache_core::EvictionPolicy::Ttl => Backend::Ttl(TtlCache::new(local.max_entries, ttl)),
            tiercache_core::EvictionPolicy::Lru => {
                Backend::Lru(LruCache::new(local.max_entries, Some(ttl)))
            }
        },
        BackendKind::Remote | BackendKind::Hybrid => match pool {
            Some(pool) => {
                let namespace = format!("{}:{}", config.redis.namespace, name);
                Backend::Remote(RemoteCache::new(
                    pool.clone(),
                    namespace,
                    &config.redis,
                    local,
                    config.serialization,
                ))
            }
            None => {
                tracing::warn!(
                    cache = %name,
                    "remote backend requested but no remote pool available, using memory"
                );
                Backend::Ttl(TtlCache::new(local.max_entries, ttl))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tiercache_core::EvictionPolicy;

    fn local(eviction: EvictionPolicy) -> LocalCacheConfig {
        LocalCacheConfig {
            max_entries: 4,
            default_ttl_secs: 60,
            eviction,
        }
    }

    #[tokio::test]
    async fn test_memory_backend_round_trip() {
        let config = TierCacheConfig::default();
        let backend = create_backend(
            BackendKind::Memory,
            "users",
            &local(EvictionPolicy::Ttl),
            &config,
            None,
        );

        backend.set("a", json!(1), None).await.unwrap();
        assert_eq!(backend.get("a").await, Some(json!(1)));
        assert!(backend.exists("a").await);
        assert!(backend.delete("a").await);
        assert_eq!(backend.get("a").await, None);
    }

    #[test]
    fn test_memory_classification() {
        let config = TierCacheConfig::default();
        let backend = create_backend(
            BackendKind::Memory,
            "users",
            &local(EvictionPolicy::Lru),
            &config,
            None,
        );
        assert_eq!(backend.classification(), BackendKind::Memory);
        assert!(!backend.is_remote_connected());
        assert!(!backend.has_remote());
    }

    #[test]
    fn test_remote_kind_without_pool_degrades_to_memory() {
        let config = TierCacheConfig::default();
        let backend = create_backend(
            BackendKind::Hybrid,
            "users",
            &local(EvictionPolicy::Ttl),
            &config,
            None,
        );
        assert!(matches!(backend, Backend::Ttl(_)));
    }

    #[test]
    fn test_disabled_redis_yields_no_pool() {
        let config = TierCacheConfig::default();
        assert!(create_redis_pool(&config).is_none());
    }

    #[test]
    fn test_pool_carries_configured_size_and_timeouts() {
        let mut config = TierCacheConfig::default();
        config.redis.enabled = true;
        config.redis.pool_size = 3;
        config.redis.connect_timeout_ms = 250;

        // Pool construction is lazy, no server needed.
        let pool = create_redis_pool(&config).expect("pool builds without connecting");
        assert_eq!(pool.status().max_size, 3);

        let timeouts = pool.timeouts();
        let expected = Duration::from_millis(250);
        assert_eq!(timeouts.wait, Some(expected));
        assert_eq!(timeouts.create, Some(expected));
        assert_eq!(timeouts.recycle, Some(expected));
    }
}
