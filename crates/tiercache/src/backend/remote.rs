//! Remote (Redis-backed) cache with automatic local fallback.
//!
//! Every operation tries the remote store first and falls back to an
//! in-process TTL cache when the remote is unreachable. Successful remote
//! writes are mirrored into the fallback so a later outage still serves
//! recent data. While the remote is marked unhealthy, operations skip it
//! entirely; a PING check, rate-limited to the configured interval, decides
//! when to go back. Remote failures are absorbed here and never surface to
//! callers of `get`/`set`.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use deadpool_redis::Pool;
use redis::AsyncCommands;
use serde::Serialize;
use serde_json::Value;

use tiercache_core::{
    CacheError, ErrorCategory, LocalCacheConfig, RedisConfig, Result, SerializationFormat,
};

use super::codec;
use super::memory::TtlCache;

/// Diagnostics for a remote-backed cache.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCacheInfo {
    pub namespace: String,
    pub connected: bool,
    pub serialization: SerializationFormat,
    pub fallback_entries: usize,
    pub fallback_max_entries: usize,
}

/// Redis-backed cache with local fallback.
pub struct RemoteCache {
    pool: Pool,
    fallback: TtlCache,
    namespace: String,
    format: SerializationFormat,
    default_ttl: Duration,
    command_timeout: Duration,
    recheck_interval: Duration,
    healthy: AtomicBool,
    last_check: Mutex<Instant>,
}

impl std::fmt::Debug for RemoteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCache")
            .field("namespace", &self.namespace)
            .field("connected", &self.is_connected())
            .field("fallback_entries", &self.fallback.len())
            .finish()
    }
}

impl RemoteCache {
    pub fn new(
        pool: Pool,
        namespace: impl Into<String>,
        redis: &RedisConfig,
        local: &LocalCacheConfig,
        format: SerializationFormat,
    ) -> Self {
        Self {
            pool,
            fallback: TtlCache::new(
                local.max_entries,
                Duration::from_secs(local.default_ttl_secs),
            ),
            namespace: namespace.into(),
            format,
            default_ttl: Duration::from_secs(local.default_ttl_secs),
            command_timeout: Duration::from_millis(redis.command_timeout_ms),
            recheck_interval: Duration::from_secs(redis.health_check_interval_secs),
            healthy: AtomicBool::new(true),
            last_check: Mutex::new(Instant::now()),
        }
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    /// Whether the last remote interaction succeeded.
    pub fn is_connected(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Number of entries in the local fallback cache.
    pub fn len(&self) -> usize {
        self.fallback.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fallback.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.fallback.max_entries()
    }

    pub fn sweep_expired(&self) -> u64 {
        self.fallback.sweep_expired()
    }

    pub fn take_evictions(&self) -> u64 {
        self.fallback.take_evictions()
    }

    /// Diagnostics snapshot.
    pub fn info(&self) -> RemoteCacheInfo {
        RemoteCacheInfo {
            namespace: self.namespace.clone(),
            connected: self.is_connected(),
            serialization: self.format,
            fallback_entries: self.fallback.len(),
            fallback_max_entries: self.fallback.max_entries(),
        }
    }

    /// Get a value, preferring the remote store.
    ///
    /// A value found remotely is mirrored into the fallback. A corrupt
    /// stored value is a miss, not an error.
    pub async fn get(&self, key: &str) -> Option<Value> {
        if self.remote_available().await {
            match self.remote_get(key).await {
                Ok(Some(value)) => {
                    self.fallback.set(key, value.clone(), None);
                    return Some(value);
                }
                Ok(None) => return self.fallback.get(key),
                Err(e) if e.category() == ErrorCategory::Serialization => {
                    tracing::warn!(key = %key, error = %e, "stored value undecodable, treating as miss");
                    return None;
                }
                Err(e) => self.mark_unhealthy(&e),
            }
        }
        self.fallback.get(key)
    }

    /// Set a value remotely, mirroring into the fallback.
    ///
    /// A remote outage is absorbed (the write lands in the fallback); a
    /// write-side serialization failure propagates to the caller.
    pub async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let bytes = codec::encode(&value, self.format)?;

        if self.remote_available().await {
            match self.remote_set(key, &bytes, ttl).await {
                Ok(()) => {
                    self.fallback.set(key, value, Some(ttl));
                    return Ok(());
                }
                Err(e) => self.mark_unhealthy(&e),
            }
        }
        self.fallback.set(key, value, Some(ttl));
        Ok(())
    }

    /// Delete a key from both tiers. Returns true if either held it.
    pub async fn delete(&self, key: &str) -> bool {
        let mut removed_remote = false;
        if self.remote_available().await {
            match self.remote_delete(key).await {
                Ok(count) => removed_remote = count > 0,
                Err(e) => self.mark_unhealthy(&e),
            }
        }
        let removed_local = self.fallback.delete(key);
        removed_remote || removed_local
    }

    pub async fn exists(&self, key: &str) -> bool {
        if self.remote_available().await {
            match self.remote_exists(key).await {
                Ok(found) => return found || self.fallback.contains(key),
                Err(e) => self.mark_unhealthy(&e),
            }
        }
        self.fallback.contains(key)
    }

    /// Batch get. The whole batch falls back together on remote failure.
    pub async fn get_many(&self, keys: &[String]) -> Vec<Option<Value>> {
        if self.remote_available().await {
            match self.remote_get_many(keys).await {
                Ok(values) => {
                    for (key, value) in keys.iter().zip(values.iter()) {
                        if let Some(value) = value {
                            self.fallback.set(key, value.clone(), None);
                        }
                    }
                    return values;
                }
                Err(e) => self.mark_unhealthy(&e),
            }
        }
        keys.iter().map(|key| self.fallback.get(key)).collect()
    }

    /// Batch set via a pipeline. Falls back as a whole batch on failure.
    pub async fn set_many(&self, entries: &[(String, Value)], ttl: Option<Duration>) -> Result<()> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut encoded = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            encoded.push((key.as_str(), codec::encode(value, self.format)?));
        }

        if self.remote_available().await {
            match self.remote_set_many(&encoded, ttl).await {
                Ok(()) => {
                    for (key, value) in entries {
                        self.fallback.set(key, value.clone(), Some(ttl));
                    }
                    return Ok(());
                }
                Err(e) => self.mark_unhealthy(&e),
            }
        }
        for (key, value) in entries {
            self.fallback.set(key, value.clone(), Some(ttl));
        }
        Ok(())
    }

    /// Remove every key under this cache's namespace, both tiers.
    pub async fn clear(&self) {
        if self.remote_available().await {
            if let Err(e) = self.remote_clear().await {
                self.mark_unhealthy(&e);
            }
        }
        self.fallback.clear();
    }

    /// Liveness check against the remote store.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: String = self
            .with_timeout("ping", redis::cmd("PING").query_async::<String>(&mut conn))
            .await?;
        Ok(())
    }

    // ==================== remote plumbing ====================

    /// Gate remote calls on health state.
    ///
    /// Healthy: go remote. Unhealthy: only recheck once per interval
    /// (flat interval, no backoff growth); a successful PING clears the flag.
    async fn remote_available(&self) -> bool {
        if self.healthy.load(Ordering::Relaxed) {
            return true;
        }
        if !self.recheck_due() {
            return false;
        }
        match self.ping().await {
            Ok(()) => {
                self.healthy.store(true, Ordering::Relaxed);
                tracing::info!(namespace = %self.namespace, "remote store back online");
                true
            }
            Err(e) => {
                tracing::debug!(namespace = %self.namespace, error = %e, "remote store still down");
                false
            }
        }
    }

    fn recheck_due(&self) -> bool {
        let mut last = self.last_check.lock().unwrap_or_else(PoisonError::into_inner);
        if last.elapsed() >= self.recheck_interval {
            *last = Instant::now();
            true
        } else {
            false
        }
    }

    fn mark_unhealthy(&self, error: &CacheError) {
        if self.healthy.swap(false, Ordering::Relaxed) {
            tracing::warn!(
                namespace = %self.namespace,
                error = %error,
                "remote store unavailable, serving from local fallback"
            );
        }
        *self.last_check.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::remote_unavailable("connect", e.to_string()))
    }

    async fn with_timeout<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CacheError::remote_unavailable(operation, e.to_string())),
            Err(_) => Err(CacheError::remote_unavailable(operation, "command timed out")),
        }
    }

    async fn remote_get(&self, key: &str) -> Result<Option<Value>> {
        let mut conn = self.connection().await?;
        let nkey = self.namespaced(key);
        let bytes: Option<Vec<u8>> = self.with_timeout("get", conn.get(&nkey)).await?;
        match bytes {
            Some(bytes) => Ok(Some(codec::decode(&bytes, self.format)?)),
            None => Ok(None),
        }
    }

    async fn remote_set(&self, key: &str, bytes: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        let nkey = self.namespaced(key);
        let secs = ttl.as_secs().max(1);
        self.with_timeout("set", conn.set_ex::<_, _, ()>(&nkey, bytes, secs))
            .await
    }

    async fn remote_delete(&self, key: &str) -> Result<usize> {
        let mut conn = self.connection().await?;
        let nkey = self.namespaced(key);
        self.with_timeout("delete", conn.del(&nkey)).await
    }

    async fn remote_exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let nkey = self.namespaced(key);
        self.with_timeout("exists", conn.exists(&nkey)).await
    }

    async fn remote_get_many(&self, keys: &[String]) -> Result<Vec<Option<Value>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let nkeys: Vec<String> = keys.iter().map(|k| self.namespaced(k)).collect();
        let rows: Vec<Option<Vec<u8>>> = self.with_timeout("get_many", conn.mget(&nkeys)).await?;

        Ok(rows
            .into_iter()
            .zip(keys)
            .map(|(row, key)| match row {
                Some(bytes) => match codec::decode(&bytes, self.format) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "stored value undecodable, treating as miss");
                        None
                    }
                },
                None => None,
            })
            .collect())
    }

    async fn remote_set_many(&self, entries: &[(&str, Vec<u8>)], ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        let secs = ttl.as_secs().max(1);
        let mut pipe = redis::pipe();
        for (key, bytes) in entries {
            pipe.set_ex(self.namespaced(key), bytes.as_slice(), secs)
                .ignore();
        }
        self.with_timeout("set_many", pipe.query_async::<()>(&mut conn))
            .await
    }

    async fn remote_clear(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}:*", self.namespace);
        let keys: Vec<String> = self.with_timeout("clear", conn.keys(&pattern)).await?;
        if !keys.is_empty() {
            let _: usize = self.with_timeout("clear", conn.del(keys)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_cache() -> RemoteCache {
        // Port 1 refuses connections; the pool itself builds lazily.
        let pool = deadpool_redis::Config::from_url("redis://127.0.0.1:1/0")
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .expect("pool config");
        let redis = RedisConfig {
            enabled: true,
            port: 1,
            connect_timeout_ms: 100,
            command_timeout_ms: 100,
            health_check_interval_secs: 3600,
            ..Default::default()
        };
        RemoteCache::new(
            pool,
            "test",
            &redis,
            &LocalCacheConfig::default(),
            SerializationFormat::Json,
        )
    }

    #[test]
    fn test_namespaced_keys() {
        let cache = unreachable_cache();
        assert_eq!(cache.namespaced("user:1"), "test:user:1");
    }

    #[test]
    fn test_info_reports_namespace_and_fallback() {
        let cache = unreachable_cache();
        let info = cache.info();
        assert_eq!(info.namespace, "test");
        assert!(info.connected);
        assert_eq!(info.fallback_entries, 0);
    }

    #[tokio::test]
    async fn test_unreachable_remote_marks_unhealthy() {
        let cache = unreachable_cache();
        assert_eq!(cache.get("missing").await, None);
        assert!(!cache.is_connected());
    }

    #[tokio::test]
    async fn test_recheck_is_rate_limited_while_down() {
        let cache = unreachable_cache();
        let _ = cache.get("k").await;
        assert!(!cache.is_connected());

        // Interval has not elapsed: the remote must be skipped entirely,
        // which makes this effectively instant.
        let started = Instant::now();
        let _ = cache.get("k").await;
        assert!(started.elapsed() < Duration::from_millis(50));
    }
}
