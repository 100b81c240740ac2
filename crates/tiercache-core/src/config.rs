//! Configuration surface for the cache layer.
//!
//! All structs deserialize from the application's configuration sources with
//! per-field defaults, so a partial config file is always valid. `validate()`
//! is the fatal gate: a component must refuse to initialize when it fails.

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Which backend a cache is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process memory only.
    Memory,
    /// Remote key-value store with local fallback.
    Remote,
    /// Remote store mirrored into a local cache on every write.
    Hybrid,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Remote => write!(f, "remote"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Eviction policy for in-memory caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Entries expire after their time-to-live; checked lazily on access.
    Ttl,
    /// Capacity-bounded, least-recently-used entry evicted when full.
    Lru,
}

/// Wire encoding for values stored in the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    /// Binary-safe structured encoding (JSON bytes).
    Json,
    /// Plain text encoding; non-string values are stringified.
    Text,
}

/// Remote store (Redis) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable the remote store (gracefully degrades to memory without it).
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    #[serde(default = "default_redis_host")]
    pub host: String,

    #[serde(default = "default_redis_port")]
    pub port: u16,

    /// Logical database index.
    #[serde(default)]
    pub db: u32,

    #[serde(default)]
    pub password: Option<String>,

    /// Connection pool size.
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Timeout for acquiring/creating a pooled connection, in milliseconds.
    #[serde(default = "default_redis_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Timeout for a single remote command, in milliseconds.
    #[serde(default = "default_redis_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Prefix applied to every key before it reaches the remote store.
    #[serde(default = "default_redis_namespace")]
    pub namespace: String,

    /// Minimum interval between liveness checks while the remote is down.
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

fn default_redis_namespace() -> String {
    "tiercache".to_string()
}

fn default_health_check_interval_secs() -> u64 {
    30
}

impl RedisConfig {
    /// Connection URL for the remote store.
    pub fn url(&self) -> String {
        let auth = self
            .password
            .as_deref()
            .map(|p| format!(":{p}@"))
            .unwrap_or_default();
        format!("redis://{auth}{}:{}/{}", self.host, self.port, self.db)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(CacheError::configuration("redis host must not be empty"));
        }
        if self.port == 0 {
            return Err(CacheError::configuration("redis port must not be 0"));
        }
        if self.db > 15 {
            return Err(CacheError::configuration(format!(
                "redis db index {} out of range (0-15)",
                self.db
            )));
        }
        if self.pool_size == 0 {
            return Err(CacheError::configuration("redis pool_size must be >= 1"));
        }
        if self.connect_timeout_ms == 0 || self.command_timeout_ms == 0 {
            return Err(CacheError::configuration("redis timeouts must be > 0"));
        }
        if self.namespace.is_empty() {
            return Err(CacheError::configuration(
                "redis namespace must not be empty",
            ));
        }
        Ok(())
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            host: default_redis_host(),
            port: default_redis_port(),
            db: 0,
            password: None,
            pool_size: default_redis_pool_size(),
            connect_timeout_ms: default_redis_timeout_ms(),
            command_timeout_ms: default_redis_timeout_ms(),
            namespace: default_redis_namespace(),
            health_check_interval_secs: default_health_check_interval_secs(),
        }
    }
}

/// Local in-memory cache configuration (also used for the remote fallback).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalCacheConfig {
    /// Maximum number of entries.
    #[serde(default = "default_local_max_entries")]
    pub max_entries: usize,

    /// Default TTL applied when a write carries none, in seconds.
    #[serde(default = "default_local_ttl_secs")]
    pub default_ttl_secs: u64,

    #[serde(default = "default_eviction_policy")]
    pub eviction: EvictionPolicy,
}

fn default_local_max_entries() -> usize {
    10_000
}

fn default_local_ttl_secs() -> u64 {
    3600
}

fn default_eviction_policy() -> EvictionPolicy {
    EvictionPolicy::Ttl
}

impl LocalCacheConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(CacheError::configuration("cache max_entries must be >= 1"));
        }
        if self.default_ttl_secs == 0 {
            return Err(CacheError::configuration(
                "cache default_ttl_secs must be >= 1",
            ));
        }
        Ok(())
    }
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_local_max_entries(),
            default_ttl_secs: default_local_ttl_secs(),
            eviction: default_eviction_policy(),
        }
    }
}

/// Thresholds driving dashboard alerts, all rates in percent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertThresholds {
    #[serde(default = "default_max_miss_rate")]
    pub max_miss_rate: f64,

    #[serde(default = "default_min_hit_rate")]
    pub min_hit_rate: f64,

    /// Fill ratio (size / max size) above which a capacity alert fires.
    #[serde(default = "default_max_fill_ratio")]
    pub max_fill_ratio: f64,

    /// Rate-based rules only fire once a cache has seen this many requests.
    #[serde(default = "default_min_requests_for_rates")]
    pub min_requests_for_rates: u64,
}

fn default_max_miss_rate() -> f64 {
    80.0
}

fn default_min_hit_rate() -> f64 {
    50.0
}

fn default_max_fill_ratio() -> f64 {
    90.0
}

fn default_min_requests_for_rates() -> u64 {
    100
}

impl AlertThresholds {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("max_miss_rate", self.max_miss_rate),
            ("min_hit_rate", self.min_hit_rate),
            ("max_fill_ratio", self.max_fill_ratio),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(CacheError::configuration(format!(
                    "alert threshold {name} must be within 0-100, got {value}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_miss_rate: default_max_miss_rate(),
            min_hit_rate: default_min_hit_rate(),
            max_fill_ratio: default_max_fill_ratio(),
            min_requests_for_rates: default_min_requests_for_rates(),
        }
    }
}

/// Performance dashboard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// How often the collector snapshots metrics, in seconds.
    #[serde(default = "default_collection_interval_secs")]
    pub collection_interval_secs: u64,

    /// Snapshots older than this are dropped from history.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// Size of the per-operation latency ring buffers.
    #[serde(default = "default_latency_window")]
    pub latency_window: usize,

    #[serde(default)]
    pub thresholds: AlertThresholds,
}

fn default_collection_interval_secs() -> u64 {
    60
}

fn default_retention_hours() -> u64 {
    24
}

fn default_latency_window() -> usize {
    100
}

impl DashboardConfig {
    pub fn validate(&self) -> Result<()> {
        if self.collection_interval_secs == 0 {
            return Err(CacheError::configuration(
                "dashboard collection_interval_secs must be >= 1",
            ));
        }
        if self.retention_hours == 0 {
            return Err(CacheError::configuration(
                "dashboard retention_hours must be >= 1",
            ));
        }
        if self.latency_window == 0 {
            return Err(CacheError::configuration(
                "dashboard latency_window must be >= 1",
            ));
        }
        self.thresholds.validate()
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            collection_interval_secs: default_collection_interval_secs(),
            retention_hours: default_retention_hours(),
            latency_window: default_latency_window(),
            thresholds: AlertThresholds::default(),
        }
    }
}

/// Top-level tiercache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierCacheConfig {
    #[serde(default = "default_backend_kind")]
    pub backend: BackendKind,

    #[serde(default = "default_serialization")]
    pub serialization: SerializationFormat,

    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,

    #[serde(default)]
    pub redis: RedisConfig,

    #[serde(default)]
    pub local: LocalCacheConfig,

    #[serde(default)]
    pub dashboard: DashboardConfig,
}

fn default_backend_kind() -> BackendKind {
    BackendKind::Memory
}

fn default_serialization() -> SerializationFormat {
    SerializationFormat::Json
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for TierCacheConfig {
    fn default() -> Self {
        Self {
            backend: default_backend_kind(),
            serialization: default_serialization(),
            metrics_enabled: default_metrics_enabled(),
            redis: RedisConfig::default(),
            local: LocalCacheConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

impl TierCacheConfig {
    pub fn validate(&self) -> Result<()> {
        self.local.validate()?;
        self.dashboard.validate()?;
        if matches!(self.backend, BackendKind::Remote | BackendKind::Hybrid) || self.redis.enabled {
            self.redis.validate()?;
        }
        Ok(())
    }
}
