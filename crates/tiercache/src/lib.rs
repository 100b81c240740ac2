pub mod backend;
pub mod dashboard;
pub mod invalidation;
pub mod registry;
pub mod service;

pub use backend::{Backend, LruCache, RemoteCache, TtlCache, create_backend, create_redis_pool};
pub use dashboard::{
    Alert, AlertKind, AlertSeverity, CachePerformanceMetrics, ExportFormat, HealthStatus,
    PerformanceDashboard, PerformanceSnapshot, SnapshotSummary, TrendSeries, Trends,
};
pub use invalidation::{
    CacheInvalidator, CacheTag, InvalidationEvent, qualify, split_qualified,
};
pub use registry::{CacheRegistry, CacheStat, RegistryStats};
pub use service::TierCache;

pub use tiercache_core::{
    AlertThresholds, BackendKind, CacheError, CacheMetrics, DashboardConfig, EvictionPolicy,
    LocalCacheConfig, RedisConfig, Result, SerializationFormat, TierCacheConfig,
};
