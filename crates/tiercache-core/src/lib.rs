//! Core types for the tiercache cache layer.
//!
//! This crate holds the pieces every other tiercache crate depends on:
//! the error taxonomy, the configuration surface, the metrics registry,
//! and small time helpers. It deliberately carries no backend code and
//! no async runtime of its own.

pub mod config;
pub mod error;
pub mod metrics;
pub mod time;

pub use config::{
    AlertThresholds, BackendKind, DashboardConfig, EvictionPolicy, LocalCacheConfig, RedisConfig,
    SerializationFormat, TierCacheConfig,
};
pub use error::{CacheError, ErrorCategory, Result};
pub use metrics::{CacheMetrics, MetricsRegistry};
