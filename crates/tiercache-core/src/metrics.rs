//! Hit/miss/eviction accounting for named caches.
//!
//! One `CacheMetrics` instance exists per named cache plus one global
//! instance. Both are updated under the same lock acquisition, so a reader
//! never observes a hit counted against one but not the other. Rates are
//! always recomputed from the raw counters, never stored.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

/// Counters for a single named cache (or the global aggregate).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub total_requests: u64,
}

impl CacheMetrics {
    /// Hit rate as a fraction in `[0, 1]`; 0 when no requests were seen.
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_requests as f64
        }
    }

    /// Miss rate as a fraction in `[0, 1]`; 0 when no requests were seen.
    pub fn miss_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.misses as f64 / self.total_requests as f64
        }
    }

    fn record_hit(&mut self) {
        self.hits += 1;
        self.total_requests += 1;
    }

    fn record_miss(&mut self) {
        self.misses += 1;
        self.total_requests += 1;
    }

    fn record_evictions(&mut self, count: u64) {
        self.evictions += count;
    }

    /// Zero all counters. The instance itself is never destroyed.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Default)]
struct MetricsState {
    per_cache: HashMap<String, CacheMetrics>,
    global: CacheMetrics,
}

/// Registry of per-cache and global metrics.
///
/// When disabled, every recording call is a no-op and snapshots report
/// zeroed counters.
#[derive(Debug)]
pub struct MetricsRegistry {
    state: Mutex<MetricsState>,
    enabled: bool,
}

impl MetricsRegistry {
    pub fn new(enabled: bool) -> Self {
        Self {
            state: Mutex::new(MetricsState::default()),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MetricsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_hit(&self, cache: &str) {
        if !self.enabled {
            return;
        }
        let mut state = self.lock();
        state.per_cache.entry(cache.to_string()).or_default().record_hit();
        state.global.record_hit();
    }

    pub fn record_miss(&self, cache: &str) {
        if !self.enabled {
            return;
        }
        let mut state = self.lock();
        state.per_cache.entry(cache.to_string()).or_default().record_miss();
        state.global.record_miss();
    }

    pub fn record_evictions(&self, cache: &str, count: u64) {
        if !self.enabled || count == 0 {
            return;
        }
        let mut state = self.lock();
        state
            .per_cache
            .entry(cache.to_string())
            .or_default()
            .record_evictions(count);
        state.global.record_evictions(count);
    }

    /// Snapshot of one cache's counters; zeroed counters for unknown names.
    pub fn snapshot(&self, cache: &str) -> CacheMetrics {
        self.lock().per_cache.get(cache).cloned().unwrap_or_default()
    }

    /// Snapshot of the global aggregate counters.
    pub fn global(&self) -> CacheMetrics {
        self.lock().global.clone()
    }

    /// Snapshot of every named cache's counters.
    pub fn all(&self) -> HashMap<String, CacheMetrics> {
        self.lock().per_cache.clone()
    }

    /// Zero one cache's counters without touching the global aggregate.
    pub fn reset(&self, cache: &str) {
        if let Some(metrics) = self.lock().per_cache.get_mut(cache) {
            metrics.reset();
            tracing::debug!(cache = %cache, "cache metrics reset");
        }
    }

    /// Drop a cache's counters entirely (the cache itself was removed).
    pub fn remove(&self, cache: &str) {
        if self.lock().per_cache.remove(cache).is_some() {
            tracing::debug!(cache = %cache, "cache metrics removed");
        }
    }

    /// Zero every counter, global included.
    pub fn reset_all(&self) {
        let mut state = self.lock();
        for metrics in state.per_cache.values_mut() {
            metrics.reset();
        }
        state.global.reset();
        tracing::debug!("all cache metrics reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_with_no_requests_is_zero() {
        let metrics = CacheMetrics::default();
        assert_eq!(metrics.hit_rate(), 0.0);
        assert_eq!(metrics.miss_rate(), 0.0);
    }

    #[test]
    fn test_counters_invariant() {
        let registry = MetricsRegistry::new(true);
        registry.record_hit("users");
        registry.record_hit("users");
        registry.record_miss("users");

        let snapshot = registry.snapshot("users");
        assert_eq!(snapshot.hits + snapshot.misses, snapshot.total_requests);
        assert!((snapshot.hit_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_global_tracks_all_caches() {
        let registry = MetricsRegistry::new(true);
        registry.record_hit("a");
        registry.record_miss("b");
        registry.record_evictions("a", 3);

        let global = registry.global();
        assert_eq!(global.hits, 1);
        assert_eq!(global.misses, 1);
        assert_eq!(global.evictions, 3);
        assert_eq!(global.total_requests, 2);
    }

    #[test]
    fn test_unknown_cache_snapshot_is_zeroed() {
        let registry = MetricsRegistry::new(true);
        assert_eq!(registry.snapshot("nope"), CacheMetrics::default());
    }

    #[test]
    fn test_reset_single_cache() {
        let registry = MetricsRegistry::new(true);
        registry.record_hit("users");
        registry.record_miss("sessions");

        registry.reset("users");
        assert_eq!(registry.snapshot("users"), CacheMetrics::default());
        assert_eq!(registry.snapshot("sessions").misses, 1);
        // Global is left alone by a per-cache reset.
        assert_eq!(registry.global().total_requests, 2);
    }

    #[test]
    fn test_reset_all() {
        let registry = MetricsRegistry::new(true);
        registry.record_hit("users");
        registry.reset_all();
        assert_eq!(registry.global(), CacheMetrics::default());
        assert_eq!(registry.snapshot("users"), CacheMetrics::default());
    }

    #[test]
    fn test_disabled_registry_records_nothing() {
        let registry = MetricsRegistry::new(false);
        registry.record_hit("users");
        registry.record_miss("users");
        assert_eq!(registry.global(), CacheMetrics::default());
    }
}
