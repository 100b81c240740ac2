//! In-memory cache backends.
//!
//! Two variants: `TtlCache` (time-expiring, lazily checked on access) and
//! `LruCache` (capacity-bounded, least-recently-used eviction). Both count
//! their evictions; the registry drains the counter after every operation
//! so eviction totals stay attached to the owning cache's metrics.

use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use indexmap::IndexMap;
use serde_json::Value;

/// A cached entry with TTL support.
#[derive(Debug, Clone)]
struct TtlEntry {
    value: Value,
    expires_at: Instant,
}

impl TtlEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Time-expiring in-memory cache.
///
/// Expiry is lazy: an expired entry is dropped (and counted as an eviction)
/// when it is next touched. `sweep_expired` exists for memory bounding and
/// is driven by the dashboard collector tick.
#[derive(Debug)]
pub struct TtlCache {
    entries: DashMap<String, TtlEntry>,
    max_entries: usize,
    default_ttl: Duration,
    evictions: AtomicU64,
}

impl TtlCache {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            default_ttl,
            evictions: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                return Some(entry.value.clone());
            }
            drop(entry);
            self.entries.remove(key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);

        if self.entries.len() >= self.max_entries && !self.entries.contains_key(key) {
            if self.sweep_expired() == 0 {
                // Still full: drop an arbitrary entry to make room. The
                // victim key must be bound in its own statement so the
                // iterator's shard guard is released before the remove.
                let victim = self.entries.iter().next().map(|e| e.key().clone());
                if let Some(victim) = victim {
                    self.entries.remove(&victim);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key = %victim, "evicted entry from full TTL cache");
                }
            }
        }

        self.entries.insert(
            key.to_string(),
            TtlEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn sweep_expired(&self) -> u64 {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.is_expired())
            .map(|entry| entry.key().clone())
            .collect();

        for key in &expired {
            self.entries.remove(key);
        }

        let removed = expired.len() as u64;
        self.evictions.fetch_add(removed, Ordering::Relaxed);
        removed
    }

    /// Drain the eviction counter accumulated since the last call.
    pub fn take_evictions(&self) -> u64 {
        self.evictions.swap(0, Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
struct LruEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl LruEntry {
    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|at| Instant::now() >= at)
            .unwrap_or(false)
    }
}

/// Capacity-bounded in-memory cache with least-recently-used eviction.
///
/// Recency is tracked by position in the underlying `IndexMap`: a touched
/// entry moves to the back, the front is always the eviction victim.
#[derive(Debug)]
pub struct LruCache {
    state: Mutex<IndexMap<String, LruEntry>>,
    max_entries: usize,
    default_ttl: Option<Duration>,
    evictions: AtomicU64,
}

impl LruCache {
    pub fn new(max_entries: usize, default_ttl: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(IndexMap::new()),
            max_entries,
            default_ttl,
            evictions: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexMap<String, LruEntry>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut state = self.lock();
        match state.shift_remove(key) {
            Some(entry) if entry.is_expired() => {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => {
                let value = entry.value.clone();
                // Re-insert at the back: most recently used.
                state.insert(key.to_string(), entry);
                Some(value)
            }
            None => None,
        }
    }

    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let expires_at = ttl.or(self.default_ttl).map(|ttl| Instant::now() + ttl);
        let mut state = self.lock();

        state.shift_remove(key);
        if state.len() >= self.max_entries {
            if let Some((victim, _)) = state.shift_remove_index(0) {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %victim, "evicted least-recently-used entry");
            }
        }
        state.insert(key.to_string(), LruEntry { value, expires_at });
    }

    pub fn delete(&self, key: &str) -> bool {
        self.lock().shift_remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock()
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn sweep_expired(&self) -> u64 {
        let mut state = self.lock();
        let before = state.len();
        state.retain(|_, entry| !entry.is_expired());
        let removed = (before - state.len()) as u64;
        self.evictions.fetch_add(removed, Ordering::Relaxed);
        removed
    }

    /// Drain the eviction counter accumulated since the last call.
    pub fn take_evictions(&self) -> u64 {
        self.evictions.swap(0, Ordering::Relaxed)
    }
}
