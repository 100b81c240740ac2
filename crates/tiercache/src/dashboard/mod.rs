//! Performance dashboard: periodic metric snapshots, health classification,
//! trends, latency rings, and alert evaluation.

mod alerts;

pub use alerts::{Alert, AlertCondition, AlertKind, AlertManager, AlertSeverity};

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use tiercache_core::{BackendKind, CacheMetrics, DashboardConfig, time::now_utc};

use crate::registry::CacheRegistry;

/// Hit rate (percent) below which a cache is unhealthy.
const UNHEALTHY_HIT_RATE: f64 = 20.0;
/// Hit rate (percent) below which a cache is degraded.
const DEGRADED_HIT_RATE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Per-cache figures captured in one snapshot. Rates are percentages.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachePerformanceMetrics {
    pub cache_name: String,
    pub backend: BackendKind,
    pub hit_rate: f64,
    pub miss_rate: f64,
    pub entries: usize,
    pub max_entries: usize,
    pub fill_ratio: f64,
    pub total_requests: u64,
    pub evictions: u64,
    pub remote_connected: bool,
    /// Rolling average latency per operation, in milliseconds.
    pub avg_latency_ms: BTreeMap<String, f64>,
    pub health: HealthStatus,
}

/// Aggregate view of one tick across all caches.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub total_caches: usize,
    pub healthy_caches: usize,
    pub degraded_caches: usize,
    pub unhealthy_caches: usize,
    pub total_entries: usize,
    /// Number of caches per backend classification.
    pub backends: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSnapshot {
    #[serde(with = "time::serde::rfc3339")]
    pub taken_at: OffsetDateTime,
    pub caches: Vec<CachePerformanceMetrics>,
    pub global: CacheMetrics,
    pub summary: SnapshotSummary,
    /// Alerts unresolved as of this tick.
    pub alerts: Vec<Alert>,
}

/// first/last/average/min/max over one series of snapshots.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendSeries {
    pub first: f64,
    pub last: f64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trends {
    pub window: usize,
    pub hit_rate: TrendSeries,
    pub miss_rate: TrendSeries,
    pub entries: TrendSeries,
}

/// Output shape for [`PerformanceDashboard::export`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Nested snapshots plus the alert list.
    Structured,
    /// One flat row per cache per snapshot.
    Flat,
}

#[derive(Default)]
struct DashboardState {
    history: VecDeque<PerformanceSnapshot>,
    alerts: AlertManager,
    /// (cache, operation) -> rolling latency ring, milliseconds.
    latencies: HashMap<(String, String), VecDeque<f64>>,
}

struct CollectorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Snapshots registry metrics on demand or on a timer.
pub struct PerformanceDashboard {
    registry: Arc<CacheRegistry>,
    config: DashboardConfig,
    state: Mutex<DashboardState>,
    collector: Mutex<Option<CollectorHandle>>,
}

impl std::fmt::Debug for PerformanceDashboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceDashboard")
            .field("config", &self.config)
            .field("collector_running", &self.is_running())
            .finish()
    }
}

impl PerformanceDashboard {
    pub fn new(registry: Arc<CacheRegistry>, config: DashboardConfig) -> Self {
        Self {
            registry,
            config,
            state: Mutex::new(DashboardState::default()),
            collector: Mutex::new(None),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DashboardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take one snapshot now: sweep expired entries, classify health,
    /// evaluate alerts, append to history, prune retention.
    pub fn collect_now(&self) -> PerformanceSnapshot {
        self.registry.sweep_expired();
        let stats = self.registry.stats();
        let thresholds = &self.config.thresholds;

        let mut state = self.lock();
        let mut caches = Vec::with_capacity(stats.caches.len());
        let mut conditions = Vec::new();

        for stat in stats.caches {
            let hit_rate = stat.metrics.hit_rate() * 100.0;
            let miss_rate = stat.metrics.miss_rate() * 100.0;
            let fill_ratio = if stat.max_entries > 0 {
                stat.entries as f64 / stat.max_entries as f64 * 100.0
            } else {
                0.0
            };
            let rates_apply = stat.metrics.total_requests >= thresholds.min_requests_for_rates;
            let remote_down = stat.backend != BackendKind::Memory && !stat.remote_connected;

            let health = if rates_apply && hit_rate < UNHEALTHY_HIT_RATE {
                HealthStatus::Unhealthy
            } else if (rates_apply && hit_rate < DEGRADED_HIT_RATE) || remote_down {
                HealthStatus::Degraded
            } else {
                HealthStatus::Healthy
            };

            if rates_apply && miss_rate > thresholds.max_miss_rate {
                conditions.push(AlertCondition {
                    kind: AlertKind::HighMissRate,
                    severity: AlertSeverity::Warning,
                    cache_name: stat.name.clone(),
                    message: format!(
                        "miss rate {miss_rate:.1}% exceeds {:.1}%",
                        thresholds.max_miss_rate
                    ),
                });
            }
            if rates_apply && hit_rate < thresholds.min_hit_rate {
                conditions.push(AlertCondition {
                    kind: AlertKind::LowHitRate,
                    severity: AlertSeverity::Warning,
                    cache_name: stat.name.clone(),
                    message: format!(
                        "hit rate {hit_rate:.1}% below {:.1}%",
                        thresholds.min_hit_rate
                    ),
                });
            }
            if fill_ratio > thresholds.max_fill_ratio {
                conditions.push(AlertCondition {
                    kind: AlertKind::NearCapacity,
                    severity: AlertSeverity::Warning,
                    cache_name: stat.name.clone(),
                    message: format!(
                        "fill ratio {fill_ratio:.1}% exceeds {:.1}%",
                        thresholds.max_fill_ratio
                    ),
                });
            }
            if remote_down {
                conditions.push(AlertCondition {
                    kind: AlertKind::RemoteDisconnected,
                    severity: AlertSeverity::Error,
                    cache_name: stat.name.clone(),
                    message: "remote store unavailable, serving from local fallback".to_string(),
                });
            }
            if health == HealthStatus::Unhealthy {
                conditions.push(AlertCondition {
                    kind: AlertKind::UnhealthyCache,
                    severity: AlertSeverity::Critical,
                    cache_name: stat.name.clone(),
                    message: format!("hit rate {hit_rate:.1}% below {UNHEALTHY_HIT_RATE:.1}%"),
                });
            }

            let avg_latency_ms: BTreeMap<String, f64> = state
                .latencies
                .iter()
                .filter(|((cache, _), ring)| cache == &stat.name && !ring.is_empty())
                .map(|((_, op), ring)| {
                    (op.clone(), ring.iter().sum::<f64>() / ring.len() as f64)
                })
                .collect();

            caches.push(CachePerformanceMetrics {
                cache_name: stat.name,
                backend: stat.backend,
                hit_rate,
                miss_rate,
                entries: stat.entries,
                max_entries: stat.max_entries,
                fill_ratio,
                total_requests: stat.metrics.total_requests,
                evictions: stat.metrics.evictions,
                remote_connected: stat.remote_connected,
                avg_latency_ms,
                health,
            });
        }

        state.alerts.evaluate(&conditions);

        let mut summary = SnapshotSummary {
            total_caches: caches.len(),
            healthy_caches: 0,
            degraded_caches: 0,
            unhealthy_caches: 0,
            total_entries: 0,
            backends: BTreeMap::new(),
        };
        for cache in &caches {
            match cache.health {
                HealthStatus::Healthy => summary.healthy_caches += 1,
                HealthStatus::Degraded => summary.degraded_caches += 1,
                HealthStatus::Unhealthy => summary.unhealthy_caches += 1,
            }
            summary.total_entries += cache.entries;
            *summary.backends.entry(cache.backend.to_string()).or_insert(0) += 1;
        }

        let snapshot = PerformanceSnapshot {
            taken_at: now_utc(),
            caches,
            global: stats.global,
            summary,
            alerts: state.alerts.alerts(true),
        };
        state.history.push_back(snapshot.clone());

        let cutoff = now_utc() - time::Duration::hours(self.config.retention_hours as i64);
        while state
            .history
            .front()
            .is_some_and(|old| old.taken_at < cutoff)
        {
            state.history.pop_front();
        }

        tracing::debug!(
            caches = snapshot.caches.len(),
            active_alerts = snapshot.alerts.len(),
            "collected performance snapshot"
        );
        snapshot
    }

    /// Start the periodic collector. A second call while running is a no-op.
    pub fn start(self: &Arc<Self>, interval: Option<Duration>) {
        let mut collector = self.collector.lock().unwrap_or_else(PoisonError::into_inner);
        if collector.is_some() {
            tracing::debug!("dashboard collector already running");
            return;
        }

        let every =
            interval.unwrap_or_else(|| Duration::from_secs(self.config.collection_interval_secs));
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let dashboard = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick of `interval` fires immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        dashboard.collect_now();
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("dashboard collector stopped");
        });

        tracing::info!(interval_secs = every.as_secs(), "dashboard collector started");
        *collector = Some(CollectorHandle { shutdown, task });
    }

    /// Stop the collector, waiting briefly for an in-flight tick. Safe to
    /// call when not running.
    pub async fn stop(&self) {
        let handle = {
            let mut collector = self.collector.lock().unwrap_or_else(PoisonError::into_inner);
            collector.take()
        };
        let Some(handle) = handle else {
            return;
        };
        let _ = handle.shutdown.send(true);
        if tokio::time::timeout(Duration::from_secs(5), handle.task)
            .await
            .is_err()
        {
            tracing::warn!("dashboard collector did not stop within 5s");
        }
    }

    pub fn is_running(&self) -> bool {
        self.collector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn latest_snapshot(&self) -> Option<PerformanceSnapshot> {
        self.lock().history.back().cloned()
    }

    /// Snapshot history, oldest first; `window` limits to the most recent N.
    pub fn history(&self, window: Option<usize>) -> Vec<PerformanceSnapshot> {
        let state = self.lock();
        let skip = window.map_or(0, |w| state.history.len().saturating_sub(w));
        state.history.iter().skip(skip).cloned().collect()
    }

    /// Aggregate trends over the most recent `window` snapshots. `None`
    /// until at least one snapshot exists.
    pub fn trends(&self, window: usize) -> Option<Trends> {
        Self::compute_trends(self.history(Some(window)))
    }

    /// Aggregate trends over the snapshots taken within the last `period`.
    pub fn trends_within(&self, period: Duration) -> Option<Trends> {
        let cutoff = now_utc() - time::Duration::try_from(period).ok()?;
        let snapshots: Vec<PerformanceSnapshot> = self
            .lock()
            .history
            .iter()
            .filter(|snapshot| snapshot.taken_at >= cutoff)
            .cloned()
            .collect();
        Self::compute_trends(snapshots)
    }

    fn compute_trends(snapshots: Vec<PerformanceSnapshot>) -> Option<Trends> {
        if snapshots.is_empty() {
            return None;
        }

        let series = |f: &dyn Fn(&PerformanceSnapshot) -> f64| {
            let values: Vec<f64> = snapshots.iter().map(f).collect();
            TrendSeries {
                first: values[0],
                last: values[values.len() - 1],
                average: values.iter().sum::<f64>() / values.len() as f64,
                min: values.iter().copied().fold(f64::INFINITY, f64::min),
                max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            }
        };

        Some(Trends {
            window: snapshots.len(),
            hit_rate: series(&|s| s.global.hit_rate() * 100.0),
            miss_rate: series(&|s| s.global.miss_rate() * 100.0),
            entries: series(&|s| {
                s.caches.iter().map(|c| c.entries).sum::<usize>() as f64
            }),
        })
    }

    pub fn alerts(&self, active_only: bool) -> Vec<Alert> {
        self.lock().alerts.alerts(active_only)
    }

    /// Record one operation latency into the cache's rolling ring.
    pub fn record_latency(&self, cache: &str, operation: &str, duration: Duration) {
        let window = self.config.latency_window;
        let mut state = self.lock();
        let ring = state
            .latencies
            .entry((cache.to_string(), operation.to_string()))
            .or_default();
        ring.push_back(duration.as_secs_f64() * 1_000.0);
        while ring.len() > window {
            ring.pop_front();
        }
    }

    /// Serialize history and alerts in the requested shape.
    pub fn export(&self, format: ExportFormat) -> Value {
        let state = self.lock();
        match format {
            ExportFormat::Structured => json!({
                "snapshots": state.history.iter().collect::<Vec<_>>(),
                "alerts": state.alerts.alerts(false),
            }),
            ExportFormat::Flat => {
                let rows: Vec<Value> = state
                    .history
                    .iter()
                    .flat_map(|snapshot| {
                        snapshot.caches.iter().map(move |cache| {
                            json!({
                                "takenAt": snapshot.taken_at.unix_timestamp(),
                                "cache": cache.cache_name,
                                "backend": cache.backend,
                                "hitRate": cache.hit_rate,
                                "missRate": cache.miss_rate,
                                "entries": cache.entries,
                                "maxEntries": cache.max_entries,
                                "evictions": cache.evictions,
                                "health": cache.health,
                            })
                        })
                    })
                    .collect();
                Value::Array(rows)
            }
        }
    }
}
