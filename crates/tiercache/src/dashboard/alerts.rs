//! Alerting with hysteresis.
//!
//! An alert's identity is `(kind, cache_name)`: while a condition holds,
//! at most one unresolved alert exists for it. When the condition clears,
//! the alert is resolved with a timestamp rather than deleted, so the
//! history shows every episode.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use tiercache_core::time::now_utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HighMissRate,
    LowHitRate,
    NearCapacity,
    RemoteDisconnected,
    UnhealthyCache,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HighMissRate => write!(f, "high_miss_rate"),
            Self::LowHitRate => write!(f, "low_hit_rate"),
            Self::NearCapacity => write!(f, "near_capacity"),
            Self::RemoteDisconnected => write!(f, "remote_disconnected"),
            Self::UnhealthyCache => write!(f, "unhealthy_cache"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub cache_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub raised_at: OffsetDateTime,
    pub resolved: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub resolved_at: Option<OffsetDateTime>,
}

/// A condition observed during one evaluation pass.
#[derive(Debug, Clone)]
pub struct AlertCondition {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub cache_name: String,
    pub message: String,
}

/// Owns the alert list and applies hysteresis against each evaluation pass.
#[derive(Debug, Default)]
pub struct AlertManager {
    alerts: Vec<Alert>,
}

impl AlertManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconcile the alert list against the conditions currently firing.
    ///
    /// A firing condition with no unresolved alert raises one; an
    /// unresolved alert whose condition no longer fires is resolved.
    pub fn evaluate(&mut self, firing: &[AlertCondition]) {
        let now = now_utc();

        for condition in firing {
            let active = self.alerts.iter().any(|alert| {
                !alert.resolved
                    && alert.kind == condition.kind
                    && alert.cache_name == condition.cache_name
            });
            if !active {
                tracing::warn!(
                    kind = %condition.kind,
                    cache = %condition.cache_name,
                    message = %condition.message,
                    "alert raised"
                );
                self.alerts.push(Alert {
                    id: Uuid::new_v4(),
                    kind: condition.kind,
                    severity: condition.severity,
                    message: condition.message.clone(),
                    cache_name: condition.cache_name.clone(),
                    raised_at: now,
                    resolved: false,
                    resolved_at: None,
                });
            }
        }

        for alert in &mut self.alerts {
            if alert.resolved {
                continue;
            }
            let still_firing = firing
                .iter()
                .any(|c| c.kind == alert.kind && c.cache_name == alert.cache_name);
            if !still_firing {
                alert.resolved = true;
                alert.resolved_at = Some(now);
                tracing::info!(kind = %alert.kind, cache = %alert.cache_name, "alert resolved");
            }
        }
    }

    /// All alerts, or only unresolved ones.
    pub fn alerts(&self, active_only: bool) -> Vec<Alert> {
        self.alerts
            .iter()
            .filter(|alert| !active_only || !alert.resolved)
            .cloned()
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.alerts.iter().filter(|alert| !alert.resolved).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition(kind: AlertKind, cache: &str) -> AlertCondition {
        AlertCondition {
            kind,
            severity: AlertSeverity::Warning,
            cache_name: cache.to_string(),
            message: format!("{kind} on {cache}"),
        }
    }

    #[test]
    fn test_hysteresis_single_alert_while_firing() {
        let mut manager = AlertManager::new();
        let firing = [condition(AlertKind::HighMissRate, "users")];

        manager.evaluate(&firing);
        manager.evaluate(&firing);
        manager.evaluate(&firing);
        assert_eq!(manager.alerts(false).len(), 1);
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn test_resolve_keeps_history_and_allows_new_episode() {
        let mut manager = AlertManager::new();
        let firing = [condition(AlertKind::LowHitRate, "users")];

        manager.evaluate(&firing);
        manager.evaluate(&[]);
        let all = manager.alerts(false);
        assert_eq!(all.len(), 1);
        assert!(all[0].resolved);
        assert!(all[0].resolved_at.is_some());
        assert_eq!(manager.active_count(), 0);

        manager.evaluate(&firing);
        assert_eq!(manager.alerts(false).len(), 2);
        assert_eq!(manager.active_count(), 1);
    }

    #[test]
    fn test_identity_includes_cache_name() {
        let mut manager = AlertManager::new();
        manager.evaluate(&[
            condition(AlertKind::NearCapacity, "users"),
            condition(AlertKind::NearCapacity, "posts"),
        ]);
        assert_eq!(manager.active_count(), 2);

        manager.evaluate(&[condition(AlertKind::NearCapacity, "users")]);
        let active = manager.alerts(true);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].cache_name, "users");
    }
}
