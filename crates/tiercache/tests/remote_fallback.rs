//! The remote backend must keep serving from its local fallback when the
//! remote store is unreachable. These tests point at a port nothing listens
//! on, so every remote attempt fails fast.

use serde_json::json;
use tiercache::{AlertKind, BackendKind, HealthStatus, TierCache, TierCacheConfig};

fn unreachable_config() -> TierCacheConfig {
    let mut config = TierCacheConfig::default();
    config.backend = BackendKind::Hybrid;
    config.redis.enabled = true;
    config.redis.host = "127.0.0.1".to_string();
    config.redis.port = 1;
    config.redis.connect_timeout_ms = 200;
    config.redis.command_timeout_ms = 200;
    config
}

#[tokio::test]
async fn writes_and_reads_survive_remote_outage() {
    let service = TierCache::new(unreachable_config()).expect("config is valid");
    service.registry().create_default("users").unwrap();

    // The write cannot reach the remote store but must not error.
    service
        .registry()
        .put("users", "1", json!({"name": "ada"}), None)
        .await
        .expect("write is absorbed by the fallback");

    assert_eq!(
        service.registry().fetch("users", "1").await,
        Some(json!({"name": "ada"}))
    );
    assert!(service.registry().delete("users", "1").await);
    assert_eq!(service.registry().fetch("users", "1").await, None);
}

#[tokio::test]
async fn disconnected_hybrid_reports_remote_classification() {
    let service = TierCache::new(unreachable_config()).expect("config is valid");
    service.registry().create_default("users").unwrap();

    // Force at least one remote attempt so the backend notices the outage.
    service.registry().put("users", "1", json!(1), None).await.unwrap();

    let stats = service.registry().stats();
    assert_eq!(stats.caches.len(), 1);
    // With the remote down the cache is no longer operating as a hybrid.
    assert_eq!(stats.caches[0].backend, BackendKind::Remote);
    assert!(!stats.caches[0].remote_connected);
}

#[tokio::test]
async fn outage_degrades_dashboard_health_and_raises_alert() {
    let service = TierCache::new(unreachable_config()).expect("config is valid");
    service.registry().create_default("users").unwrap();
    service.registry().put("users", "1", json!(1), None).await.unwrap();

    let snapshot = service.dashboard().collect_now();
    assert_eq!(snapshot.caches[0].health, HealthStatus::Degraded);

    let active = service.dashboard().alerts(true);
    assert!(
        active
            .iter()
            .any(|alert| alert.cache_name == "users" && alert.kind == AlertKind::RemoteDisconnected)
    );
}

#[tokio::test]
async fn clear_with_remote_down_clears_the_fallback() {
    let service = TierCache::new(unreachable_config()).expect("config is valid");
    service.registry().create_default("users").unwrap();
    service.registry().put("users", "1", json!(1), None).await.unwrap();
    service.registry().put("users", "2", json!(2), None).await.unwrap();

    service.registry().clear("users").await;
    assert_eq!(service.registry().fetch("users", "1").await, None);
    assert_eq!(service.registry().fetch("users", "2").await, None);
}
