//! Top-level service object wiring registry, invalidation, and dashboard.
//!
//! There is no ambient global instance: applications construct one
//! [`TierCache`], wire it at their entry point, and pass handles down.

use std::sync::Arc;

use tiercache_core::{Result, TierCacheConfig};

use crate::dashboard::PerformanceDashboard;
use crate::invalidation::CacheInvalidator;
use crate::registry::CacheRegistry;

/// The assembled cache service. Cloning is cheap; all clones share state.
#[derive(Debug, Clone)]
pub struct TierCache {
    registry: Arc<CacheRegistry>,
    invalidator: Arc<CacheInvalidator>,
    dashboard: Arc<PerformanceDashboard>,
}

impl TierCache {
    /// Validate the configuration and assemble the service. The dashboard
    /// collector is not started; call [`TierCache::start_collector`].
    pub fn new(config: TierCacheConfig) -> Result<Self> {
        let dashboard_config = config.dashboard.clone();
        let registry = Arc::new(CacheRegistry::new(config)?);
        let invalidator = Arc::new(CacheInvalidator::new(Arc::clone(&registry)));
        let dashboard = Arc::new(PerformanceDashboard::new(
            Arc::clone(&registry),
            dashboard_config,
        ));
        tracing::info!("cache service initialized");
        Ok(Self {
            registry,
            invalidator,
            dashboard,
        })
    }

    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    pub fn invalidator(&self) -> &Arc<CacheInvalidator> {
        &self.invalidator
    }

    pub fn dashboard(&self) -> &Arc<PerformanceDashboard> {
        &self.dashboard
    }

    /// Start the periodic metrics collector at the configured interval.
    pub fn start_collector(&self) {
        self.dashboard.start(None);
    }

    /// Stop background work. Idempotent; waits (bounded) for an in-flight
    /// collector tick.
    pub async fn shutdown(&self) {
        self.dashboard.stop().await;
        tracing::info!("cache service shut down");
    }
}
