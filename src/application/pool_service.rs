//! Pool Service - startup and shutdown of the observed pools
//!
//! Creates one connection pool per configured target, attaches its metrics
//! and tears everything down again on shutdown.

use crate::config::Config;
use crate::domain::ports::Telemetry;
use crate::domain::services::PoolMetricsRegistry;
use crate::infrastructure::ConnectionPool;
use std::sync::Arc;
use std::time::Duration;

/// The pools this process observes.
pub struct PoolService<'a> {
    registry: &'a PoolMetricsRegistry,
    pools: Vec<Arc<ConnectionPool>>,
}

impl<'a> PoolService<'a> {
    /// Create and register a pool for every configured target.
    ///
    /// A target whose idle connections cannot be opened is still observed.
    /// A target whose metrics are rejected is closed and skipped, so one
    /// bad pool never takes the others down.
    pub async fn start(cfg: &Config, telemetry: &dyn Telemetry, registry: &'a PoolMetricsRegistry) -> Self {
        let mut pools = Vec::with_capacity(cfg.pools.len());

        for target in &cfg.pools {
            let pool = Arc::new(ConnectionPool::new(
                target.name.clone(),
                target.addr.clone(),
                cfg.pool_config(),
            ));

            if let Err(e) = pool.fill_idle().await {
                tracing::warn!("pool '{}': could not open idle connections to {}: {}", target.name, target.addr, e);
            }

            if let Err(e) = registry.register(telemetry, &pool) {
                tracing::error!("pool '{}': metrics registration failed, closing pool: {}", target.name, e);
                pool.close();
                continue;
            }

            pool.start_cleanup(Duration::from_secs(cfg.cleanup_interval_secs));
            pools.push(pool);
        }

        tracing::info!("observing {} of {} configured pools", pools.len(), cfg.pools.len());
        Self { registry, pools }
    }

    /// Pools that were registered successfully.
    pub fn pools(&self) -> &[Arc<ConnectionPool>] {
        &self.pools
    }

    /// Unregister and close every pool.
    pub fn shutdown(&self) {
        for pool in &self.pools {
            self.registry.unregister(pool);
            pool.close();
        }
    }
}
