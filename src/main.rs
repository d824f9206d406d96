//! pool-metrics - connection pool metrics exporter
//!
//! This is the composition root that wires together all the components.

use pool_metrics::adapters::inbound::MetricsServer;
use pool_metrics::adapters::outbound::DashMapTelemetry;
use pool_metrics::application::PoolService;
use pool_metrics::config::load_config;
use pool_metrics::domain::services::PoolMetricsRegistry;
use pool_metrics::infrastructure::shutdown_signal;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(log_level).init();

    tracing::info!(
        "starting pool-metrics listen={} pools={}",
        cfg.listen_addr,
        cfg.pools.len()
    );

    // ===== COMPOSITION ROOT =====

    // 1. Telemetry backend and the process-wide registry
    let telemetry = Arc::new(DashMapTelemetry::new());
    let registry = PoolMetricsRegistry::global();

    // 2. One pool per target, registered for metrics
    let pools = PoolService::start(&cfg, telemetry.as_ref(), registry).await;

    // 3. Serve metrics until asked to stop
    let server = MetricsServer::new(cfg.listen_addr.clone(), telemetry, registry);

    let result = tokio::select! {
        result = server.run() => result,
        _ = shutdown_signal() => Ok(()),
    };

    // 4. Detach metrics before the pools go away
    pools.shutdown();

    tracing::info!("pool-metrics stopped");
    result
}
