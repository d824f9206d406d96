//! Metrics HTTP Server
//!
//! Serves the sampled pool metrics for Prometheus scraping, plus a small
//! JSON health endpoint.

use crate::adapters::outbound::DashMapTelemetry;
use crate::domain::services::PoolMetricsRegistry;
use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Prometheus text exposition content type.
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub registered_pools: usize,
    pub live_instruments: usize,
}

/// Metrics server state.
#[derive(Clone)]
pub struct MetricsState {
    pub telemetry: Arc<DashMapTelemetry>,
    pub registry: &'static PoolMetricsRegistry,
}

impl MetricsState {
    pub fn new(telemetry: Arc<DashMapTelemetry>, registry: &'static PoolMetricsRegistry) -> Self {
        Self { telemetry, registry }
    }
}

/// HTTP server exposing `/metrics` and `/health`.
pub struct MetricsServer {
    listen_addr: String,
    state: MetricsState,
}

impl MetricsServer {
    pub fn new(
        listen_addr: String,
        telemetry: Arc<DashMapTelemetry>,
        registry: &'static PoolMetricsRegistry,
    ) -> Self {
        Self {
            listen_addr,
            state: MetricsState::new(telemetry, registry),
        }
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the metrics server until the listener fails.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub async fn run(&self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("metrics endpoint listening on {}", self.listen_addr);

        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

// Handler functions

async fn health_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        registered_pools: state.registry.len(),
        live_instruments: state.telemetry.live_instruments(),
    };
    Json(response)
}

async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    // Callbacks query pool locks; keep them off the async workers.
    let telemetry = state.telemetry.clone();
    let body = tokio::task::spawn_blocking(move || telemetry.export_prometheus())
        .await
        .unwrap_or_else(|e| {
            tracing::error!("metrics export task failed: {}", e);
            String::new()
        });

    ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body)
}
