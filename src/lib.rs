//! pool-metrics Library
//!
//! Publishes live connection pool statistics (used, idle and pending
//! checkouts) as pull-based observable metrics, and keeps exactly one set
//! of metrics attached per pool instance.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use adapters::outbound::DashMapTelemetry;
pub use application::PoolService;
pub use config::load_config;
pub use domain::entities::{MetricHandleSet, PoolIdentity};
pub use domain::ports::{ObservableHandle, PoolQueryError, PoolStatistics, SampleError, Telemetry, TelemetryError};
pub use domain::services::{
    register_metrics, register_metrics_dyn, unregister_metrics, unregister_metrics_dyn, PoolMetricsRegistry,
    RegistrationError,
};
pub use domain::value_objects::{ConnectionMetric, MetricGroup};
pub use infrastructure::ConnectionPool;
