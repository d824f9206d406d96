pub mod metric_factory;
pub mod pool_metrics_registry;

pub use metric_factory::{create_meters, pull_callback, RegistrationError};
pub use pool_metrics_registry::{
    register_metrics, register_metrics_dyn, unregister_metrics, unregister_metrics_dyn, PoolMetricsRegistry,
};
