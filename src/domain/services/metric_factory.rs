//! Metric Factory
//!
//! Builds the observable counters for one pool. Each counter is backed by a
//! pull callback that reads the pool's live value when the backend samples.

use crate::domain::entities::MetricHandleSet;
use crate::domain::ports::{PoolQueryError, PoolStatistics, PullCallback, SampleError, Telemetry, TelemetryError};
use crate::domain::value_objects::{ConnectionMetric, MetricGroup};
use std::sync::Arc;

/// Registration could not create the pool's counters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistrationError {
    #[error("failed to create {metric} counter for pool '{pool_name}'")]
    CounterCreation {
        metric: ConnectionMetric,
        pool_name: String,
        #[source]
        source: TelemetryError,
    },
}

/// Create the used, idle and pending-request counters for `pool`.
///
/// `pool_instance` is attached to every counter so pools sharing a logical
/// name stay distinguishable. If the backend rejects any counter, the ones
/// already created are detached before the error is returned.
pub fn create_meters(
    telemetry: &dyn Telemetry,
    instrumentation_name: &str,
    pool_instance: u64,
    pool: &Arc<dyn PoolStatistics>,
) -> Result<MetricHandleSet, RegistrationError> {
    let group = MetricGroup::new(instrumentation_name, pool.logical_name(), pool_instance);
    let mut handles = MetricHandleSet::with_capacity(ConnectionMetric::ALL.len());

    for metric in ConnectionMetric::ALL {
        match telemetry.create_up_down_counter(&group, metric, pull_callback(pool.clone(), metric)) {
            Ok(handle) => handles.push(handle),
            Err(source) => {
                let rolled_back = handles.detach();
                tracing::debug!(
                    "rolled back {} counters for pool '{}' after {} creation failed",
                    rolled_back,
                    group.pool_name,
                    metric
                );
                return Err(RegistrationError::CounterCreation {
                    metric,
                    pool_name: group.pool_name,
                    source,
                });
            }
        }
    }

    tracing::debug!(
        "created {} counters for pool '{}' ({})",
        handles.len(),
        group.pool_name,
        group.instrumentation_name
    );
    Ok(handles)
}

/// Callback reading `metric` from `pool`; read failures fail the sample.
pub fn pull_callback(pool: Arc<dyn PoolStatistics>, metric: ConnectionMetric) -> PullCallback {
    Box::new(move || read_metric(pool.as_ref(), metric).map_err(|source| SampleError { metric, source }))
}

fn read_metric(pool: &dyn PoolStatistics, metric: ConnectionMetric) -> Result<i64, PoolQueryError> {
    match metric {
        ConnectionMetric::UsedConnections => pool.busy_connections(),
        ConnectionMetric::IdleConnections => pool.idle_connections(),
        ConnectionMetric::PendingRequests => pool.threads_awaiting_checkout(),
    }
}
