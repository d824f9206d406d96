//! Telemetry Port
//!
//! Defines the interface of the metrics backend that pool statistics are
//! published to. Metrics are pull-based: the backend invokes the callback
//! whenever it samples, nothing is pushed from here.

use crate::domain::ports::PoolQueryError;
use crate::domain::value_objects::{ConnectionMetric, MetricGroup};

/// A single sample could not be taken.
///
/// Returned by a pull callback instead of a value. Backends must treat it
/// as a failed observation, never as zero.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("failed to read {metric} from connection pool")]
pub struct SampleError {
    pub metric: ConnectionMetric,
    #[source]
    pub source: PoolQueryError,
}

/// Errors reported by the telemetry backend itself.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TelemetryError {
    #[error("instrument {instrument} rejected: {reason}")]
    Rejected { instrument: String, reason: String },
    #[error("telemetry backend is closed")]
    Closed,
}

/// Callback invoked by the backend at sampling time.
pub type PullCallback = Box<dyn Fn() -> Result<i64, SampleError> + Send + Sync>;

/// A registered observable instrument.
pub trait ObservableHandle: Send + Sync {
    /// Detach the instrument so its callback is never invoked again.
    ///
    /// Closing an already closed handle is a no-op.
    fn close(&self) -> Result<(), TelemetryError>;
}

/// Metrics backend capable of hosting observable up/down counters.
pub trait Telemetry: Send + Sync {
    /// Register an observable up/down counter for `metric` within `group`.
    fn create_up_down_counter(
        &self,
        group: &MetricGroup,
        metric: ConnectionMetric,
        callback: PullCallback,
    ) -> Result<Box<dyn ObservableHandle>, TelemetryError>;
}
