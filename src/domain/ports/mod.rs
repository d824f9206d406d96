mod pool_statistics;
mod telemetry;

pub use pool_statistics::{PoolQueryError, PoolStatistics};
pub use telemetry::{ObservableHandle, PullCallback, SampleError, Telemetry, TelemetryError};
