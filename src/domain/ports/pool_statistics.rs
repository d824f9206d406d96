//! Pool Statistics Port
//!
//! Defines the read-only view of a connection pool that metrics are built on.

/// Failure reading a live statistic from a pool.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PoolQueryError {
    #[error("connection pool '{pool}' is closed")]
    Closed { pool: String },
    #[error("connection pool statistics unavailable: {0}")]
    Unavailable(String),
}

/// Live statistics of a connection pool.
///
/// This is an outbound port: the pool is owned elsewhere and only observed
/// here. Getters are called from the telemetry backend's sampling thread,
/// so they must be cheap and must not block on pool traffic for long.
pub trait PoolStatistics: Send + Sync {
    /// Logical name of the pool. May be empty.
    fn logical_name(&self) -> String;

    /// Number of connections currently checked out.
    fn busy_connections(&self) -> Result<i64, PoolQueryError>;

    /// Number of connections currently idle in the pool.
    fn idle_connections(&self) -> Result<i64, PoolQueryError>;

    /// Number of callers currently waiting to check out a connection.
    fn threads_awaiting_checkout(&self) -> Result<i64, PoolQueryError>;
}
