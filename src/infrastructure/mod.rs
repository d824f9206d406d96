//! Infrastructure Layer
//!
//! Concrete pools and process plumbing.

pub mod connection_pool;
pub mod shutdown;

pub use connection_pool::{ConnectionPool, PoolConfig, PoolError, PoolStats, PooledConnection};
pub use shutdown::shutdown_signal;
