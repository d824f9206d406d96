//! Application Layer
//!
//! Use cases wiring the domain to concrete pools.

pub mod pool_service;

pub use pool_service::PoolService;
