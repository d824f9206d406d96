//! Domain Layer
//!
//! Pool identity, handle sets and the registration lifecycle. Depends only
//! on the ports it defines.

pub mod entities;
pub mod ports;
pub mod services;
pub mod value_objects;

pub use entities::{MetricHandleSet, PoolIdentity};
pub use value_objects::{ConnectionMetric, MetricGroup, INSTRUMENTATION_NAME};
