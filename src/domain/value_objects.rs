//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::{Deserialize, Serialize};

/// Instrumentation name used when a registry is built without an explicit one.
pub const INSTRUMENTATION_NAME: &str = "pool-metrics";

/// The connection pool statistics exposed as observable up/down counters.
///
/// Names follow the OpenTelemetry database client semantic conventions:
/// used and idle connections share one instrument and are told apart by
/// the `state` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionMetric {
    /// Connections currently checked out of the pool
    UsedConnections,
    /// Connections sitting idle in the pool
    IdleConnections,
    /// Callers currently waiting for a connection
    PendingRequests,
}

impl ConnectionMetric {
    /// Every metric created for a registered pool, in creation order.
    pub const ALL: [ConnectionMetric; 3] = [
        ConnectionMetric::UsedConnections,
        ConnectionMetric::IdleConnections,
        ConnectionMetric::PendingRequests,
    ];

    /// Instrument name reported to the telemetry backend.
    pub fn instrument_name(&self) -> &'static str {
        match self {
            Self::UsedConnections | Self::IdleConnections => "db.client.connections.usage",
            Self::PendingRequests => "db.client.connections.pending_requests",
        }
    }

    /// Value of the `state` attribute, if the instrument carries one.
    pub fn state(&self) -> Option<&'static str> {
        match self {
            Self::UsedConnections => Some("used"),
            Self::IdleConnections => Some("idle"),
            Self::PendingRequests => None,
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Self::UsedConnections | Self::IdleConnections => "{connections}",
            Self::PendingRequests => "{requests}",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::UsedConnections | Self::IdleConnections => {
                "The number of connections that are currently in state described by the state attribute"
            }
            Self::PendingRequests => {
                "The number of pending requests for an open connection, cumulative for the entire pool"
            }
        }
    }
}

impl std::fmt::Display for ConnectionMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UsedConnections => write!(f, "used connections"),
            Self::IdleConnections => write!(f, "idle connections"),
            Self::PendingRequests => write!(f, "pending requests for connection"),
        }
    }
}

/// The metric group all counters of one pool belong to.
///
/// Identified by the instrumentation name and the pool's logical name,
/// which may legitimately be empty. Logical names need not be unique, so
/// `pool_instance` tells apart distinct pools registered under one name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricGroup {
    pub instrumentation_name: String,
    pub pool_name: String,
    /// Registry-assigned id, stable across re-registration of one pool
    pub pool_instance: u64,
}

impl MetricGroup {
    pub fn new(instrumentation_name: impl Into<String>, pool_name: impl Into<String>, pool_instance: u64) -> Self {
        Self {
            instrumentation_name: instrumentation_name.into(),
            pool_name: pool_name.into(),
            pool_instance,
        }
    }
}
