//! Adapters Layer
//!
//! Inbound adapters drive the application (HTTP metrics endpoint);
//! outbound adapters implement the domain ports (telemetry backend).

pub mod inbound;
pub mod outbound;
