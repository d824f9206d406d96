mod dashmap_telemetry;

pub use dashmap_telemetry::{DashMapTelemetry, Observation};
