//! DashMap Telemetry Backend
//!
//! In-process implementation of the Telemetry port. Instruments live in a
//! DashMap keyed by handle id; sampling walks the map and invokes every
//! callback, and the result can be rendered in Prometheus text format.

use crate::domain::ports::{ObservableHandle, PullCallback, SampleError, Telemetry, TelemetryError};
use crate::domain::value_objects::{ConnectionMetric, MetricGroup};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A registered observable up/down counter.
struct Instrument {
    group: MetricGroup,
    metric: ConnectionMetric,
    callback: PullCallback,
}

/// Result of sampling one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub instrumentation_name: String,
    pub pool_name: String,
    pub pool_instance: u64,
    pub metric: ConnectionMetric,
    /// The sampled value, or why the sample failed
    pub value: Result<i64, SampleError>,
}

struct Instruments {
    by_id: DashMap<u64, Instrument>,
    next_id: AtomicU64,
    sample_failures: AtomicU64,
    /// Maximum number of live instruments, if capped
    max_instruments: Option<usize>,
}

/// DashMap-backed telemetry backend.
///
/// Closing a handle takes the shard write lock, so a callback being sampled
/// finishes first and a closed instrument is never sampled again.
#[derive(Clone)]
pub struct DashMapTelemetry {
    inner: Arc<Instruments>,
}

impl DashMapTelemetry {
    /// Create a backend without an instrument cap.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a backend that rejects instruments beyond `max_instruments`.
    ///
    /// The cap is checked before insertion and is approximate under
    /// concurrent registration.
    pub fn with_instrument_limit(max_instruments: usize) -> Self {
        Self::build(Some(max_instruments))
    }

    fn build(max_instruments: Option<usize>) -> Self {
        Self {
            inner: Arc::new(Instruments {
                by_id: DashMap::new(),
                next_id: AtomicU64::new(1),
                sample_failures: AtomicU64::new(0),
                max_instruments,
            }),
        }
    }

    /// Number of instruments currently attached.
    pub fn live_instruments(&self) -> usize {
        self.inner.by_id.len()
    }

    /// Number of instruments attached for pools with this logical name.
    pub fn instruments_for_pool(&self, pool_name: &str) -> usize {
        self.inner
            .by_id
            .iter()
            .filter(|e| e.group.pool_name == pool_name)
            .count()
    }

    /// Total number of failed samples since creation.
    pub fn sample_failures(&self) -> u64 {
        self.inner.sample_failures.load(Ordering::Relaxed)
    }

    /// Sample every attached instrument.
    pub fn collect(&self) -> Vec<Observation> {
        self.inner
            .by_id
            .iter()
            .map(|entry| {
                let value = (entry.callback)();
                if let Err(e) = &value {
                    self.inner.sample_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        "sampling {} for pool '{}' failed: {}",
                        entry.metric.instrument_name(),
                        entry.group.pool_name,
                        e
                    );
                }
                Observation {
                    instrumentation_name: entry.group.instrumentation_name.clone(),
                    pool_name: entry.group.pool_name.clone(),
                    pool_instance: entry.group.pool_instance,
                    metric: entry.metric,
                    value,
                }
            })
            .collect()
    }

    /// Sample every instrument and render the result in Prometheus text format.
    ///
    /// Every series carries `pool_name` and `pool_instance` labels, so two
    /// pools sharing a logical name never produce duplicate series. Failed
    /// samples produce no series; they are counted in
    /// `pool_metrics_sample_failures_total` instead.
    pub fn export_prometheus(&self) -> String {
        let mut observations = self.collect();
        observations.sort_by(|a, b| {
            (a.metric.instrument_name(), &a.pool_name, a.pool_instance, a.metric.state()).cmp(&(
                b.metric.instrument_name(),
                &b.pool_name,
                b.pool_instance,
                b.metric.state(),
            ))
        });

        let mut output = String::new();
        let mut current: Option<&'static str> = None;

        for obs in &observations {
            let Ok(value) = &obs.value else {
                continue;
            };
            let name = prometheus_name(obs.metric.instrument_name());

            if current != Some(obs.metric.instrument_name()) {
                current = Some(obs.metric.instrument_name());
                output.push_str(&format!("# HELP {} {}\n", name, obs.metric.description()));
                output.push_str(&format!("# TYPE {} gauge\n", name));
            }

            let mut labels = format!(
                "pool_name=\"{}\",pool_instance=\"{}\"",
                escape_label(&obs.pool_name),
                obs.pool_instance
            );
            if let Some(state) = obs.metric.state() {
                labels.push_str(&format!(",state=\"{}\"", state));
            }
            output.push_str(&format!("{}{{{}}} {}\n", name, labels, value));
        }

        output.push_str("# HELP pool_metrics_sample_failures_total Total failed connection pool samples\n");
        output.push_str("# TYPE pool_metrics_sample_failures_total counter\n");
        output.push_str(&format!(
            "pool_metrics_sample_failures_total {}\n",
            self.sample_failures()
        ));

        output
    }
}

impl Default for DashMapTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry for DashMapTelemetry {
    fn create_up_down_counter(
        &self,
        group: &MetricGroup,
        metric: ConnectionMetric,
        callback: PullCallback,
    ) -> Result<Box<dyn ObservableHandle>, TelemetryError> {
        if let Some(max) = self.inner.max_instruments {
            if self.inner.by_id.len() >= max {
                return Err(TelemetryError::Rejected {
                    instrument: metric.instrument_name().to_string(),
                    reason: format!("instrument limit of {} reached", max),
                });
            }
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.by_id.insert(
            id,
            Instrument {
                group: group.clone(),
                metric,
                callback,
            },
        );
        tracing::debug!(
            "attached instrument {} ({}) for pool '{}'",
            id,
            metric.instrument_name(),
            group.pool_name
        );

        Ok(Box::new(DashMapObservable {
            id,
            instruments: self.inner.clone(),
        }))
    }
}

/// Handle to one instrument in a DashMapTelemetry.
struct DashMapObservable {
    id: u64,
    instruments: Arc<Instruments>,
}

impl ObservableHandle for DashMapObservable {
    fn close(&self) -> Result<(), TelemetryError> {
        if self.instruments.by_id.remove(&self.id).is_some() {
            tracing::debug!("detached instrument {}", self.id);
        }
        Ok(())
    }
}

fn prometheus_name(instrument_name: &str) -> String {
    instrument_name.replace('.', "_")
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
