//! Pool Metrics Registry
//!
//! Tracks which pools have counters attached and owns the register,
//! replace and unregister protocol.
//!
//! All updates for one pool go through a single DashMap entry lock: the
//! previous handle set is detached and the new one installed while the
//! entry is held, so two live sets for the same pool are never observable.

use crate::domain::entities::{MetricHandleSet, PoolIdentity};
use crate::domain::ports::{PoolStatistics, Telemetry};
use crate::domain::services::metric_factory::{create_meters, RegistrationError};
use crate::domain::value_objects::INSTRUMENTATION_NAME;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Counters attached for one pool.
struct Registration {
    /// Reported as the `pool_instance` attribute; kept when the pool is re-registered
    instance: u64,
    handles: MetricHandleSet,
}

/// Registry of pools with attached metrics, keyed by pool identity.
///
/// The generic methods accept any concrete pool behind an `Arc`; the
/// `_dyn` variants accept an already type-erased `Arc<dyn PoolStatistics>`.
/// Both resolve to the same identity for the same allocation.
pub struct PoolMetricsRegistry {
    instrumentation_name: String,
    entries: DashMap<PoolIdentity, Registration>,
    next_instance: AtomicU64,
}

impl PoolMetricsRegistry {
    /// Create an empty registry using the default instrumentation name.
    pub fn new() -> Self {
        Self::with_instrumentation_name(INSTRUMENTATION_NAME)
    }

    pub fn with_instrumentation_name(instrumentation_name: impl Into<String>) -> Self {
        Self {
            instrumentation_name: instrumentation_name.into(),
            entries: DashMap::new(),
            next_instance: AtomicU64::new(1),
        }
    }

    /// The process-wide registry, created empty on first use.
    pub fn global() -> &'static PoolMetricsRegistry {
        static GLOBAL: OnceLock<PoolMetricsRegistry> = OnceLock::new();
        GLOBAL.get_or_init(PoolMetricsRegistry::new)
    }

    pub fn instrumentation_name(&self) -> &str {
        &self.instrumentation_name
    }

    /// Attach counters for `pool`, replacing any set already attached to it.
    ///
    /// The previous set is detached before the new one is created. If
    /// creation fails the pool is left without an entry and the error is
    /// returned; registering again is the way to recover.
    pub fn register<P>(&self, telemetry: &dyn Telemetry, pool: &Arc<P>) -> Result<(), RegistrationError>
    where
        P: PoolStatistics + 'static,
    {
        let pool: Arc<dyn PoolStatistics> = pool.clone();
        self.register_dyn(telemetry, &pool)
    }

    /// Same as `register`, for a pool already held as a trait object.
    pub fn register_dyn(
        &self,
        telemetry: &dyn Telemetry,
        pool: &Arc<dyn PoolStatistics>,
    ) -> Result<(), RegistrationError> {
        match self.entries.entry(PoolIdentity::new(pool.clone())) {
            Entry::Occupied(mut occupied) => {
                let detached = occupied.get_mut().handles.detach();
                tracing::debug!("detached {} counters of previous registration for {}", detached, occupied.key());

                let instance = occupied.get().instance;
                match create_meters(telemetry, &self.instrumentation_name, instance, pool) {
                    Ok(handles) => {
                        occupied.get_mut().handles = handles;
                        tracing::info!("replaced connection pool metrics for {} (instance {})", occupied.key(), instance);
                        Ok(())
                    }
                    Err(e) => {
                        let (key, _) = occupied.remove_entry();
                        tracing::warn!("dropped connection pool metrics for {}: {}", key, e);
                        Err(e)
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let instance = self.next_instance.fetch_add(1, Ordering::Relaxed);
                let handles = create_meters(telemetry, &self.instrumentation_name, instance, pool)?;
                let entry = vacant.insert(Registration { instance, handles });
                tracing::info!("registered connection pool metrics for {} (instance {})", entry.key(), instance);
                Ok(())
            }
        }
    }

    /// Detach and forget the counters attached to `pool`, if any.
    pub fn unregister<P>(&self, pool: &Arc<P>)
    where
        P: PoolStatistics + 'static,
    {
        let pool: Arc<dyn PoolStatistics> = pool.clone();
        self.unregister_dyn(&pool)
    }

    /// Same as `unregister`, for a pool already held as a trait object.
    pub fn unregister_dyn(&self, pool: &Arc<dyn PoolStatistics>) {
        if let Entry::Occupied(mut occupied) = self.entries.entry(PoolIdentity::new(pool.clone())) {
            let detached = occupied.get_mut().handles.detach();
            let (key, _) = occupied.remove_entry();
            tracing::info!("unregistered connection pool metrics for {} ({} counters closed)", key, detached);
        }
    }

    /// Whether `pool` currently has counters attached.
    pub fn is_registered<P>(&self, pool: &Arc<P>) -> bool
    where
        P: PoolStatistics + 'static,
    {
        let pool: Arc<dyn PoolStatistics> = pool.clone();
        self.is_registered_dyn(&pool)
    }

    pub fn is_registered_dyn(&self, pool: &Arc<dyn PoolStatistics>) -> bool {
        self.entries.contains_key(&PoolIdentity::new(pool.clone()))
    }

    /// Number of handles attached for `pool`, if it is registered.
    pub fn live_handles<P>(&self, pool: &Arc<P>) -> Option<usize>
    where
        P: PoolStatistics + 'static,
    {
        let pool: Arc<dyn PoolStatistics> = pool.clone();
        self.entries.get(&PoolIdentity::new(pool)).map(|e| e.handles.len())
    }

    /// The `pool_instance` attribute reported for `pool`, if it is registered.
    pub fn instance_of<P>(&self, pool: &Arc<P>) -> Option<u64>
    where
        P: PoolStatistics + 'static,
    {
        let pool: Arc<dyn PoolStatistics> = pool.clone();
        self.entries.get(&PoolIdentity::new(pool)).map(|e| e.instance)
    }

    /// Logical names of all registered pools.
    pub fn pool_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().pool().logical_name()).collect()
    }

    /// Number of registered pools.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PoolMetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register `pool` with the process-wide registry.
pub fn register_metrics<P>(telemetry: &dyn Telemetry, pool: &Arc<P>) -> Result<(), RegistrationError>
where
    P: PoolStatistics + 'static,
{
    PoolMetricsRegistry::global().register(telemetry, pool)
}

/// Unregister `pool` from the process-wide registry.
pub fn unregister_metrics<P>(pool: &Arc<P>)
where
    P: PoolStatistics + 'static,
{
    PoolMetricsRegistry::global().unregister(pool)
}

/// Register a type-erased pool with the process-wide registry.
pub fn register_metrics_dyn(telemetry: &dyn Telemetry, pool: &Arc<dyn PoolStatistics>) -> Result<(), RegistrationError> {
    PoolMetricsRegistry::global().register_dyn(telemetry, pool)
}

/// Unregister a type-erased pool from the process-wide registry.
pub fn unregister_metrics_dyn(pool: &Arc<dyn PoolStatistics>) {
    PoolMetricsRegistry::global().unregister_dyn(pool)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::domain::ports::{ObservableHandle, PoolQueryError, PullCallback, TelemetryError};
    use crate::domain::value_objects::{ConnectionMetric, MetricGroup};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    #[derive(Debug, PartialEq)]
    struct FakePool {
        name: String,
    }

    impl FakePool {
        fn named(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
            })
        }
    }

    impl PoolStatistics for FakePool {
        fn logical_name(&self) -> String {
            self.name.clone()
        }
        fn busy_connections(&self) -> Result<i64, PoolQueryError> {
            Ok(1)
        }
        fn idle_connections(&self) -> Result<i64, PoolQueryError> {
            Ok(2)
        }
        fn threads_awaiting_checkout(&self) -> Result<i64, PoolQueryError> {
            Ok(0)
        }
    }

    /// Counts live handles; optionally rejects every request.
    #[derive(Default)]
    struct CountingTelemetry {
        live: Arc<AtomicUsize>,
        created: AtomicUsize,
        reject: AtomicBool,
    }

    struct CountingHandle {
        live: Arc<AtomicUsize>,
        closed: AtomicBool,
    }

    impl ObservableHandle for CountingHandle {
        fn close(&self) -> Result<(), TelemetryError> {
            if !self.closed.swap(true, Ordering::SeqCst) {
                self.live.fetch_sub(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    impl Telemetry for CountingTelemetry {
        fn create_up_down_counter(
            &self,
            _group: &MetricGroup,
            metric: ConnectionMetric,
            _callback: PullCallback,
        ) -> Result<Box<dyn ObservableHandle>, TelemetryError> {
            if self.reject.load(Ordering::SeqCst) {
                return Err(TelemetryError::Rejected {
                    instrument: metric.instrument_name().to_string(),
                    reason: "rejected by test".to_string(),
                });
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(CountingHandle {
                live: self.live.clone(),
                closed: AtomicBool::new(false),
            }))
        }
    }

    impl CountingTelemetry {
        fn live(&self) -> usize {
            self.live.load(Ordering::SeqCst)
        }
    }

    // ===== Register Tests =====

    #[test]
    fn test_register_attaches_three_handles() {
        let registry = PoolMetricsRegistry::new();
        let telemetry = CountingTelemetry::default();
        let pool = FakePool::named("orders-db");

        registry.register(&telemetry, &pool).unwrap();

        assert!(registry.is_registered(&pool));
        assert_eq!(registry.live_handles(&pool), Some(3));
        assert_eq!(telemetry.live(), 3);
    }

    #[test]
    fn test_reregister_replaces_handles() {
        let registry = PoolMetricsRegistry::new();
        let telemetry = CountingTelemetry::default();
        let pool = FakePool::named("orders-db");

        registry.register(&telemetry, &pool).unwrap();
        registry.register(&telemetry, &pool).unwrap();
        registry.register(&telemetry, &pool).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(telemetry.created.load(Ordering::SeqCst), 9);
        assert_eq!(telemetry.live(), 3);
    }

    #[test]
    fn test_value_equal_pools_are_tracked_separately() {
        let registry = PoolMetricsRegistry::new();
        let telemetry = CountingTelemetry::default();
        let p1 = FakePool::named("orders-db");
        let p2 = FakePool::named("orders-db");
        assert_eq!(p1, p2);

        registry.register(&telemetry, &p1).unwrap();
        registry.register(&telemetry, &p2).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(telemetry.live(), 6);

        registry.unregister(&p1);
        assert!(!registry.is_registered(&p1));
        assert!(registry.is_registered(&p2));
        assert_eq!(telemetry.live(), 3);
    }

    #[test]
    fn test_register_failure_leaves_no_entry() {
        let registry = PoolMetricsRegistry::new();
        let telemetry = CountingTelemetry::default();
        telemetry.reject.store(true, Ordering::SeqCst);
        let pool = FakePool::named("orders-db");

        let result = registry.register(&telemetry, &pool);

        assert!(matches!(result, Err(RegistrationError::CounterCreation { .. })));
        assert!(!registry.is_registered(&pool));
        assert_eq!(telemetry.live(), 0);
    }

    #[test]
    fn test_failed_reregister_detaches_previous_set() {
        let registry = PoolMetricsRegistry::new();
        let telemetry = CountingTelemetry::default();
        let pool = FakePool::named("orders-db");

        registry.register(&telemetry, &pool).unwrap();
        telemetry.reject.store(true, Ordering::SeqCst);
        assert!(registry.register(&telemetry, &pool).is_err());

        assert!(!registry.is_registered(&pool));
        assert_eq!(telemetry.live(), 0);

        telemetry.reject.store(false, Ordering::SeqCst);
        registry.register(&telemetry, &pool).unwrap();
        assert_eq!(telemetry.live(), 3);
    }

    #[test]
    fn test_register_trait_object_pool() {
        let registry = PoolMetricsRegistry::new();
        let telemetry = CountingTelemetry::default();
        let orders: Arc<dyn PoolStatistics> = FakePool::named("orders-db");
        let users: Arc<dyn PoolStatistics> = FakePool::named("users-db");
        let pools = vec![orders, users];

        for pool in &pools {
            registry.register_dyn(&telemetry, pool).unwrap();
        }

        assert_eq!(registry.len(), 2);
        assert!(pools.iter().all(|p| registry.is_registered_dyn(p)));
        assert_eq!(telemetry.live(), 6);

        registry.unregister_dyn(&pools[0]);
        assert!(!registry.is_registered_dyn(&pools[0]));
        assert_eq!(telemetry.live(), 3);
    }

    #[test]
    fn test_concrete_and_trait_object_share_identity() {
        let registry = PoolMetricsRegistry::new();
        let telemetry = CountingTelemetry::default();
        let pool = FakePool::named("orders-db");
        let erased: Arc<dyn PoolStatistics> = pool.clone();

        registry.register(&telemetry, &pool).unwrap();
        registry.register_dyn(&telemetry, &erased).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(telemetry.live(), 3);

        registry.unregister_dyn(&erased);
        assert!(!registry.is_registered(&pool));
        assert_eq!(telemetry.live(), 0);
    }

    #[test]
    fn test_instance_ids() {
        let registry = PoolMetricsRegistry::new();
        let telemetry = CountingTelemetry::default();
        let p1 = FakePool::named("orders-db");
        let p2 = FakePool::named("orders-db");

        registry.register(&telemetry, &p1).unwrap();
        registry.register(&telemetry, &p2).unwrap();
        assert_eq!(registry.instance_of(&p1), Some(1));
        assert_eq!(registry.instance_of(&p2), Some(2));

        // Re-registration keeps the instance
        registry.register(&telemetry, &p1).unwrap();
        assert_eq!(registry.instance_of(&p1), Some(1));

        registry.unregister(&p1);
        assert_eq!(registry.instance_of(&p1), None);
    }

    // ===== Unregister Tests =====

    #[test]
    fn test_unregister_detaches_handles() {
        let registry = PoolMetricsRegistry::new();
        let telemetry = CountingTelemetry::default();
        let pool = FakePool::named("orders-db");

        registry.register(&telemetry, &pool).unwrap();
        registry.unregister(&pool);

        assert!(registry.is_empty());
        assert_eq!(registry.live_handles(&pool), None);
        assert_eq!(telemetry.live(), 0);
    }

    #[test]
    fn test_unregister_unknown_pool_is_noop() {
        let registry = PoolMetricsRegistry::new();
        let pool = FakePool::named("orders-db");

        registry.unregister(&pool);
        registry.unregister(&pool);

        assert!(registry.is_empty());
    }

    #[test]
    fn test_double_unregister_is_noop() {
        let registry = PoolMetricsRegistry::new();
        let telemetry = CountingTelemetry::default();
        let pool = FakePool::named("orders-db");

        registry.register(&telemetry, &pool).unwrap();
        registry.unregister(&pool);
        registry.unregister(&pool);

        assert_eq!(telemetry.live(), 0);
        assert!(registry.is_empty());
    }

    // ===== Helper Methods Tests =====

    #[test]
    fn test_instrumentation_name() {
        assert_eq!(PoolMetricsRegistry::new().instrumentation_name(), "pool-metrics");
        assert_eq!(
            PoolMetricsRegistry::with_instrumentation_name("custom").instrumentation_name(),
            "custom"
        );
        assert!(PoolMetricsRegistry::default().is_empty());
    }

    #[test]
    fn test_pool_names() {
        let registry = PoolMetricsRegistry::new();
        let telemetry = CountingTelemetry::default();
        let p1 = FakePool::named("orders-db");
        let p2 = FakePool::named("users-db");

        registry.register(&telemetry, &p1).unwrap();
        registry.register(&telemetry, &p2).unwrap();

        let mut names = registry.pool_names();
        names.sort();
        assert_eq!(names, vec!["orders-db".to_string(), "users-db".to_string()]);
    }

    #[test]
    fn test_global_registry_trait_object_functions() {
        let telemetry = CountingTelemetry::default();
        let pool: Arc<dyn PoolStatistics> = FakePool::named("global-dyn-db");

        register_metrics_dyn(&telemetry, &pool).unwrap();
        assert!(PoolMetricsRegistry::global().is_registered_dyn(&pool));

        unregister_metrics_dyn(&pool);
        assert!(!PoolMetricsRegistry::global().is_registered_dyn(&pool));
        assert_eq!(telemetry.live(), 0);
    }

    #[test]
    fn test_global_registry_functions() {
        let telemetry = CountingTelemetry::default();
        let pool = FakePool::named("global-db");

        register_metrics(&telemetry, &pool).unwrap();
        assert!(PoolMetricsRegistry::global().is_registered(&pool));

        unregister_metrics(&pool);
        assert!(!PoolMetricsRegistry::global().is_registered(&pool));
        assert_eq!(telemetry.live(), 0);
    }

    // ===== Concurrency Safety Tests =====

    #[test]
    fn test_concurrent_register_same_pool() {
        let registry = Arc::new(PoolMetricsRegistry::new());
        let telemetry = Arc::new(CountingTelemetry::default());
        let pool = FakePool::named("orders-db");
        let mut handles = vec![];

        for _ in 0..8 {
            let registry = registry.clone();
            let telemetry = telemetry.clone();
            let pool = pool.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    registry.register(telemetry.as_ref(), &pool).unwrap();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(registry.len(), 1);
        assert_eq!(telemetry.created.load(Ordering::SeqCst), 8 * 50 * 3);
        assert_eq!(telemetry.live(), 3);
    }

    #[test]
    fn test_concurrent_register_and_unregister() {
        let registry = Arc::new(PoolMetricsRegistry::new());
        let telemetry = Arc::new(CountingTelemetry::default());
        let pool = FakePool::named("orders-db");
        let mut handles = vec![];

        for i in 0..8 {
            let registry = registry.clone();
            let telemetry = telemetry.clone();
            let pool = pool.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    if i % 2 == 0 {
                        registry.register(telemetry.as_ref(), &pool).unwrap();
                    } else {
                        registry.unregister(&pool);
                    }
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        let expected = registry.live_handles(&pool).unwrap_or(0);
        assert_eq!(telemetry.live(), expected);
        assert!(expected == 0 || expected == 3);
    }
}
