//! Domain Entities - Core business objects
//!
//! These entities represent the core concepts of the pool metrics domain.
//! They depend only on the ports, never on a concrete backend or pool.

use crate::domain::ports::{ObservableHandle, PoolStatistics};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Map key identifying a pool by reference identity.
///
/// Two keys are equal iff they wrap the same pool allocation. Whatever
/// equality the pool type itself defines is ignored, so two distinct pools
/// that compare equal by value are still tracked separately.
#[derive(Clone)]
pub struct PoolIdentity {
    pool: Arc<dyn PoolStatistics>,
}

impl PoolIdentity {
    pub fn new(pool: Arc<dyn PoolStatistics>) -> Self {
        Self { pool }
    }

    /// The wrapped pool.
    pub fn pool(&self) -> &Arc<dyn PoolStatistics> {
        &self.pool
    }

    // Thin pointer: comparing fat `dyn` pointers would also compare vtables.
    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.pool).cast::<()>()
    }
}

impl PartialEq for PoolIdentity {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.addr(), other.addr())
    }
}

impl Eq for PoolIdentity {}

impl Hash for PoolIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.addr(), state);
    }
}

impl std::fmt::Debug for PoolIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolIdentity")
            .field("name", &self.pool.logical_name())
            .field("addr", &self.addr())
            .finish()
    }
}

impl std::fmt::Display for PoolIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' ({:p})", self.pool.logical_name(), self.addr())
    }
}

/// The observable counters created for one pool registration.
///
/// Detaching closes every handle and leaves the set empty, so a second
/// detach is a no-op. Dropping a set detaches whatever is still attached.
#[derive(Default)]
pub struct MetricHandleSet {
    handles: Vec<Box<dyn ObservableHandle>>,
}

impl MetricHandleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            handles: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, handle: Box<dyn ObservableHandle>) {
        self.handles.push(handle);
    }

    /// Number of handles still attached.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Close every attached handle.
    ///
    /// Close failures are logged and skipped; the handle is released either
    /// way. Returns the number of handles that closed cleanly.
    pub fn detach(&mut self) -> usize {
        let mut closed = 0;
        for handle in self.handles.drain(..) {
            match handle.close() {
                Ok(()) => closed += 1,
                Err(e) => tracing::warn!("failed to close observable counter: {}", e),
            }
        }
        closed
    }
}

impl Drop for MetricHandleSet {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.detach();
        }
    }
}

impl std::fmt::Debug for MetricHandleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricHandleSet")
            .field("handles", &self.handles.len())
            .finish()
    }
}
