//! Connection Pool
//!
//! Pool of persistent TCP connections to a single target. Exposes its live
//! statistics through the PoolStatistics port so they can be published as
//! metrics.

use crate::domain::ports::{PoolQueryError, PoolStatistics};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum connections checked out at once
    pub max_connections: usize,
    /// Idle connections opened by `fill_idle`
    pub min_idle: usize,
    /// Maximum time a connection can be idle
    pub idle_timeout: Duration,
    /// Maximum connection lifetime
    pub max_lifetime: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Maximum time to wait for a free connection
    pub checkout_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_idle: 2,
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(3600),
            connect_timeout: Duration::from_secs(5),
            checkout_timeout: Duration::from_secs(5),
        }
    }
}

/// A connection resting in the pool.
struct IdleConnection {
    stream: TcpStream,
    created_at: Instant,
    last_used: Instant,
}

impl IdleConnection {
    fn new(stream: TcpStream) -> Self {
        let now = Instant::now();
        Self {
            stream,
            created_at: now,
            last_used: now,
        }
    }

    fn is_reusable(&self, config: &PoolConfig) -> bool {
        self.created_at.elapsed() <= config.max_lifetime && self.last_used.elapsed() <= config.idle_timeout
    }
}

/// A connection checked out of the pool.
///
/// Hand it back with `release` to keep it for reuse. Dropping it any other
/// way closes the connection and frees its checkout slot, like `discard`.
pub struct PooledConnection {
    /// The underlying TCP stream
    pub stream: TcpStream,
    /// When this connection was created
    created_at: Instant,
    /// When this connection was last used
    last_used: Instant,
    /// Counts this connection as busy until dropped
    _busy: BusyGuard,
    /// Checkout slot, returned to the pool when dropped
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    fn checkout(idle: IdleConnection, busy: BusyGuard, permit: OwnedSemaphorePermit) -> Self {
        Self {
            stream: idle.stream,
            created_at: idle.created_at,
            last_used: Instant::now(),
            _busy: busy,
            _permit: permit,
        }
    }

    /// Check if this connection has exceeded its lifetime.
    pub fn is_expired(&self, max_lifetime: Duration) -> bool {
        self.created_at.elapsed() > max_lifetime
    }

    /// Check if this connection has been idle too long.
    pub fn is_idle_expired(&self, idle_timeout: Duration) -> bool {
        self.last_used.elapsed() > idle_timeout
    }

    /// Touch the connection to update last_used.
    pub fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    fn into_idle(self) -> IdleConnection {
        IdleConnection {
            stream: self.stream,
            created_at: self.created_at,
            last_used: Instant::now(),
        }
    }
}

/// Holds one unit of the busy count for as long as a connection is checked out.
struct BusyGuard {
    in_use: Arc<AtomicUsize>,
}

impl BusyGuard {
    fn enter(in_use: &Arc<AtomicUsize>) -> Self {
        in_use.fetch_add(1, Ordering::SeqCst);
        Self { in_use: in_use.clone() }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Decrements the waiter count when a checkout stops waiting, including
/// when the acquiring future is dropped.
struct WaitGuard<'a> {
    waiting: &'a AtomicUsize,
}

impl<'a> WaitGuard<'a> {
    fn enter(waiting: &'a AtomicUsize) -> Self {
        waiting.fetch_add(1, Ordering::SeqCst);
        Self { waiting }
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Connection pool for one target address.
pub struct ConnectionPool {
    /// Logical pool name, may be empty
    name: String,
    /// Target address
    addr: String,
    config: PoolConfig,
    /// Available connections
    idle: Mutex<VecDeque<IdleConnection>>,
    /// Number of connections currently checked out
    in_use: Arc<AtomicUsize>,
    /// Number of callers waiting for a checkout slot
    waiting: AtomicUsize,
    /// One permit per checkout slot
    permits: Arc<Semaphore>,
    closed: AtomicBool,
}

impl ConnectionPool {
    /// Create a new connection pool.
    pub fn new(name: impl Into<String>, addr: impl Into<String>, config: PoolConfig) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
            permits: Arc::new(Semaphore::new(config.max_connections)),
            config,
            idle: Mutex::new(VecDeque::new()),
            in_use: Arc::new(AtomicUsize::new(0)),
            waiting: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Acquire a connection from the pool or create a new one.
    ///
    /// Waits up to `checkout_timeout` when all slots are taken.
    pub async fn acquire(&self) -> Result<PooledConnection, PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        let permit = self.checkout_permit().await?;

        while let Some(conn) = self.pop_idle() {
            if !conn.is_reusable(&self.config) {
                tracing::debug!("discarding expired connection to {}", self.addr);
                continue;
            }
            return Ok(PooledConnection::checkout(conn, BusyGuard::enter(&self.in_use), permit));
        }

        let stream = self.connect().await?;
        Ok(PooledConnection::checkout(
            IdleConnection::new(stream),
            BusyGuard::enter(&self.in_use),
            permit,
        ))
    }

    /// Release a connection back to the pool.
    pub fn release(&self, mut conn: PooledConnection) {
        if self.is_closed() || conn.is_expired(self.config.max_lifetime) {
            return;
        }

        conn.touch();

        let mut idle = self.idle.lock();
        if idle.len() < self.config.max_connections {
            idle.push_back(conn.into_idle());
        }
    }

    /// Discard a connection (don't return to pool).
    pub fn discard(&self, conn: PooledConnection) {
        drop(conn);
    }

    /// Open connections until `min_idle` are resting in the pool.
    ///
    /// Returns how many connections were opened.
    pub async fn fill_idle(&self) -> Result<usize, PoolError> {
        let target = self.config.min_idle.min(self.config.max_connections);
        let mut opened = 0;

        while self.idle_count() < target {
            if self.is_closed() {
                return Err(PoolError::Closed);
            }
            let stream = self.connect().await?;
            self.idle.lock().push_back(IdleConnection::new(stream));
            opened += 1;
        }

        if opened > 0 {
            tracing::debug!("pool '{}': opened {} idle connections to {}", self.name, opened, self.addr);
        }
        Ok(opened)
    }

    /// Get pool statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            in_use: self.in_use.load(Ordering::SeqCst),
            idle: self.idle_count(),
            waiting: self.waiting.load(Ordering::SeqCst),
            addr: self.addr.clone(),
        }
    }

    /// Start periodic cleanup of idle connections.
    ///
    /// The task stops once the pool is closed or dropped.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub fn start_cleanup(self: &Arc<Self>, interval: Duration) {
        let pool: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                ticker.tick().await;

                let Some(pool) = pool.upgrade() else {
                    break;
                };
                if pool.is_closed() {
                    break;
                }

                let removed = pool.remove_expired();
                if removed > 0 {
                    tracing::debug!("pool cleanup for '{}': removed {} idle connections", pool.name, removed);
                }
            }
        });
    }

    /// Close the pool. Waiting and future checkouts fail; statistics
    /// queries fail from now on.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.permits.close();
        let dropped = {
            let mut idle = self.idle.lock();
            let count = idle.len();
            idle.clear();
            count
        };
        tracing::info!("closed pool '{}' ({} idle connections dropped)", self.name, dropped);
    }

    async fn checkout_permit(&self) -> Result<OwnedSemaphorePermit, PoolError> {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => return Ok(permit),
            Err(TryAcquireError::Closed) => return Err(PoolError::Closed),
            Err(TryAcquireError::NoPermits) => {}
        }

        let _waiting = WaitGuard::enter(&self.waiting);
        match tokio::time::timeout(self.config.checkout_timeout, self.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(PoolError::Closed),
            Err(_) => Err(PoolError::CheckoutTimeout),
        }
    }

    async fn connect(&self) -> Result<TcpStream, PoolError> {
        match tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(PoolError::ConnectError(e.to_string())),
            Err(_) => Err(PoolError::ConnectTimeout),
        }
    }

    fn pop_idle(&self) -> Option<IdleConnection> {
        self.idle.lock().pop_front()
    }

    fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn remove_expired(&self) -> usize {
        let mut idle = self.idle.lock();
        let before = idle.len();
        idle.retain(|conn| conn.is_reusable(&self.config));
        before - idle.len()
    }

    fn ensure_open(&self) -> Result<(), PoolQueryError> {
        if self.is_closed() {
            return Err(PoolQueryError::Closed {
                pool: self.name.clone(),
            });
        }
        Ok(())
    }
}

impl PoolStatistics for ConnectionPool {
    fn logical_name(&self) -> String {
        self.name.clone()
    }

    fn busy_connections(&self) -> Result<i64, PoolQueryError> {
        self.ensure_open()?;
        Ok(self.in_use.load(Ordering::SeqCst) as i64)
    }

    fn idle_connections(&self) -> Result<i64, PoolQueryError> {
        self.ensure_open()?;
        Ok(self.idle_count() as i64)
    }

    fn threads_awaiting_checkout(&self) -> Result<i64, PoolQueryError> {
        self.ensure_open()?;
        Ok(self.waiting.load(Ordering::SeqCst) as i64)
    }
}

/// Pool statistics.
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Connections currently in use
    pub in_use: usize,
    /// Connections resting in the pool
    pub idle: usize,
    /// Callers waiting for a connection
    pub waiting: usize,
    /// Target address
    pub addr: String,
}

/// Pool errors.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolError {
    /// No connection became free within the checkout timeout
    CheckoutTimeout,
    /// Connection failed
    ConnectError(String),
    /// Connection timed out
    ConnectTimeout,
    /// Pool has been closed
    Closed,
}

impl std::fmt::Display for PoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolError::CheckoutTimeout => write!(f, "timed out waiting for a pooled connection"),
            PoolError::ConnectError(e) => write!(f, "connection error: {}", e),
            PoolError::ConnectTimeout => write!(f, "connection timeout"),
            PoolError::Closed => write!(f, "connection pool closed"),
        }
    }
}

impl std::error::Error for PoolError {}
