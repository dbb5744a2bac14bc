//! Semaphore-bounded connection pool with live statistics.
//!
//! Connections are abstract slots: the pool tracks how many exist, who holds
//! them, and who is waiting, which is everything [`PoolStats`] reports.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::{ConnectionPool, DbConfig, PoolError, PoolStats};

/// Mutable pool bookkeeping, guarded by one lock so snapshots are consistent.
#[derive(Default)]
struct PoolState {
    /// Ids of connections available for checkout.
    idle: Vec<u64>,
    /// Connections checked out by live owners.
    busy: usize,
    /// Permits held by connections whose owner went away without checkin.
    dead: Vec<OwnedSemaphorePermit>,
    /// Callers blocked in `checkout`.
    waiting: usize,
    /// Connections opened so far, used to mint ids.
    opened: u64,
}

struct PoolInner {
    config: DbConfig,
    semaphore: Arc<Semaphore>,
    state: Mutex<PoolState>,
}

impl PoolInner {
    fn checkin(&self, id: u64) {
        let mut state = self.state.lock();
        state.busy = state.busy.saturating_sub(1);
        if !self.semaphore.is_closed() {
            state.idle.push(id);
        }
    }

    fn bury(&self, permit: OwnedSemaphorePermit) {
        let mut state = self.state.lock();
        state.busy = state.busy.saturating_sub(1);
        state.dead.push(permit);
    }
}

/// Counts a caller as waiting for as long as it is alive, even if the
/// checkout future is dropped mid-wait.
struct WaitGuard<'a> {
    pool: &'a PoolInner,
}

impl<'a> WaitGuard<'a> {
    fn enter(pool: &'a PoolInner) -> Self {
        pool.state.lock().waiting += 1;
        Self { pool }
    }
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.pool.state.lock();
        state.waiting = state.waiting.saturating_sub(1);
    }
}

/// A connection pool bounded by its configured size.
///
/// # Example
///
/// ```ignore
/// use sqlmeter::pool::{DbConfig, ManagedPool};
///
/// let pool = ManagedPool::new(DbConfig::new("primary").with_pool(10));
/// let conn = pool.checkout().await?;
/// // ... run a query ...
/// drop(conn); // checked back in
/// ```
#[derive(Clone)]
pub struct ManagedPool {
    inner: Arc<PoolInner>,
}

impl ManagedPool {
    /// Create a pool from a structured configuration.
    pub fn new(config: DbConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.pool));
        Self {
            inner: Arc::new(PoolInner {
                config,
                semaphore,
                state: Mutex::new(PoolState::default()),
            }),
        }
    }

    /// The config name of this pool.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Check out a connection, waiting up to the configured checkout timeout.
    pub async fn checkout(&self) -> Result<PooledConnection, PoolError> {
        let timeout = self.inner.config.checkout_timeout;

        let acquired = {
            let _waiting = WaitGuard::enter(&self.inner);
            tokio::time::timeout(timeout, self.inner.semaphore.clone().acquire_owned()).await
        };

        let permit = match acquired {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(PoolError::Closed),
            Err(_) => {
                tracing::debug!(config = %self.name(), ?timeout, "checkout timed out");
                return Err(PoolError::CheckoutTimeout(timeout));
            }
        };

        let id = {
            let mut state = self.inner.state.lock();
            state.busy += 1;
            match state.idle.pop() {
                Some(id) => id,
                None => {
                    state.opened += 1;
                    state.opened
                }
            }
        };

        Ok(PooledConnection {
            id,
            permit: Some(permit),
            pool: self.inner.clone(),
        })
    }

    /// Discard connections whose owners went away, freeing their slots.
    ///
    /// Returns the number of connections reaped.
    pub fn reap(&self) -> usize {
        let reaped: Vec<OwnedSemaphorePermit> = std::mem::take(&mut self.inner.state.lock().dead);
        let count = reaped.len();
        if count > 0 {
            tracing::debug!(config = %self.name(), count, "reaped dead connections");
        }
        count
    }

    /// Close the pool. Pending and future checkouts fail with [`PoolError::Closed`].
    pub fn close(&self) {
        self.inner.semaphore.close();
        self.inner.state.lock().idle.clear();
    }
}

impl ConnectionPool for ManagedPool {
    fn db_config(&self) -> Option<&DbConfig> {
        Some(&self.inner.config)
    }

    fn stat(&self) -> Result<PoolStats, PoolError> {
        let state = self.inner.state.lock();
        let dead = state.dead.len();
        Ok(PoolStats {
            size: self.inner.config.pool,
            connections: state.idle.len() + state.busy + dead,
            busy: state.busy,
            dead,
            idle: state.idle.len(),
            waiting: state.waiting,
            checkout_timeout: self.inner.config.checkout_timeout,
        })
    }
}

impl std::fmt::Debug for ManagedPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedPool")
            .field("name", &self.inner.config.name)
            .field("size", &self.inner.config.pool)
            .finish()
    }
}

/// A checked-out connection that returns itself to the pool when dropped.
pub struct PooledConnection {
    id: u64,
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<PoolInner>,
}

impl PooledConnection {
    /// Connection identifier, stable across checkouts.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Mark the connection as abandoned by its owner.
    ///
    /// The slot stays occupied and is reported as dead until the pool reaps it.
    pub fn abandon(mut self) {
        if let Some(permit) = self.permit.take() {
            self.pool.bury(permit);
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.pool.checkin(self.id);
            drop(permit);
        }
    }
}
