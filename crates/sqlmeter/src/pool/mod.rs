//! Connection pool interface consumed by the instrumentation.
//!
//! The instrumentation never owns or mutates pools. It resolves a pool's
//! config name and reads point-in-time [`PoolStats`] snapshots.

mod managed;
mod naming;
mod registry;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

pub use managed::{ManagedPool, PooledConnection};
pub use naming::{config_name, naming, DbConfig, HasConfigName, PoolSpec};
pub use registry::{PoolRegistry, PoolSource};

/// Errors reported by pool implementations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Pool statistics could not be read.
    #[error("stat unavailable: {0}")]
    Stat(String),

    /// No connection became available in time.
    #[error("timed out after {0:?} waiting for a connection")]
    CheckoutTimeout(Duration),

    /// The pool has been closed.
    #[error("pool is closed")]
    Closed,
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Maximum number of connections.
    pub size: usize,
    /// Connections currently held by the pool.
    pub connections: usize,
    /// Connections checked out by live owners.
    pub busy: usize,
    /// Connections checked out by owners that are gone.
    pub dead: usize,
    /// Connections available for checkout.
    pub idle: usize,
    /// Callers blocked waiting for a connection.
    pub waiting: usize,
    /// How long a checkout waits before failing.
    pub checkout_timeout: Duration,
}

/// A database connection pool.
///
/// Pools name themselves through one of two shapes: a structured
/// [`DbConfig`] or a legacy [`PoolSpec`]. Implement whichever applies.
pub trait ConnectionPool: Send + Sync {
    /// Structured configuration.
    fn db_config(&self) -> Option<&DbConfig> {
        None
    }

    /// Legacy descriptor.
    fn spec(&self) -> Option<&PoolSpec> {
        None
    }

    /// Read a statistics snapshot.
    fn stat(&self) -> Result<PoolStats, PoolError>;

    /// Whether this pool stands in for "no real connection".
    fn is_null(&self) -> bool {
        false
    }
}

/// Shared pool handle.
pub type PoolHandle = Arc<dyn ConnectionPool>;

/// Sentinel pool used when no real connection served a query.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPool;

impl ConnectionPool for NullPool {
    fn stat(&self) -> Result<PoolStats, PoolError> {
        Ok(PoolStats::default())
    }

    fn is_null(&self) -> bool {
        true
    }
}
