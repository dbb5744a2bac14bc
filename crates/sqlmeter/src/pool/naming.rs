//! Pool config-name resolution across the two naming shapes.

use std::time::Duration;

use super::ConnectionPool;

/// Default maximum connections for a structured config.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Default checkout timeout for a structured config.
pub const DEFAULT_CHECKOUT_TIMEOUT: Duration = Duration::from_secs(5);

/// Anything that can name the database configuration behind a pool.
pub trait HasConfigName {
    /// The logical configuration name, e.g. `"primary"`.
    fn config_name(&self) -> &str;
}

/// Structured database configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DbConfig {
    /// Configuration name.
    pub name: String,
    /// Maximum number of connections.
    pub pool: usize,
    /// How long a checkout may wait.
    pub checkout_timeout: Duration,
}

impl DbConfig {
    /// Create a configuration with default pool settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pool: DEFAULT_POOL_SIZE,
            checkout_timeout: DEFAULT_CHECKOUT_TIMEOUT,
        }
    }

    /// Set the maximum number of connections.
    pub fn with_pool(mut self, size: usize) -> Self {
        self.pool = size.max(1);
        self
    }

    /// Set the checkout timeout.
    pub fn with_checkout_timeout(mut self, timeout: Duration) -> Self {
        self.checkout_timeout = timeout;
        self
    }
}

impl HasConfigName for DbConfig {
    fn config_name(&self) -> &str {
        &self.name
    }
}

/// Legacy pool descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSpec {
    /// Descriptor name.
    pub name: String,
    /// Adapter identifier.
    pub adapter: String,
}

impl PoolSpec {
    /// Create a descriptor.
    pub fn new(name: impl Into<String>, adapter: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            adapter: adapter.into(),
        }
    }
}

impl HasConfigName for PoolSpec {
    fn config_name(&self) -> &str {
        &self.name
    }
}

/// Probe a pool for its naming capability, structured config first.
pub fn naming(pool: &dyn ConnectionPool) -> Option<&dyn HasConfigName> {
    if let Some(config) = pool.db_config() {
        return Some(config as &dyn HasConfigName);
    }
    pool.spec().map(|spec| spec as &dyn HasConfigName)
}

/// Resolve a pool's config name, if it exposes one.
pub fn config_name(pool: &dyn ConnectionPool) -> Option<&str> {
    naming(pool).map(HasConfigName::config_name)
}
