//! Connection handler holding the live pools.

use parking_lot::RwLock;

use super::{config_name, PoolHandle};
use crate::error::{Error, Result};

/// Enumerates the live connection pools.
pub trait PoolSource: Send + Sync {
    /// Every currently configured pool.
    fn list_pools(&self) -> Result<Vec<PoolHandle>>;
}

/// In-process pool registry keyed by config name.
#[derive(Default)]
pub struct PoolRegistry {
    pools: RwLock<Vec<(String, PoolHandle)>>,
}

impl PoolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pool, replacing any pool with the same config name.
    pub fn register(&self, pool: PoolHandle) -> Result<()> {
        let name = config_name(pool.as_ref())
            .ok_or(Error::UnnamedPool)?
            .to_string();

        let mut pools = self.pools.write();
        match pools.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = pool,
            None => pools.push((name.clone(), pool)),
        }

        tracing::debug!(config = %name, "connection pool registered");
        Ok(())
    }

    /// Remove a pool by config name.
    pub fn remove(&self, name: &str) -> Option<PoolHandle> {
        let mut pools = self.pools.write();
        let index = pools.iter().position(|(existing, _)| existing == name)?;
        let (_, pool) = pools.remove(index);
        tracing::debug!(config = name, "connection pool removed");
        Some(pool)
    }

    /// Get a pool by config name.
    pub fn get(&self, name: &str) -> Option<PoolHandle> {
        self.pools
            .read()
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, pool)| pool.clone())
    }

    /// Number of registered pools.
    pub fn len(&self) -> usize {
        self.pools.read().len()
    }

    /// Whether no pools are registered.
    pub fn is_empty(&self) -> bool {
        self.pools.read().is_empty()
    }
}

impl PoolSource for PoolRegistry {
    fn list_pools(&self) -> Result<Vec<PoolHandle>> {
        Ok(self.pools.read().iter().map(|(_, pool)| pool.clone()).collect())
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.pools.read().iter().map(|(n, _)| n.clone()).collect();
        f.debug_struct("PoolRegistry").field("pools", &names).finish()
    }
}
