//! Label extraction for query events.

use crate::events::QueryEvent;
use crate::metrics::Labels;
use crate::pool::config_name;

/// Labels attached to every query metric.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelTuple {
    /// Config name of the pool that served the query.
    pub config: String,
    /// Operation name copied from the event.
    pub kind: String,
    /// Whether the event carried a cache marker.
    pub cached: bool,
    /// Whether the event carried an async marker.
    pub is_async: bool,
}

impl LabelTuple {
    /// Label names in exposition order.
    pub const NAMES: [&'static str; 4] = ["config", "kind", "cached", "async"];

    /// Derive labels from an event.
    ///
    /// Returns `None` when no real pool can be attributed: the event has no
    /// connection, the connection is the null pool, or the pool has no name.
    /// `cached` and `async` are true whenever the marker is present, even
    /// when its value is `false`.
    pub fn extract(event: &QueryEvent) -> Option<Self> {
        let pool = event.connection.as_deref()?;
        if pool.is_null() {
            return None;
        }
        let config = config_name(pool)?;

        Some(Self {
            config: config.to_string(),
            kind: event.name.clone(),
            cached: event.cached.is_some(),
            is_async: event.is_async.is_some(),
        })
    }

    /// Convert to a registry label set.
    pub fn to_labels(&self) -> Labels {
        Labels::new()
            .with(Self::NAMES[0], &self.config)
            .with(Self::NAMES[1], &self.kind)
            .with(Self::NAMES[2], self.cached)
            .with(Self::NAMES[3], self.is_async)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{
        ConnectionPool, DbConfig, ManagedPool, NullPool, PoolError, PoolHandle, PoolSpec,
        PoolStats,
    };
    use std::sync::Arc;

    struct LegacyPool(PoolSpec);

    impl ConnectionPool for LegacyPool {
        fn spec(&self) -> Option<&PoolSpec> {
            Some(&self.0)
        }

        fn stat(&self) -> Result<PoolStats, PoolError> {
            Ok(PoolStats::default())
        }
    }

    struct Anonymous;

    impl ConnectionPool for Anonymous {
        fn stat(&self) -> Result<PoolStats, PoolError> {
            Ok(PoolStats::default())
        }
    }

    fn primary() -> PoolHandle {
        Arc::new(ManagedPool::new(DbConfig::new("primary")))
    }

    #[test]
    fn test_extract_plain_event() {
        let event = QueryEvent::new(primary(), "User Load").with_duration_ms(12.0);
        let labels = LabelTuple::extract(&event).unwrap();

        assert_eq!(
            labels,
            LabelTuple {
                config: "primary".to_string(),
                kind: "User Load".to_string(),
                cached: false,
                is_async: false,
            }
        );
    }

    #[test]
    fn test_presence_not_value_sets_flags() {
        let event = QueryEvent::new(primary(), "User Load")
            .with_cached(false)
            .with_async(false);
        let labels = LabelTuple::extract(&event).unwrap();

        assert!(labels.cached);
        assert!(labels.is_async);
    }

    #[test]
    fn test_true_flags() {
        let event = QueryEvent::new(primary(), "")
            .with_cached(true)
            .with_async(true);
        let labels = LabelTuple::extract(&event).unwrap();

        assert!(labels.cached);
        assert!(labels.is_async);
        assert_eq!(labels.kind, "");
    }

    #[test]
    fn test_legacy_pool_name() {
        let pool: PoolHandle = Arc::new(LegacyPool(PoolSpec::new("reporting", "mysql2")));
        let labels = LabelTuple::extract(&QueryEvent::new(pool, "SQL")).unwrap();
        assert_eq!(labels.config, "reporting");
    }

    #[test]
    fn test_unattributable_events() {
        assert!(LabelTuple::extract(&QueryEvent::detached("User Load")).is_none());

        let null: PoolHandle = Arc::new(NullPool);
        assert!(LabelTuple::extract(&QueryEvent::new(null, "CACHE")).is_none());

        let anonymous: PoolHandle = Arc::new(Anonymous);
        assert!(LabelTuple::extract(&QueryEvent::new(anonymous, "SQL")).is_none());
    }

    #[test]
    fn test_to_labels_order() {
        let labels = LabelTuple {
            config: "primary".to_string(),
            kind: "User Load".to_string(),
            cached: true,
            is_async: false,
        }
        .to_labels();

        assert_eq!(
            labels.to_string(),
            r#"{config="primary",kind="User Load",cached="true",async="false"}"#
        );
    }
}
