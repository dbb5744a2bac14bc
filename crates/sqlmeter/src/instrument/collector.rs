//! Connection-pool snapshot collector.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::metrics::{Collect, Labels, MetricsSink};
use crate::pool::{config_name, PoolSource, PoolStats};

/// Writes one gauge set per live pool each time it is collected.
///
/// Every pool is read exactly once per cycle, and all reads finish before
/// any gauge is written. Gauge families are checked against the sink before
/// the first write, so a failed read or an undeclared gauge leaves the
/// previous snapshot intact.
pub struct PoolCollector {
    sink: Arc<dyn MetricsSink>,
    pools: Arc<dyn PoolSource>,
    gauges: [String; 7],
}

impl PoolCollector {
    /// Create a collector writing to `gauges`, in [`PoolStats`] field order.
    pub fn new(sink: Arc<dyn MetricsSink>, pools: Arc<dyn PoolSource>, gauges: [String; 7]) -> Self {
        Self {
            sink,
            pools,
            gauges,
        }
    }

    /// Read every pool once.
    fn snapshot(&self) -> Result<Vec<(String, PoolStats)>> {
        let mut snapshots = Vec::new();
        for pool in self.pools.list_pools()? {
            if pool.is_null() {
                continue;
            }
            let name = config_name(pool.as_ref())
                .ok_or(Error::UnnamedPool)?
                .to_string();
            let stats = pool.stat().map_err(|source| Error::Pool {
                pool: name.clone(),
                source,
            })?;
            snapshots.push((name, stats));
        }
        Ok(snapshots)
    }
}

impl Collect for PoolCollector {
    fn collect(&self) -> Result<()> {
        let snapshots = self.snapshot().inspect_err(|e| {
            tracing::warn!(error = %e, "connection pool collection failed");
        })?;

        if let Some((name, _)) = snapshots.first() {
            let labels = Labels::new().with("config", name);
            for gauge in &self.gauges {
                self.sink.check_gauge(gauge, &labels).inspect_err(|e| {
                    tracing::warn!(error = %e, gauge = %gauge, "pool gauge not writable");
                })?;
            }
        }

        for (name, stats) in &snapshots {
            let labels = Labels::new().with("config", name);
            for (gauge, value) in self.gauges.iter().zip(gauge_values(stats)) {
                self.sink.set(gauge, &labels, value)?;
            }
        }

        tracing::debug!(pools = snapshots.len(), "connection pool gauges collected");
        Ok(())
    }
}

impl std::fmt::Debug for PoolCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolCollector")
            .field("gauges", &self.gauges)
            .finish()
    }
}

fn gauge_values(stats: &PoolStats) -> [f64; 7] {
    [
        stats.size as f64,
        stats.connections as f64,
        stats.busy as f64,
        stats.dead as f64,
        stats.idle as f64,
        stats.waiting as f64,
        stats.checkout_timeout.as_secs_f64(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsRegistry;
    use crate::pool::{
        ConnectionPool, DbConfig, NullPool, PoolError, PoolHandle, PoolRegistry, PoolSpec,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubPool {
        config: DbConfig,
        stats: PoolStats,
        fail: bool,
        reads: AtomicUsize,
    }

    impl StubPool {
        fn new(name: &str, stats: PoolStats) -> Arc<Self> {
            Arc::new(Self {
                config: DbConfig::new(name),
                stats,
                fail: false,
                reads: AtomicUsize::new(0),
            })
        }

        fn failing(name: &str) -> Arc<Self> {
            Arc::new(Self {
                config: DbConfig::new(name),
                stats: PoolStats::default(),
                fail: true,
                reads: AtomicUsize::new(0),
            })
        }
    }

    impl ConnectionPool for StubPool {
        fn db_config(&self) -> Option<&DbConfig> {
            Some(&self.config)
        }

        fn stat(&self) -> std::result::Result<PoolStats, PoolError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PoolError::Stat("connection reset".to_string()));
            }
            Ok(self.stats)
        }
    }

    struct LegacyPool(PoolSpec);

    impl ConnectionPool for LegacyPool {
        fn spec(&self) -> Option<&PoolSpec> {
            Some(&self.0)
        }

        fn stat(&self) -> std::result::Result<PoolStats, PoolError> {
            Ok(PoolStats {
                size: 2,
                ..PoolStats::default()
            })
        }
    }

    struct Listing(Vec<PoolHandle>);

    impl PoolSource for Listing {
        fn list_pools(&self) -> Result<Vec<PoolHandle>> {
            Ok(self.0.clone())
        }
    }

    fn gauges() -> [String; 7] {
        [
            "size",
            "connections",
            "busy",
            "dead",
            "idle",
            "waiting",
            "checkout_timeout",
        ]
        .map(String::from)
    }

    fn registry() -> Arc<MetricsRegistry> {
        let registry = MetricsRegistry::new();
        for gauge in gauges() {
            registry.declare_gauge(&gauge, "test", &["config"]).unwrap();
        }
        Arc::new(registry)
    }

    fn config(name: &str) -> Labels {
        Labels::new().with("config", name)
    }

    fn primary_stats() -> PoolStats {
        PoolStats {
            size: 5,
            connections: 3,
            busy: 2,
            dead: 0,
            idle: 1,
            waiting: 0,
            checkout_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_collect_primary_pool() {
        let registry = registry();
        let primary: PoolHandle = StubPool::new("primary", primary_stats());
        let pools = Arc::new(Listing(vec![primary]));
        let collector = PoolCollector::new(registry.clone(), pools, gauges());

        collector.collect().unwrap();

        let labels = config("primary");
        assert_eq!(registry.gauge_value("size", &labels), Some(5.0));
        assert_eq!(registry.gauge_value("connections", &labels), Some(3.0));
        assert_eq!(registry.gauge_value("busy", &labels), Some(2.0));
        assert_eq!(registry.gauge_value("dead", &labels), Some(0.0));
        assert_eq!(registry.gauge_value("idle", &labels), Some(1.0));
        assert_eq!(registry.gauge_value("waiting", &labels), Some(0.0));
        assert_eq!(registry.gauge_value("checkout_timeout", &labels), Some(5.0));
    }

    #[test]
    fn test_single_stat_read_per_pool() {
        let registry = registry();
        let a = StubPool::new("a", primary_stats());
        let b = StubPool::new("b", primary_stats());
        let pools = Arc::new(Listing(vec![a.clone() as PoolHandle, b.clone()]));
        let collector = PoolCollector::new(registry.clone(), pools, gauges());

        collector.collect().unwrap();
        assert_eq!(a.reads.load(Ordering::SeqCst), 1);
        assert_eq!(b.reads.load(Ordering::SeqCst), 1);

        for gauge in gauges() {
            assert_eq!(registry.series_count(&gauge), 2);
        }
    }

    #[test]
    fn test_collect_overwrites() {
        let registry = registry();
        let pools = Arc::new(PoolRegistry::new());
        pools.register(StubPool::new("primary", primary_stats())).unwrap();
        let collector = PoolCollector::new(registry.clone(), pools.clone(), gauges());

        collector.collect().unwrap();
        pools
            .register(StubPool::new(
                "primary",
                PoolStats {
                    busy: 4,
                    ..primary_stats()
                },
            ))
            .unwrap();
        collector.collect().unwrap();

        assert_eq!(registry.gauge_value("busy", &config("primary")), Some(4.0));
    }

    #[test]
    fn test_undeclared_gauge_writes_nothing() {
        let registry = MetricsRegistry::new();
        for gauge in &gauges()[..6] {
            registry.declare_gauge(gauge, "test", &["config"]).unwrap();
        }
        let registry = Arc::new(registry);
        let pools = Arc::new(Listing(vec![
            StubPool::new("primary", primary_stats()) as PoolHandle,
            StubPool::new("replica", primary_stats()),
        ]));
        let collector = PoolCollector::new(registry.clone(), pools, gauges());

        let result = collector.collect();
        assert!(matches!(result, Err(Error::UnknownMetric(name)) if name == "checkout_timeout"));
        for gauge in &gauges()[..6] {
            assert_eq!(registry.series_count(gauge), 0, "{gauge}");
        }
    }

    #[test]
    fn test_legacy_named_pool() {
        let registry = registry();
        let legacy: PoolHandle = Arc::new(LegacyPool(PoolSpec::new("legacy", "sqlite3")));
        let collector = PoolCollector::new(registry.clone(), Arc::new(Listing(vec![legacy])), gauges());

        collector.collect().unwrap();
        assert_eq!(registry.gauge_value("size", &config("legacy")), Some(2.0));
    }

    #[test]
    fn test_stat_failure_fails_cycle_without_partial_writes() {
        let registry = registry();
        let ok = StubPool::new("ok", primary_stats());
        let broken = StubPool::failing("broken");
        let pools = Arc::new(Listing(vec![ok.clone() as PoolHandle, broken]));
        let collector = PoolCollector::new(registry.clone(), pools, gauges());

        let result = collector.collect();
        assert!(matches!(result, Err(Error::Pool { ref pool, .. }) if pool == "broken"));

        // The healthy pool was read but nothing was published.
        assert_eq!(ok.reads.load(Ordering::SeqCst), 1);
        assert_eq!(registry.gauge_value("size", &config("ok")), None);
    }

    #[test]
    fn test_null_pools_are_skipped() {
        let registry = registry();
        let null: PoolHandle = Arc::new(NullPool);
        let collector = PoolCollector::new(registry.clone(), Arc::new(Listing(vec![null])), gauges());

        collector.collect().unwrap();
        assert_eq!(registry.series_count("size"), 0);
    }

    #[test]
    fn test_unnamed_pool_fails_cycle() {
        struct Anonymous;

        impl ConnectionPool for Anonymous {
            fn stat(&self) -> std::result::Result<PoolStats, PoolError> {
                Ok(PoolStats::default())
            }
        }

        let registry = registry();
        let anonymous: PoolHandle = Arc::new(Anonymous);
        let collector =
            PoolCollector::new(registry, Arc::new(Listing(vec![anonymous])), gauges());

        assert!(matches!(collector.collect(), Err(Error::UnnamedPool)));
    }
}
