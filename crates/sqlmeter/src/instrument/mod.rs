//! Query and connection-pool instrumentation.
//!
//! Two independent paths feed the metrics registry:
//!
//! - [`QueryRecorder`] subscribes to query events and records one counter
//!   increment and one histogram observation per attributable query.
//! - [`PoolCollector`] runs at read time and snapshots every live pool into
//!   gauges.
//!
//! [`Instrumentation`] wires both into a bus and registry and owns the
//! subscription lifetime.

mod collector;
mod install;
mod labels;
mod recorder;

pub use collector::PoolCollector;
pub use install::Instrumentation;
pub use labels::LabelTuple;
pub use recorder::{duration_seconds, QueryRecorder};

use crate::config::InstrumentationConfig;
use crate::error::Result;
use crate::metrics::{Declaration, MetricsRegistry};

/// Pool gauges as `(name, help)`, in the order of [`crate::pool::PoolStats`].
const POOL_GAUGES: [(&str, &str); 7] = [
    ("connection_pool_size", "Maximum number of connections in the pool"),
    ("connection_pool_connections", "Connections currently held by the pool"),
    ("connection_pool_busy", "Connections checked out by live owners"),
    ("connection_pool_dead", "Connections checked out by owners that are gone"),
    ("connection_pool_idle", "Connections available for checkout"),
    ("connection_pool_waiting", "Callers waiting for a connection"),
    (
        "connection_pool_checkout_timeout_seconds",
        "How long a checkout waits before failing",
    ),
];

/// Fully qualified metric names for one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricNames {
    /// Query counter.
    pub queries_total: String,
    /// Query duration histogram.
    pub query_duration: String,
    /// Pool gauges, in [`crate::pool::PoolStats`] field order.
    pub pool_gauges: [String; 7],
}

impl MetricNames {
    /// Derive names from the configured prefix.
    pub fn new(config: &InstrumentationConfig) -> Self {
        Self {
            queries_total: config.metric_name("queries_total"),
            query_duration: config.metric_name("query_duration_seconds"),
            pool_gauges: POOL_GAUGES.map(|(name, _)| config.metric_name(name)),
        }
    }
}

/// Declare the counter, histogram and pool gauges in `registry`.
///
/// Either every metric is declared or none is. Metrics already declared with
/// the same schema are reused, so installing again after an uninstall works.
pub fn declare_metrics(
    registry: &MetricsRegistry,
    config: &InstrumentationConfig,
) -> Result<MetricNames> {
    config.validate()?;
    let names = MetricNames::new(config);

    let mut declarations = vec![
        Declaration::counter(
            &names.queries_total,
            "Total number of SQL queries executed",
            &LabelTuple::NAMES,
        ),
        Declaration::histogram(
            &names.query_duration,
            "Duration of SQL queries in seconds",
            &LabelTuple::NAMES,
            &config.buckets,
        ),
    ];
    for (name, (_, help)) in names.pool_gauges.iter().zip(POOL_GAUGES.iter()) {
        declarations.push(Declaration::gauge(name, help, &["config"]));
    }
    registry.declare_all(&declarations)?;

    Ok(names)
}
