//! Metrics collection infrastructure.
//!
//! [`MetricsSink`] is the narrow interface the instrumentation writes
//! through; [`MetricsRegistry`] is the in-process implementation with
//! Prometheus text export.
//!
//! # Usage
//!
//! ```ignore
//! use sqlmeter::metrics::{new_shared_registry, Labels, MetricsSink};
//!
//! let registry = new_shared_registry();
//! registry.declare_gauge("db_connection_pool_size", "Pool size", &["config"])?;
//! registry.set("db_connection_pool_size", &Labels::new().with("config", "primary"), 5.0)?;
//!
//! let prometheus_text = registry.to_prometheus()?;
//! ```

mod histogram;
mod labels;
mod registry;

pub use histogram::{Histogram, HistogramSnapshot};
pub use labels::Labels;
pub use registry::{
    new_shared_registry, Collect, Declaration, MetricsRegistry, MetricsSink,
    SharedMetricsRegistry,
};
