//! sqlmeter - Operational metrics for database client layers.
//!
//! This crate turns query-execution events into labeled counters and latency
//! histograms, and snapshots connection-pool state into gauges at read time.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use sqlmeter::{
//!     new_shared_registry, DbConfig, EventBus, Instrumentation, InstrumentationConfig,
//!     ManagedPool, PoolRegistry, QueryEvent,
//! };
//!
//! let bus = Arc::new(EventBus::new());
//! let registry = new_shared_registry();
//! let pools = Arc::new(PoolRegistry::new());
//! let primary = Arc::new(ManagedPool::new(DbConfig::new("primary")));
//! pools.register(primary.clone())?;
//!
//! let config = InstrumentationConfig::default();
//! let _instrumentation = Instrumentation::install(bus.clone(), registry.clone(), pools, &config)?;
//!
//! // The database layer publishes one event per statement.
//! bus.publish(&config.channel, &QueryEvent::new(primary, "User Load").with_duration_ms(12.0));
//!
//! // Pool gauges are refreshed as part of every export.
//! println!("{}", registry.to_prometheus()?);
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod instrument;
pub mod metrics;
pub mod pool;

pub use config::InstrumentationConfig;
pub use error::{Error, Result};
pub use events::{EventBus, QueryEvent, SharedEventBus, Subscriber, SubscriptionId};
pub use instrument::{
    declare_metrics, Instrumentation, LabelTuple, MetricNames, PoolCollector, QueryRecorder,
};
pub use metrics::{
    new_shared_registry, Declaration, Labels, MetricsRegistry, MetricsSink, SharedMetricsRegistry,
};
pub use pool::{
    ConnectionPool, DbConfig, ManagedPool, NullPool, PoolError, PoolHandle, PoolRegistry,
    PoolSource, PoolSpec, PoolStats,
};
