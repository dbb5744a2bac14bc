//! Wiring of the recorder and collector into a bus and registry.

use std::sync::Arc;

use super::collector::PoolCollector;
use super::recorder::QueryRecorder;
use super::{declare_metrics, MetricNames};
use crate::config::InstrumentationConfig;
use crate::error::Result;
use crate::events::{SharedEventBus, SubscriptionId};
use crate::metrics::{Collect, SharedMetricsRegistry};
use crate::pool::PoolSource;

/// Installed instrumentation. Dropping it unsubscribes the recorder and
/// unregisters the collector.
pub struct Instrumentation {
    bus: SharedEventBus,
    registry: SharedMetricsRegistry,
    names: MetricNames,
    channel: String,
    subscription: Option<SubscriptionId>,
    collector: Arc<dyn Collect>,
}

impl Instrumentation {
    /// Declare metrics, subscribe the recorder to the configured channel and
    /// register the pool collector with the registry.
    pub fn install(
        bus: SharedEventBus,
        registry: SharedMetricsRegistry,
        pools: Arc<dyn PoolSource>,
        config: &InstrumentationConfig,
    ) -> Result<Self> {
        let names = declare_metrics(&registry, config)?;

        let recorder = QueryRecorder::new(
            registry.clone(),
            names.queries_total.clone(),
            names.query_duration.clone(),
        );
        let collector: Arc<dyn Collect> =
            Arc::new(PoolCollector::new(registry.clone(), pools, names.pool_gauges.clone()));

        registry.register_collector(collector.clone());
        let subscription = bus.subscribe(&config.channel, Arc::new(recorder));

        tracing::info!(
            channel = %config.channel,
            prefix = %config.prefix,
            subscription = %subscription,
            "query instrumentation installed"
        );

        Ok(Self {
            bus,
            registry,
            names,
            channel: config.channel.clone(),
            subscription: Some(subscription),
            collector,
        })
    }

    /// Metric names in use.
    pub fn names(&self) -> &MetricNames {
        &self.names
    }

    /// Whether the recorder is still subscribed.
    pub fn is_installed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Refresh pool gauges now.
    pub fn collect(&self) -> Result<()> {
        self.collector.collect()
    }

    /// Unsubscribe the recorder and unregister the collector. Idempotent.
    ///
    /// Declared metrics and their values stay in the registry.
    pub fn uninstall(&mut self) {
        let Some(subscription) = self.subscription.take() else {
            return;
        };
        if let Err(e) = self.bus.unsubscribe(subscription) {
            tracing::warn!(error = %e, "recorder subscription already removed");
        }
        self.registry.remove_collector(&self.collector);
        tracing::info!(channel = %self.channel, "query instrumentation uninstalled");
    }
}

impl Drop for Instrumentation {
    fn drop(&mut self) {
        self.uninstall();
    }
}

impl std::fmt::Debug for Instrumentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrumentation")
            .field("channel", &self.channel)
            .field("subscription", &self.subscription)
            .finish()
    }
}
