//! Simulated database workload driving the instrumentation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sqlmeter::{
    DbConfig, EventBus, Instrumentation, ManagedPool, MetricsRegistry, PoolError, PoolHandle,
    PoolRegistry, QueryEvent, Result, SharedEventBus, SharedMetricsRegistry,
};
use tokio::sync::broadcast;

use crate::config::SimulationConfig;

/// Query kinds issued by the workers, with whether they run asynchronously.
const QUERY_KINDS: [(&str, bool); 5] = [
    ("User Load", false),
    ("Post Load", false),
    ("Comment Count", false),
    ("SQL", false),
    ("Comment Load", true),
];

/// Outcome of a finished simulation.
#[derive(Debug)]
pub struct SimulationReport {
    /// Queries that completed and were published.
    pub queries: u64,
    /// Checkouts that timed out.
    pub checkout_timeouts: u64,
    /// Exposition text after the last worker finished.
    pub exposition: String,
}

/// Per-worker tallies.
#[derive(Debug, Default)]
struct WorkerStats {
    queries: u64,
    checkout_timeouts: u64,
}

/// A set of pools, a bus and a registry with instrumentation installed.
pub struct Simulation {
    config: SimulationConfig,
    bus: SharedEventBus,
    registry: SharedMetricsRegistry,
    pools: Vec<Arc<ManagedPool>>,
    instrumentation: Instrumentation,
}

impl Simulation {
    /// Create the pools and install instrumentation.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;

        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(MetricsRegistry::new());
        let handler = Arc::new(PoolRegistry::new());

        let mut pools = Vec::with_capacity(config.pools.len());
        for name in &config.pools {
            let pool = Arc::new(ManagedPool::new(
                DbConfig::new(name.as_str())
                    .with_pool(config.pool_size)
                    .with_checkout_timeout(config.checkout_timeout),
            ));
            handler.register(pool.clone())?;
            pools.push(pool);
        }

        let instrumentation =
            Instrumentation::install(bus.clone(), registry.clone(), handler, &config.instrumentation)?;

        Ok(Self {
            config,
            bus,
            registry,
            pools,
            instrumentation,
        })
    }

    /// The registry metrics are written to.
    pub fn registry(&self) -> &SharedMetricsRegistry {
        &self.registry
    }

    /// Run workers until they finish or `shutdown` fires, printing the
    /// exposition text on every interval tick.
    pub async fn run(self, shutdown: broadcast::Sender<()>) -> Result<SimulationReport> {
        let handles: Vec<PoolHandle> = self
            .pools
            .iter()
            .map(|pool| pool.clone() as PoolHandle)
            .collect();
        let pools = Arc::new(handles);

        let mut workers = Vec::with_capacity(self.config.workers);
        for id in 0..self.config.workers {
            let worker = Worker {
                id,
                pools: self.pools.clone(),
                handles: pools.clone(),
                bus: self.bus.clone(),
                channel: self.config.instrumentation.channel.clone(),
                queries: self.config.queries_per_worker,
                max_latency: self.config.max_latency,
                cache_ratio: self.config.cache_ratio,
                abandon_ratio: self.config.abandon_ratio,
            };
            workers.push(tokio::spawn(worker.run(shutdown.subscribe())));
        }

        let reporter = tokio::spawn(report(
            self.registry.clone(),
            self.pools.clone(),
            self.config.interval,
            shutdown.subscribe(),
        ));

        let mut totals = WorkerStats::default();
        for handle in workers {
            match handle.await {
                Ok(stats) => {
                    totals.queries += stats.queries;
                    totals.checkout_timeouts += stats.checkout_timeouts;
                }
                Err(e) => tracing::error!(error = %e, "worker task failed"),
            }
        }

        let _ = shutdown.send(());
        if let Err(e) = reporter.await {
            tracing::error!(error = %e, "reporter task failed");
        }

        for pool in &self.pools {
            pool.reap();
        }
        let exposition = self.registry.to_prometheus()?;

        for pool in &self.pools {
            pool.close();
        }
        tracing::info!(
            queries = totals.queries,
            checkout_timeouts = totals.checkout_timeouts,
            installed = self.instrumentation.is_installed(),
            "simulation finished"
        );

        Ok(SimulationReport {
            queries: totals.queries,
            checkout_timeouts: totals.checkout_timeouts,
            exposition,
        })
    }
}

struct Worker {
    id: usize,
    pools: Vec<Arc<ManagedPool>>,
    handles: Arc<Vec<PoolHandle>>,
    bus: SharedEventBus,
    channel: String,
    queries: u64,
    max_latency: Duration,
    cache_ratio: f64,
    abandon_ratio: f64,
}

impl Worker {
    async fn run(self, mut shutdown: broadcast::Receiver<()>) -> WorkerStats {
        let mut rng = StdRng::from_entropy();
        let mut stats = WorkerStats::default();
        let max_latency_us = self.max_latency.as_micros().max(1) as u64;

        while self.queries == 0 || stats.queries < self.queries {
            let index = rng.gen_range(0..self.pools.len());
            let (kind, is_async) = QUERY_KINDS[rng.gen_range(0..QUERY_KINDS.len())];
            let cached = rng.gen_bool(self.cache_ratio);

            let checkout = tokio::select! {
                _ = shutdown.recv() => break,
                result = self.pools[index].checkout() => result,
            };
            let conn = match checkout {
                Ok(conn) => conn,
                Err(PoolError::CheckoutTimeout(timeout)) => {
                    stats.checkout_timeouts += 1;
                    tracing::debug!(worker = self.id, ?timeout, "checkout timed out");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(worker = self.id, error = %e, "worker stopping");
                    break;
                }
            };

            let started = Instant::now();
            if !cached {
                let latency = Duration::from_micros(rng.gen_range(1..=max_latency_us));
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = tokio::time::sleep(latency) => {}
                }
            }

            let mut event = QueryEvent::new(self.handles[index].clone(), kind)
                .with_duration(started.elapsed());
            if cached {
                event = event.with_cached(true);
            }
            if is_async {
                event = event.with_async(true);
            }
            self.bus.publish(&self.channel, &event);
            stats.queries += 1;

            if rng.gen_bool(self.abandon_ratio) {
                tracing::debug!(worker = self.id, connection = conn.id(), "abandoning connection");
                conn.abandon();
            }
        }

        tracing::debug!(worker = self.id, queries = stats.queries, "worker finished");
        stats
    }
}

async fn report(
    registry: SharedMetricsRegistry,
    pools: Vec<Arc<ManagedPool>>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {}
        }

        match registry.to_prometheus() {
            Ok(text) => println!("{text}"),
            Err(e) => tracing::warn!(error = %e, "metrics export failed, retrying next tick"),
        }
        for pool in &pools {
            pool.reap();
        }
    }
}
