//! Simulator configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use sqlmeter::{Error, InstrumentationConfig, Result};

/// Default pools to simulate.
pub const DEFAULT_POOLS: &str = "primary,replica";

/// Default number of connections per pool.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Default number of concurrent workers.
pub const DEFAULT_WORKERS: usize = 8;

/// Default queries issued by each worker.
pub const DEFAULT_QUERIES: u64 = 200;

/// Default exposition interval in milliseconds.
pub const DEFAULT_INTERVAL_MS: u64 = 500;

/// Default upper bound on simulated query latency in milliseconds.
pub const DEFAULT_MAX_LATENCY_MS: u64 = 50;

/// Default checkout timeout in milliseconds.
pub const DEFAULT_CHECKOUT_TIMEOUT_MS: u64 = 1000;

/// Workload simulator configuration.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Config names of the pools to create.
    pub pools: Vec<String>,

    /// Connections per pool.
    pub pool_size: usize,

    /// Concurrent workers issuing queries.
    pub workers: usize,

    /// Queries per worker. Zero runs until interrupted.
    pub queries_per_worker: u64,

    /// Interval between exposition dumps.
    pub interval: Duration,

    /// Upper bound on simulated query latency.
    pub max_latency: Duration,

    /// How long a checkout waits before failing.
    pub checkout_timeout: Duration,

    /// Fraction of queries answered from the query cache.
    pub cache_ratio: f64,

    /// Fraction of connections abandoned by their worker.
    pub abandon_ratio: f64,

    /// Metric naming and bucket settings.
    pub instrumentation: InstrumentationConfig,
}

impl SimulationConfig {
    /// Create a configuration for the given pool names.
    pub fn new<I, S>(pools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pools: pools.into_iter().map(Into::into).collect(),
            pool_size: DEFAULT_POOL_SIZE,
            workers: DEFAULT_WORKERS,
            queries_per_worker: DEFAULT_QUERIES,
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            max_latency: Duration::from_millis(DEFAULT_MAX_LATENCY_MS),
            checkout_timeout: Duration::from_millis(DEFAULT_CHECKOUT_TIMEOUT_MS),
            cache_ratio: 0.1,
            abandon_ratio: 0.0,
            instrumentation: InstrumentationConfig::default(),
        }
    }

    /// Set the pool size.
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the number of queries per worker.
    pub fn with_queries_per_worker(mut self, queries: u64) -> Self {
        self.queries_per_worker = queries;
        self
    }

    /// Set the exposition interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the maximum simulated latency.
    pub fn with_max_latency(mut self, latency: Duration) -> Self {
        self.max_latency = latency;
        self
    }

    /// Set the fraction of abandoned connections.
    pub fn with_abandon_ratio(mut self, ratio: f64) -> Self {
        self.abandon_ratio = ratio;
        self
    }

    /// Check that the workload is runnable.
    pub fn validate(&self) -> Result<()> {
        if self.pools.is_empty() || self.pools.iter().any(|p| p.is_empty()) {
            return Err(Error::Config("at least one named pool is required".to_string()));
        }
        if self.pool_size == 0 || self.workers == 0 {
            return Err(Error::Config(
                "pool size and worker count must be positive".to_string(),
            ));
        }
        if self.interval.is_zero() {
            return Err(Error::Config("interval must be positive".to_string()));
        }
        for (name, ratio) in [("cache", self.cache_ratio), ("abandon", self.abandon_ratio)] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(Error::Config(format!(
                    "{name} ratio must be between 0 and 1, got {ratio}"
                )));
            }
        }
        self.instrumentation.validate()
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::new(DEFAULT_POOLS.split(','))
    }
}

/// sqlmeter command-line interface.
#[derive(Parser, Debug)]
#[command(name = "sqlmeter")]
#[command(version, about = "Database client instrumentation toolkit", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a simulated workload and print metrics periodically.
    Simulate(SimulateArgs),
}

/// Arguments for `sqlmeter simulate`.
#[derive(clap::Args, Debug)]
pub struct SimulateArgs {
    /// Comma-separated pool config names.
    #[arg(long, value_delimiter = ',', default_value = DEFAULT_POOLS)]
    pub pools: Vec<String>,

    /// Connections per pool.
    #[arg(long, default_value_t = DEFAULT_POOL_SIZE)]
    pub pool_size: usize,

    /// Concurrent workers.
    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Queries per worker (0 = run until ctrl+c).
    #[arg(short, long, default_value_t = DEFAULT_QUERIES)]
    pub queries: u64,

    /// Exposition interval in milliseconds.
    #[arg(long, default_value_t = DEFAULT_INTERVAL_MS)]
    pub interval_ms: u64,

    /// Maximum simulated query latency in milliseconds.
    #[arg(long, default_value_t = DEFAULT_MAX_LATENCY_MS)]
    pub max_latency_ms: u64,

    /// Checkout timeout in milliseconds.
    #[arg(long, default_value_t = DEFAULT_CHECKOUT_TIMEOUT_MS)]
    pub checkout_timeout_ms: u64,

    /// Fraction of queries served from the query cache.
    #[arg(long, default_value_t = 0.1)]
    pub cache_ratio: f64,

    /// Fraction of connections abandoned instead of checked in.
    #[arg(long, default_value_t = 0.0)]
    pub abandon_ratio: f64,

    /// JSON file overriding instrumentation settings.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl SimulateArgs {
    /// Convert command-line arguments to a validated simulation configuration.
    pub fn into_config(self) -> Result<SimulationConfig> {
        let instrumentation = match &self.config {
            Some(path) => InstrumentationConfig::from_json_file(path)?,
            None => InstrumentationConfig::default(),
        };

        let config = SimulationConfig {
            pools: self.pools,
            pool_size: self.pool_size,
            workers: self.workers,
            queries_per_worker: self.queries,
            interval: Duration::from_millis(self.interval_ms),
            max_latency: Duration::from_millis(self.max_latency_ms),
            checkout_timeout: Duration::from_millis(self.checkout_timeout_ms),
            cache_ratio: self.cache_ratio,
            abandon_ratio: self.abandon_ratio,
            instrumentation,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn simulate_args(argv: &[&str]) -> SimulateArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Command::Simulate(args) => args,
        }
    }

    #[test]
    fn test_default_config() {
        let config = SimulationConfig::default();
        assert_eq!(config.pools, vec!["primary", "replica"]);
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.interval, Duration::from_millis(DEFAULT_INTERVAL_MS));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_simulate() {
        let config = simulate_args(&[
            "sqlmeter",
            "simulate",
            "--pools",
            "primary,replica,analytics",
            "--pool-size",
            "3",
            "--workers",
            "4",
            "--queries",
            "10",
            "--interval-ms",
            "250",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.pools, vec!["primary", "replica", "analytics"]);
        assert_eq!(config.pool_size, 3);
        assert_eq!(config.workers, 4);
        assert_eq!(config.queries_per_worker, 10);
        assert_eq!(config.interval, Duration::from_millis(250));
        assert_eq!(config.instrumentation, InstrumentationConfig::default());
    }

    #[test]
    fn test_instrumentation_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"prefix": "orders_db"}}"#).unwrap();
        let path = file.path().to_str().unwrap();

        let config = simulate_args(&["sqlmeter", "simulate", "--config", path])
            .into_config()
            .unwrap();

        assert_eq!(config.instrumentation.prefix, "orders_db");
        assert_eq!(config.instrumentation.channel, "sql.query");
    }

    #[test]
    fn test_rejects_invalid_workload() {
        let zero_workers = simulate_args(&["sqlmeter", "simulate", "--workers", "0"]).into_config();
        assert!(matches!(zero_workers, Err(Error::Config(_))));

        let bad_ratio =
            simulate_args(&["sqlmeter", "simulate", "--cache-ratio", "1.5"]).into_config();
        assert!(matches!(bad_ratio, Err(Error::Config(_))));

        let no_interval =
            simulate_args(&["sqlmeter", "simulate", "--interval-ms", "0"]).into_config();
        assert!(matches!(no_interval, Err(Error::Config(_))));
    }
}
