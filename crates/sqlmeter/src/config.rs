//! Instrumentation configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default metric name prefix.
pub const DEFAULT_PREFIX: &str = "db";

/// Default event channel carrying query executions.
pub const DEFAULT_CHANNEL: &str = "sql.query";

/// Default query duration buckets in seconds.
///
/// The first eleven follow the common latency defaults; the tail extends
/// coverage up to six hours.
pub const DEFAULT_BUCKETS: [f64; 18] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, // defaults
    30.0, 60.0, 120.0, 300.0, 1800.0, 3600.0, 21600.0, // slow queries
];

/// Instrumentation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentationConfig {
    /// Prefix applied to every metric name.
    pub prefix: String,

    /// Event bus channel the recorder subscribes to.
    pub channel: String,

    /// Histogram bucket upper bounds in seconds, strictly increasing.
    pub buckets: Vec<f64>,
}

impl InstrumentationConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            channel: DEFAULT_CHANNEL.to_string(),
            buckets: DEFAULT_BUCKETS.to_vec(),
        }
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the metric name prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the event channel.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Set the histogram buckets.
    pub fn with_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.buckets = buckets;
        self
    }

    /// Check that the configuration can be declared.
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(Error::Config("metric prefix must not be empty".to_string()));
        }
        if self.channel.is_empty() {
            return Err(Error::Config("event channel must not be empty".to_string()));
        }
        if self.buckets.is_empty() {
            return Err(Error::Config("at least one bucket is required".to_string()));
        }
        if self.buckets.iter().any(|b| !b.is_finite()) {
            return Err(Error::Config("bucket bounds must be finite".to_string()));
        }
        if self.buckets.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::Config(
                "bucket bounds must be strictly increasing".to_string(),
            ));
        }
        Ok(())
    }

    /// Full name of a metric under this configuration's prefix.
    pub fn metric_name(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = InstrumentationConfig::default();
        assert_eq!(config.prefix, "db");
        assert_eq!(config.channel, "sql.query");
        assert_eq!(config.buckets.len(), 18);
        assert_eq!(config.buckets[10], 10.0);
        assert_eq!(config.buckets[17], 21600.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = InstrumentationConfig::new()
            .with_prefix("app_db")
            .with_channel("queries")
            .with_buckets(vec![0.1, 1.0]);

        assert_eq!(config.metric_name("queries_total"), "app_db_queries_total");
        assert_eq!(config.channel, "queries");
        assert_eq!(config.buckets, vec![0.1, 1.0]);
    }

    #[test]
    fn test_validate_rejects_bad_buckets() {
        let empty = InstrumentationConfig::new().with_buckets(vec![]);
        assert!(matches!(empty.validate(), Err(Error::Config(_))));

        let unordered = InstrumentationConfig::new().with_buckets(vec![1.0, 0.5]);
        assert!(matches!(unordered.validate(), Err(Error::Config(_))));

        let infinite = InstrumentationConfig::new().with_buckets(vec![1.0, f64::INFINITY]);
        assert!(matches!(infinite.validate(), Err(Error::Config(_))));

        let no_prefix = InstrumentationConfig::new().with_prefix("");
        assert!(matches!(no_prefix.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_from_json_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"prefix": "orders_db"}}"#).unwrap();

        let config = InstrumentationConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.prefix, "orders_db");
        assert_eq!(config.channel, DEFAULT_CHANNEL);
        assert_eq!(config.buckets, DEFAULT_BUCKETS.to_vec());
    }

    #[test]
    fn test_from_json_file_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"buckets": [2.0, 1.0]}}"#).unwrap();

        let result = InstrumentationConfig::from_json_file(file.path());
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
