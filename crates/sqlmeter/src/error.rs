//! Instrumentation error types.

use thiserror::Error;

use crate::pool::PoolError;

/// Instrumentation errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A write targeted a metric that was never declared.
    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    /// A metric with this name is already declared.
    #[error("metric already declared: {0}")]
    DuplicateMetric(String),

    /// The label names do not match the declared schema.
    #[error("label mismatch for {metric}: expected {expected:?}, got {got:?}")]
    LabelMismatch {
        metric: String,
        expected: Vec<String>,
        got: Vec<String>,
    },

    /// The operation does not apply to the declared metric type.
    #[error("metric {metric} is not a {expected}")]
    MetricKind {
        metric: String,
        expected: &'static str,
    },

    /// Reading a pool failed.
    #[error("pool error ({pool}): {source}")]
    Pool {
        pool: String,
        #[source]
        source: PoolError,
    },

    /// A pool exposes neither a structured config nor a legacy spec.
    #[error("connection pool has no resolvable config name")]
    UnnamedPool,

    /// No subscription with this identifier is active.
    #[error("subscription {0} not found")]
    UnknownSubscription(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for instrumentation operations.
pub type Result<T> = std::result::Result<T, Error>;
