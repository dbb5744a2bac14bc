//! Query-execution events.

use std::time::Duration;

use crate::pool::PoolHandle;

/// Emitted by the database layer once per executed statement.
#[derive(Clone, Default)]
pub struct QueryEvent {
    /// Pool that served the query, if any.
    pub connection: Option<PoolHandle>,
    /// Free-text operation name, e.g. `"User Load"`. May be empty.
    pub name: String,
    /// Cache marker. Only presence matters, not the value.
    pub cached: Option<bool>,
    /// Async marker. Only presence matters, not the value.
    pub is_async: Option<bool>,
    /// Elapsed time in milliseconds.
    pub duration_ms: f64,
}

impl QueryEvent {
    /// Create an event for a query served by `connection`.
    pub fn new(connection: PoolHandle, name: impl Into<String>) -> Self {
        Self {
            connection: Some(connection),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create an event with no attributable connection.
    pub fn detached(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the cache marker.
    pub fn with_cached(mut self, cached: bool) -> Self {
        self.cached = Some(cached);
        self
    }

    /// Set the async marker.
    pub fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = Some(is_async);
        self
    }

    /// Set the elapsed time in milliseconds.
    pub fn with_duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Set the elapsed time from a [`Duration`].
    pub fn with_duration(self, elapsed: Duration) -> Self {
        self.with_duration_ms(elapsed.as_secs_f64() * 1000.0)
    }
}

impl std::fmt::Debug for QueryEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEvent")
            .field("connection", &self.connection.as_ref().map(|_| "<pool>"))
            .field("name", &self.name)
            .field("cached", &self.cached)
            .field("is_async", &self.is_async)
            .field("duration_ms", &self.duration_ms)
            .finish()
    }
}
