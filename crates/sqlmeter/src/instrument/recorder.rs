//! Query event recorder.

use std::sync::Arc;

use super::labels::LabelTuple;
use crate::events::{QueryEvent, Subscriber};
use crate::metrics::MetricsSink;

/// Convert milliseconds to seconds, rounded to millisecond precision.
///
/// Negative and non-finite inputs record as zero.
pub fn duration_seconds(duration_ms: f64) -> f64 {
    if !duration_ms.is_finite() || duration_ms < 0.0 {
        return 0.0;
    }
    duration_ms.round() / 1000.0
}

/// Turns query events into a counter increment and a histogram observation.
///
/// Holds no mutable state; safe to invoke from any number of threads.
pub struct QueryRecorder {
    sink: Arc<dyn MetricsSink>,
    counter: String,
    histogram: String,
}

impl QueryRecorder {
    /// Create a recorder writing to the named counter and histogram.
    pub fn new(
        sink: Arc<dyn MetricsSink>,
        counter: impl Into<String>,
        histogram: impl Into<String>,
    ) -> Self {
        Self {
            sink,
            counter: counter.into(),
            histogram: histogram.into(),
        }
    }

    /// Record one event. Returns `false` if the event was discarded.
    ///
    /// Registry failures are logged, never propagated.
    pub fn record(&self, event: &QueryEvent) -> bool {
        let Some(tuple) = LabelTuple::extract(event) else {
            tracing::trace!(kind = %event.name, "discarding unattributable query event");
            return false;
        };
        let labels = tuple.to_labels();

        if let Err(e) = self.sink.increment(&self.counter, &labels) {
            tracing::warn!(error = %e, metric = %self.counter, "failed to count query");
        }
        let seconds = duration_seconds(event.duration_ms);
        if let Err(e) = self.sink.measure(&self.histogram, &labels, seconds) {
            tracing::warn!(error = %e, metric = %self.histogram, "failed to record query duration");
        }
        true
    }
}

impl Subscriber for QueryRecorder {
    fn on_event(&self, event: &QueryEvent) {
        self.record(event);
    }
}

impl std::fmt::Debug for QueryRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRecorder")
            .field("counter", &self.counter)
            .field("histogram", &self.histogram)
            .finish()
    }
}
