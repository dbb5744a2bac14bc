//! In-process metrics registry.
//!
//! Metrics are declared once at startup with a fixed label schema and then
//! updated concurrently through [`MetricsSink`]. Series are aggregated by
//! label-set equality and exported in Prometheus text format.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::histogram::{Histogram, HistogramSnapshot};
use super::labels::Labels;
use crate::error::{Error, Result};

/// Outbound interface used by the recorder and collector.
///
/// Implementations must be safe to call from many threads at once.
pub trait MetricsSink: Send + Sync {
    /// Increment a counter by one.
    fn increment(&self, counter: &str, labels: &Labels) -> Result<()>;

    /// Record an observation into a histogram.
    fn measure(&self, histogram: &str, labels: &Labels, value: f64) -> Result<()>;

    /// Overwrite a gauge value.
    fn set(&self, gauge: &str, labels: &Labels, value: f64) -> Result<()>;

    /// Check that `set(gauge, labels, _)` would be accepted, without writing.
    fn check_gauge(&self, gauge: &str, labels: &Labels) -> Result<()> {
        let _ = (gauge, labels);
        Ok(())
    }
}

/// A hook run immediately before metrics are read.
pub trait Collect: Send + Sync {
    /// Refresh pull-based metrics. An error fails the whole read.
    fn collect(&self) -> Result<()>;
}

/// Declared metric type.
#[derive(Debug, Clone, PartialEq)]
enum Kind {
    Counter,
    Gauge,
    Histogram { bounds: Vec<f64> },
}

impl Kind {
    fn type_name(&self) -> &'static str {
        match self {
            Kind::Counter => "counter",
            Kind::Gauge => "gauge",
            Kind::Histogram { .. } => "histogram",
        }
    }
}

/// A metric to declare: name, help text, type and label schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    name: String,
    help: String,
    kind: Kind,
    label_names: Vec<String>,
}

impl Declaration {
    fn new(name: &str, help: &str, kind: Kind, label_names: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            help: help.to_string(),
            kind,
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
        }
    }

    /// A counter declaration.
    pub fn counter(name: &str, help: &str, label_names: &[&str]) -> Self {
        Self::new(name, help, Kind::Counter, label_names)
    }

    /// A gauge declaration.
    pub fn gauge(name: &str, help: &str, label_names: &[&str]) -> Self {
        Self::new(name, help, Kind::Gauge, label_names)
    }

    /// A histogram declaration with the given bucket upper bounds.
    pub fn histogram(name: &str, help: &str, label_names: &[&str], bounds: &[f64]) -> Self {
        let kind = Kind::Histogram {
            bounds: bounds.to_vec(),
        };
        Self::new(name, help, kind, label_names)
    }

    /// Metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Same type, buckets and label names. Help text is not compared.
    fn same_schema(&self, kind: &Kind, label_names: &[String]) -> bool {
        self.kind == *kind && self.label_names == label_names
    }
}

enum Series {
    Counter(AtomicU64),
    /// `f64::to_bits` of the last value set.
    Gauge(AtomicU64),
    Histogram(Histogram),
}

struct Family {
    name: String,
    help: String,
    kind: Kind,
    label_names: Vec<String>,
    series: RwLock<HashMap<Labels, Arc<Series>>>,
}

impl Family {
    fn check_labels(&self, labels: &Labels) -> Result<()> {
        if labels.names().eq(self.label_names.iter().map(String::as_str)) {
            return Ok(());
        }
        Err(Error::LabelMismatch {
            metric: self.name.clone(),
            expected: self.label_names.clone(),
            got: labels.names().map(str::to_string).collect(),
        })
    }

    fn series(&self, labels: &Labels) -> Result<Arc<Series>> {
        self.check_labels(labels)?;

        if let Some(series) = self.series.read().get(labels) {
            return Ok(series.clone());
        }

        let mut map = self.series.write();
        let series = map
            .entry(labels.clone())
            .or_insert_with(|| Arc::new(self.new_series()));
        Ok(series.clone())
    }

    fn new_series(&self) -> Series {
        match &self.kind {
            Kind::Counter => Series::Counter(AtomicU64::new(0)),
            Kind::Gauge => Series::Gauge(AtomicU64::new(0f64.to_bits())),
            Kind::Histogram { bounds } => Series::Histogram(Histogram::with_bounds(bounds.clone())),
        }
    }

    fn existing(&self, labels: &Labels) -> Option<Arc<Series>> {
        self.series.read().get(labels).cloned()
    }

    fn sorted_series(&self) -> Vec<(Labels, Arc<Series>)> {
        let mut series: Vec<_> = self
            .series
            .read()
            .iter()
            .map(|(labels, series)| (labels.clone(), series.clone()))
            .collect();
        series.sort_by(|a, b| a.0.cmp(&b.0));
        series
    }
}

/// Central registry for declared metrics.
pub struct MetricsRegistry {
    families: DashMap<String, Arc<Family>>,
    /// Declaration order, used for exposition.
    order: RwLock<Vec<String>>,
    collectors: RwLock<Vec<Arc<dyn Collect>>>,
}

impl MetricsRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            families: DashMap::new(),
            order: RwLock::new(Vec::new()),
            collectors: RwLock::new(Vec::new()),
        }
    }

    /// Declare a counter.
    pub fn declare_counter(&self, name: &str, help: &str, label_names: &[&str]) -> Result<()> {
        self.declare(Declaration::counter(name, help, label_names))
    }

    /// Declare a gauge.
    pub fn declare_gauge(&self, name: &str, help: &str, label_names: &[&str]) -> Result<()> {
        self.declare(Declaration::gauge(name, help, label_names))
    }

    /// Declare a histogram with the given bucket upper bounds.
    pub fn declare_histogram(
        &self,
        name: &str,
        help: &str,
        label_names: &[&str],
        bounds: &[f64],
    ) -> Result<()> {
        self.declare(Declaration::histogram(name, help, label_names, bounds))
    }

    /// Declare a metric.
    ///
    /// Re-declaring an existing name with the same schema is a no-op; a
    /// different type, bucket layout or label schema is `DuplicateMetric`.
    pub fn declare(&self, declaration: Declaration) -> Result<()> {
        match self.families.entry(declaration.name.clone()) {
            Entry::Occupied(existing) => {
                let family = existing.get();
                if declaration.same_schema(&family.kind, &family.label_names) {
                    tracing::debug!(metric = %declaration.name, "metric already declared");
                    Ok(())
                } else {
                    Err(Error::DuplicateMetric(declaration.name))
                }
            }
            Entry::Vacant(slot) => {
                tracing::debug!(
                    metric = %declaration.name,
                    kind = declaration.kind.type_name(),
                    "metric declared"
                );
                self.order.write().push(declaration.name.clone());
                slot.insert(Arc::new(Family {
                    name: declaration.name,
                    help: declaration.help,
                    kind: declaration.kind,
                    label_names: declaration.label_names,
                    series: RwLock::new(HashMap::new()),
                }));
                Ok(())
            }
        }
    }

    /// Declare several metrics, or none of them.
    ///
    /// Every declaration is checked against the registry and the rest of the
    /// batch before anything is declared.
    pub fn declare_all(&self, declarations: &[Declaration]) -> Result<()> {
        for (i, declaration) in declarations.iter().enumerate() {
            if let Some(family) = self.families.get(&declaration.name) {
                if !declaration.same_schema(&family.kind, &family.label_names) {
                    return Err(Error::DuplicateMetric(declaration.name.clone()));
                }
            }
            let clashes = declarations[..i].iter().any(|earlier| {
                earlier.name == declaration.name
                    && !earlier.same_schema(&declaration.kind, &declaration.label_names)
            });
            if clashes {
                return Err(Error::DuplicateMetric(declaration.name.clone()));
            }
        }

        for declaration in declarations {
            self.declare(declaration.clone())?;
        }
        Ok(())
    }

    /// Whether a metric with this name has been declared.
    pub fn is_declared(&self, name: &str) -> bool {
        self.families.contains_key(name)
    }

    fn family(&self, name: &str) -> Result<Arc<Family>> {
        self.families
            .get(name)
            .map(|f| f.value().clone())
            .ok_or_else(|| Error::UnknownMetric(name.to_string()))
    }

    /// Register a hook that runs before every read of the registry.
    pub fn register_collector(&self, collector: Arc<dyn Collect>) {
        self.collectors.write().push(collector);
    }

    /// Remove a previously registered hook.
    pub fn remove_collector(&self, collector: &Arc<dyn Collect>) {
        self.collectors
            .write()
            .retain(|c| !Arc::ptr_eq(c, collector));
    }

    /// Run every registered collector, stopping at the first failure.
    pub fn collect(&self) -> Result<()> {
        let collectors: Vec<_> = self.collectors.read().clone();
        for collector in collectors {
            collector.collect()?;
        }
        Ok(())
    }

    // Getters

    /// Current value of a counter series.
    pub fn counter_value(&self, name: &str, labels: &Labels) -> Option<u64> {
        match self.family(name).ok()?.existing(labels)?.as_ref() {
            Series::Counter(value) => Some(value.load(Ordering::Relaxed)),
            _ => None,
        }
    }

    /// Current value of a gauge series.
    pub fn gauge_value(&self, name: &str, labels: &Labels) -> Option<f64> {
        match self.family(name).ok()?.existing(labels)?.as_ref() {
            Series::Gauge(bits) => Some(f64::from_bits(bits.load(Ordering::Relaxed))),
            _ => None,
        }
    }

    /// Snapshot of a histogram series.
    pub fn histogram_snapshot(&self, name: &str, labels: &Labels) -> Option<HistogramSnapshot> {
        match self.family(name).ok()?.existing(labels)?.as_ref() {
            Series::Histogram(hist) => Some(hist.snapshot()),
            _ => None,
        }
    }

    /// Number of distinct label sets recorded for a metric.
    pub fn series_count(&self, name: &str) -> usize {
        self.family(name)
            .map(|f| f.series.read().len())
            .unwrap_or(0)
    }

    /// Run collectors, then export to Prometheus text format.
    pub fn to_prometheus(&self) -> Result<String> {
        self.collect()?;

        let mut out = String::new();
        let order = self.order.read().clone();
        for name in order {
            let family = self.family(&name)?;
            render_family(&mut out, &family);
        }
        Ok(out)
    }
}

impl MetricsSink for MetricsRegistry {
    fn increment(&self, counter: &str, labels: &Labels) -> Result<()> {
        let family = self.family(counter)?;
        match family.series(labels)?.as_ref() {
            Series::Counter(value) => {
                value.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            _ => Err(Error::MetricKind {
                metric: counter.to_string(),
                expected: "counter",
            }),
        }
    }

    fn measure(&self, histogram: &str, labels: &Labels, value: f64) -> Result<()> {
        let family = self.family(histogram)?;
        match family.series(labels)?.as_ref() {
            Series::Histogram(hist) => {
                hist.observe(value);
                Ok(())
            }
            _ => Err(Error::MetricKind {
                metric: histogram.to_string(),
                expected: "histogram",
            }),
        }
    }

    fn set(&self, gauge: &str, labels: &Labels, value: f64) -> Result<()> {
        let family = self.family(gauge)?;
        match family.series(labels)?.as_ref() {
            Series::Gauge(bits) => {
                bits.store(value.to_bits(), Ordering::Relaxed);
                Ok(())
            }
            _ => Err(Error::MetricKind {
                metric: gauge.to_string(),
                expected: "gauge",
            }),
        }
    }

    fn check_gauge(&self, gauge: &str, labels: &Labels) -> Result<()> {
        let family = self.family(gauge)?;
        if family.kind != Kind::Gauge {
            return Err(Error::MetricKind {
                metric: gauge.to_string(),
                expected: "gauge",
            });
        }
        family.check_labels(labels)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("metrics", &self.order.read().len())
            .field("collectors", &self.collectors.read().len())
            .finish()
    }
}

/// Shared metrics registry handle.
pub type SharedMetricsRegistry = Arc<MetricsRegistry>;

/// Create a new shared metrics registry.
pub fn new_shared_registry() -> SharedMetricsRegistry {
    Arc::new(MetricsRegistry::new())
}

fn render_family(out: &mut String, family: &Family) {
    let _ = writeln!(out, "# HELP {} {}", family.name, family.help);
    let _ = writeln!(out, "# TYPE {} {}", family.name, family.kind.type_name());

    for (labels, series) in family.sorted_series() {
        match series.as_ref() {
            Series::Counter(value) => {
                let _ = writeln!(
                    out,
                    "{}{} {}",
                    family.name,
                    labels,
                    value.load(Ordering::Relaxed)
                );
            }
            Series::Gauge(bits) => {
                let value = f64::from_bits(bits.load(Ordering::Relaxed));
                let _ = writeln!(out, "{}{} {}", family.name, labels, format_f64(value));
            }
            Series::Histogram(hist) => {
                let snapshot = hist.snapshot();
                for (bound, count) in &snapshot.buckets {
                    let bucket_labels = labels.clone().with("le", format_f64(*bound));
                    let _ = writeln!(out, "{}_bucket{} {}", family.name, bucket_labels, count);
                }
                let _ = writeln!(
                    out,
                    "{}_sum{} {}",
                    family.name,
                    labels,
                    format_f64(snapshot.sum)
                );
                let _ = writeln!(out, "{}_count{} {}", family.name, labels, snapshot.count);
            }
        }
    }
    out.push('\n');
}

fn format_f64(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}
