//! Prometheus Metrics Adapter
//!
//! Implements the `MetricsSink` port on a private Prometheus registry.
//! Counters and histograms are created on first use of an event name, so
//! the cache's event vocabulary never has to be declared up front.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ::prometheus::{
    exponential_buckets, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder,
};
use tracing::warn;

use crate::domain::ports::MetricsSink;
use crate::error::{Error, Result};

/// Default metric namespace
pub const DEFAULT_NAMESPACE: &str = "tiercache";

/// Prometheus-backed metrics sink.
pub struct PrometheusMetricsSink {
    registry: Registry,
    namespace: String,
    buckets: Vec<f64>,
    counters: DashMap<String, IntCounter>,
    histograms: DashMap<String, Histogram>,
}

impl PrometheusMetricsSink {
    /// Create a sink with the default namespace and byte-size buckets (1KiB .. 256MiB)
    pub fn new() -> Result<Self> {
        Self::with_namespace(DEFAULT_NAMESPACE)
    }

    /// Create a sink with a custom namespace
    pub fn with_namespace(namespace: impl Into<String>) -> Result<Self> {
        let buckets =
            exponential_buckets(1024.0, 4.0, 10).map_err(|e| Error::Metrics(e.to_string()))?;
        Ok(Self {
            registry: Registry::new(),
            namespace: namespace.into(),
            buckets,
            counters: DashMap::new(),
            histograms: DashMap::new(),
        })
    }

    /// Registry holding every metric this sink created
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .map_err(|e| Error::Metrics(e.to_string()))
    }

    fn metric_name(name: &str) -> String {
        name.to_ascii_lowercase()
    }

    fn counter(&self, name: &str) -> Option<IntCounter> {
        if let Some(counter) = self.counters.get(name) {
            return Some(counter.clone());
        }

        match self.counters.entry(name.to_string()) {
            Entry::Occupied(existing) => Some(existing.get().clone()),
            Entry::Vacant(slot) => {
                let opts = Opts::new(
                    format!("{}_total", Self::metric_name(name)),
                    format!("Cache events: {}", name),
                )
                .namespace(self.namespace.clone());
                let counter = IntCounter::with_opts(opts)
                    .and_then(|c| self.registry.register(Box::new(c.clone())).map(|_| c))
                    .map_err(|e| warn!(metric = name, error = %e, "Failed to register counter"))
                    .ok()?;
                slot.insert(counter.clone());
                Some(counter)
            }
        }
    }

    fn histogram(&self, name: &str) -> Option<Histogram> {
        if let Some(histogram) = self.histograms.get(name) {
            return Some(histogram.clone());
        }

        match self.histograms.entry(name.to_string()) {
            Entry::Occupied(existing) => Some(existing.get().clone()),
            Entry::Vacant(slot) => {
                let opts = HistogramOpts::new(
                    format!("{}_bytes", Self::metric_name(name)),
                    format!("Cache observations: {}", name),
                )
                .namespace(self.namespace.clone())
                .buckets(self.buckets.clone());
                let histogram = Histogram::with_opts(opts)
                    .and_then(|h| self.registry.register(Box::new(h.clone())).map(|_| h))
                    .map_err(|e| warn!(metric = name, error = %e, "Failed to register histogram"))
                    .ok()?;
                slot.insert(histogram.clone());
                Some(histogram)
            }
        }
    }
}

impl std::fmt::Debug for PrometheusMetricsSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusMetricsSink")
            .field("namespace", &self.namespace)
            .field("counters", &self.counters.len())
            .field("histograms", &self.histograms.len())
            .finish()
    }
}

impl MetricsSink for PrometheusMetricsSink {
    fn observe(&self, name: &str, value: f64) {
        if let Some(histogram) = self.histogram(name) {
            histogram.observe(value);
        }
    }

    fn increment(&self, name: &str) {
        if let Some(counter) = self.counter(name) {
            counter.inc();
        }
    }
}
