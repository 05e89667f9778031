// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request-duration metrics for outgoing HTTP calls.
//!
//! The instrumentation layer turns every completed round trip into one
//! [`LabelSet`] and hands it, together with the elapsed time, to a
//! [`MetricSink`]. The sink is injected by the caller; nothing is registered
//! in a process-wide registry.
//!
//! [`RequestDurationHistogram`] is the bundled sink. It keeps one histogram
//! per label set and renders the Prometheus text exposition format.
//!
//! # Example
//!
//! ```rust
//! use httpclient_rs::runtime::{HistogramConfig, LabelSet, MetricSink, RequestDurationHistogram};
//! use std::time::Duration;
//!
//! let histogram = RequestDurationHistogram::new(
//!     HistogramConfig::builder().buckets(vec![0.1, 1.0]).build(),
//! );
//!
//! let labels = LabelSet {
//!     name: "users".to_string(),
//!     scheme: "https".to_string(),
//!     host: "api.example.com".to_string(),
//!     path: "/user/{id}".to_string(),
//!     method: "GET".to_string(),
//!     code: "200".to_string(),
//! };
//! histogram.observe(&labels, Duration::from_millis(42));
//!
//! assert_eq!(histogram.count(&labels), 1);
//! println!("{}", histogram.to_prometheus_text());
//! ```

use crate::runtime::path_pattern::PathPatterns;
use http::{Method, Request, StatusCode, Uri};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Default metric name, in seconds.
pub const DEFAULT_HISTOGRAM_NAME: &str = "outgoing_http_request_duration_seconds";

/// Default bucket boundaries, in seconds.
pub const DEFAULT_BUCKETS: [f64; 5] = [0.5, 1.0, 15.0, 30.0, 60.0];

/// Label set attached to one observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelSet {
    /// Caller-chosen service name.
    pub name: String,
    /// URI scheme (`http`, `https`).
    pub scheme: String,
    /// URI authority, including the port when present.
    pub host: String,
    /// Request path, usually reduced to a template.
    pub path: String,
    /// HTTP method.
    pub method: String,
    /// Numeric response status.
    pub code: String,
}

impl LabelSet {
    /// Label names in exposition order.
    pub const NAMES: [&'static str; 6] = ["name", "scheme", "host", "path", "method", "code"];

    /// Build a label set from request metadata, a status and an already reduced path.
    #[must_use]
    pub fn from_parts(name: &str, request: &RequestMeta, status: StatusCode, path: &str) -> Self {
        Self {
            name: name.to_string(),
            scheme: request.scheme().to_string(),
            host: request.host().to_string(),
            path: path.to_string(),
            method: request.method().as_str().to_string(),
            code: status.as_u16().to_string(),
        }
    }

    /// `(label name, value)` pairs in exposition order.
    #[must_use]
    pub fn pairs(&self) -> [(&'static str, &str); 6] {
        [
            ("name", self.name.as_str()),
            ("scheme", self.scheme.as_str()),
            ("host", self.host.as_str()),
            ("path", self.path.as_str()),
            ("method", self.method.as_str()),
            ("code", self.code.as_str()),
        ]
    }
}

/// The parts of a request that labelers may read.
///
/// Captured before the request is handed to the inner transport.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    method: Method,
    uri: Uri,
}

impl RequestMeta {
    /// Capture method and URI from a request.
    #[must_use]
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
        }
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Full request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// URI scheme, empty for relative URIs.
    #[must_use]
    pub fn scheme(&self) -> &str {
        self.uri.scheme_str().unwrap_or("")
    }

    /// URI authority (`host[:port]`), empty for relative URIs.
    #[must_use]
    pub fn host(&self) -> &str {
        self.uri.authority().map(|a| a.as_str()).unwrap_or("")
    }

    /// URI path without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }
}

/// Strategy that turns a completed request into a label set.
pub trait Labeler: Send + Sync {
    /// Build the labels for one completed request.
    fn labels(&self, name: &str, request: &RequestMeta, status: StatusCode) -> LabelSet;
}

/// Uses the raw request path as the `path` label.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawPathLabeler;

impl Labeler for RawPathLabeler {
    fn labels(&self, name: &str, request: &RequestMeta, status: StatusCode) -> LabelSet {
        LabelSet::from_parts(name, request, status, request.path())
    }
}

impl Labeler for PathPatterns {
    fn labels(&self, name: &str, request: &RequestMeta, status: StatusCode) -> LabelSet {
        LabelSet::from_parts(name, request, status, self.reduce(request.path()))
    }
}

impl<F> Labeler for F
where
    F: Fn(&str, &RequestMeta, StatusCode) -> LabelSet + Send + Sync,
{
    fn labels(&self, name: &str, request: &RequestMeta, status: StatusCode) -> LabelSet {
        self(name, request, status)
    }
}

/// Destination for request-duration observations.
pub trait MetricSink: Send + Sync {
    /// Record one completed round trip.
    fn observe(&self, labels: &LabelSet, elapsed: Duration);
}

impl<T: MetricSink + ?Sized> MetricSink for Arc<T> {
    fn observe(&self, labels: &LabelSet, elapsed: Duration) {
        (**self).observe(labels, elapsed);
    }
}

/// Configuration for [`RequestDurationHistogram`].
#[derive(Debug, Clone)]
pub struct HistogramConfig {
    /// Metric name used in the exposition output.
    pub name: String,
    /// Help text used in the exposition output.
    pub help: String,
    /// Upper bucket bounds in seconds, ascending.
    pub buckets: Vec<f64>,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_HISTOGRAM_NAME.to_string(),
            help: "observe elapsed time in seconds for a outgoing request".to_string(),
            buckets: DEFAULT_BUCKETS.to_vec(),
        }
    }
}

impl HistogramConfig {
    /// Create a new builder for `HistogramConfig`.
    pub fn builder() -> HistogramConfigBuilder {
        HistogramConfigBuilder::default()
    }
}

/// Builder for `HistogramConfig`.
#[derive(Debug, Default)]
pub struct HistogramConfigBuilder {
    name: Option<String>,
    help: Option<String>,
    buckets: Option<Vec<f64>>,
}

impl HistogramConfigBuilder {
    /// Set the metric name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the help text.
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Set bucket bounds (seconds).
    pub fn buckets(mut self, buckets: Vec<f64>) -> Self {
        self.buckets = Some(buckets);
        self
    }

    /// Build the `HistogramConfig`.
    pub fn build(self) -> HistogramConfig {
        let default = HistogramConfig::default();
        HistogramConfig {
            name: self.name.unwrap_or(default.name),
            help: self.help.unwrap_or(default.help),
            buckets: self.buckets.unwrap_or(default.buckets),
        }
    }
}

/// A single histogram with cumulative bucket counters.
#[derive(Debug)]
struct Histogram {
    counts: Vec<AtomicU64>,
    sum: AtomicU64, // nanoseconds
    count: AtomicU64,
}

impl Histogram {
    fn new(bucket_len: usize) -> Self {
        Self {
            counts: (0..bucket_len).map(|_| AtomicU64::new(0)).collect(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    fn observe(&self, buckets: &[f64], value: Duration) {
        let secs = value.as_secs_f64();
        for (counter, bound) in self.counts.iter().zip(buckets) {
            if secs <= *bound {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
        let nanos = u64::try_from(value.as_nanos()).unwrap_or(u64::MAX);
        self.sum.fetch_add(nanos, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    fn sum_secs(&self) -> f64 {
        self.sum.load(Ordering::Relaxed) as f64 / 1_000_000_000.0
    }

    fn total_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Thread-safe histogram vector keyed by [`LabelSet`].
#[derive(Debug)]
pub struct RequestDurationHistogram {
    config: HistogramConfig,
    series: RwLock<HashMap<LabelSet, Histogram>>,
}

impl RequestDurationHistogram {
    /// Create a histogram with the given configuration.
    pub fn new(config: HistogramConfig) -> Self {
        Self {
            config,
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Create a histogram with the default name and buckets.
    pub fn with_defaults() -> Self {
        Self::new(HistogramConfig::default())
    }

    /// The configuration in use.
    pub fn config(&self) -> &HistogramConfig {
        &self.config
    }

    /// Number of observations recorded for one label set.
    pub fn count(&self, labels: &LabelSet) -> u64 {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        series.get(labels).map_or(0, Histogram::total_count)
    }

    /// Number of observations across all label sets.
    pub fn total_count(&self) -> u64 {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        series.values().map(Histogram::total_count).sum()
    }

    /// Sum of observed durations for one label set.
    pub fn sum(&self, labels: &LabelSet) -> Duration {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        series.get(labels).map_or(Duration::ZERO, |h| {
            Duration::from_nanos(h.sum.load(Ordering::Relaxed))
        })
    }

    /// All label sets observed so far, sorted.
    pub fn label_sets(&self) -> Vec<LabelSet> {
        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<LabelSet> = series.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Export in Prometheus text format.
    pub fn to_prometheus_text(&self) -> String {
        let name = &self.config.name;
        let mut output = String::new();
        output.push_str(&format!("# HELP {name} {}\n", self.config.help));
        output.push_str(&format!("# TYPE {name} histogram\n"));

        let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<&LabelSet> = series.keys().collect();
        keys.sort();

        for labels in keys {
            let Some(hist) = series.get(labels) else {
                continue;
            };
            let base_labels = labels
                .pairs()
                .iter()
                .map(|(k, v)| format!("{k}=\"{}\"", escape_label_value(v)))
                .collect::<Vec<_>>()
                .join(",");

            for (bound, count) in self.config.buckets.iter().zip(&hist.counts) {
                output.push_str(&format!(
                    "{name}_bucket{{{base_labels},le=\"{bound}\"}} {}\n",
                    count.load(Ordering::Relaxed)
                ));
            }
            let total = hist.total_count();
            output.push_str(&format!(
                "{name}_bucket{{{base_labels},le=\"+Inf\"}} {total}\n"
            ));
            output.push_str(&format!(
                "{name}_sum{{{base_labels}}} {}\n",
                hist.sum_secs()
            ));
            output.push_str(&format!("{name}_count{{{base_labels}}} {total}\n"));
        }

        output
    }
}

impl Default for RequestDurationHistogram {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl MetricSink for RequestDurationHistogram {
    fn observe(&self, labels: &LabelSet, elapsed: Duration) {
        {
            let series = self.series.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(hist) = series.get(labels) {
                hist.observe(&self.config.buckets, elapsed);
                return;
            }
        }

        let mut series = self.series.write().unwrap_or_else(PoisonError::into_inner);
        series
            .entry(labels.clone())
            .or_insert_with(|| Histogram::new(self.config.buckets.len()))
            .observe(&self.config.buckets, elapsed);
    }
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
