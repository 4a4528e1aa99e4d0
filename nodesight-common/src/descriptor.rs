//! Typed metric descriptors and the samples built from them.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Metric namespace shared by every probe.
pub const NAMESPACE: &str = "node";

/// Semantic kind of a metric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Monotonically increasing value.
    Counter,
    /// Value that can go up or down.
    Gauge,
}

impl ValueKind {
    /// Name used on the exposition `# TYPE` line.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Counter => "counter",
            ValueKind::Gauge => "gauge",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of one metric type.
///
/// A descriptor is created once when a probe is constructed and shared by
/// every sample of that metric. It is never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    name: String,
    help: String,
    label_names: Vec<String>,
    kind: ValueKind,
}

impl MetricDescriptor {
    /// Describe a metric.
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        help: impl Into<String>,
        label_names: impl IntoIterator<Item = S>,
        kind: ValueKind,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            help: help.into(),
            label_names: label_names.into_iter().map(Into::into).collect(),
            kind,
        })
    }

    /// Describe a counter.
    pub fn counter<S: Into<String>>(
        name: impl Into<String>,
        help: impl Into<String>,
        label_names: impl IntoIterator<Item = S>,
    ) -> Arc<Self> {
        Self::new(name, help, label_names, ValueKind::Counter)
    }

    /// Describe a gauge.
    pub fn gauge<S: Into<String>>(
        name: impl Into<String>,
        help: impl Into<String>,
        label_names: impl IntoIterator<Item = S>,
    ) -> Arc<Self> {
        Self::new(name, help, label_names, ValueKind::Gauge)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Turn a raw value plus label values into a sample of this metric.
    ///
    /// # Panics
    ///
    /// Panics if the number of label values differs from the number of
    /// declared label names. That is a bug in the calling probe.
    pub fn observe<S: AsRef<str>>(self: &Arc<Self>, value: f64, label_values: &[S]) -> Sample {
        assert_eq!(
            label_values.len(),
            self.label_names.len(),
            "metric {} expects labels {:?}",
            self.name,
            self.label_names
        );

        Sample {
            desc: Arc::clone(self),
            value,
            label_values: label_values
                .iter()
                .map(|v| v.as_ref().to_string())
                .collect(),
        }
    }
}

/// One observation of a metric, produced during a scrape cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    desc: Arc<MetricDescriptor>,
    value: f64,
    label_values: Vec<String>,
}

impl Sample {
    pub fn desc(&self) -> &Arc<MetricDescriptor> {
        &self.desc
    }

    pub fn name(&self) -> &str {
        self.desc.name()
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    /// Label name/value pairs in declaration order.
    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.desc
            .label_names()
            .iter()
            .map(String::as_str)
            .zip(self.label_values.iter().map(String::as_str))
    }

    /// Look up a single label value by name.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels().find(|(k, _)| *k == name).map(|(_, v)| v)
    }
}

/// Build a fully-qualified metric name from its parts.
///
/// Empty parts are skipped, the rest are joined with `_`.
pub fn build_fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    [namespace, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_fq_name() {
        assert_eq!(build_fq_name("node", "qdisc", "bytes_total"), "node_qdisc_bytes_total");
        assert_eq!(build_fq_name("node", "", "time_seconds"), "node_time_seconds");
        assert_eq!(build_fq_name("", "", "up"), "up");
    }

    #[test]
    fn test_observe_pairs_labels_in_order() {
        let desc = MetricDescriptor::counter(
            "node_qdisc_bytes_total",
            "Number of bytes sent.",
            ["device", "kind"],
        );
        let sample = desc.observe(1000.0, &["eth0", "pfifo"]);

        assert_eq!(sample.name(), "node_qdisc_bytes_total");
        assert_eq!(sample.value(), 1000.0);
        assert_eq!(sample.desc().kind(), ValueKind::Counter);
        let labels: Vec<_> = sample.labels().collect();
        assert_eq!(labels, vec![("device", "eth0"), ("kind", "pfifo")]);
        assert_eq!(sample.label("kind"), Some("pfifo"));
        assert_eq!(sample.label("missing"), None);
    }

    #[test]
    fn test_observe_without_labels() {
        let desc = MetricDescriptor::gauge("node_time_seconds", "System time.", Vec::<String>::new());
        let sample = desc.observe(1.5, &[] as &[&str]);

        assert!(sample.label_values().is_empty());
        assert_eq!(sample.desc().kind(), ValueKind::Gauge);
    }

    #[test]
    #[should_panic(expected = "expects labels")]
    fn test_observe_label_count_mismatch_panics() {
        let desc = MetricDescriptor::gauge("node_load1", "1m load average.", ["cpu"]);
        let _ = desc.observe(0.5, &["a", "b"]);
    }

    #[test]
    fn test_samples_share_descriptor() {
        let desc = MetricDescriptor::gauge("node_qdisc_backlog", "Backlog.", ["device"]);
        let a = desc.observe(1.0, &["eth0"]);
        let b = desc.observe(2.0, &["eth1"]);

        assert!(Arc::ptr_eq(a.desc(), b.desc()));
    }

    #[test]
    fn test_value_kind_as_str() {
        assert_eq!(ValueKind::Counter.as_str(), "counter");
        assert_eq!(ValueKind::Gauge.to_string(), "gauge");
    }
}
