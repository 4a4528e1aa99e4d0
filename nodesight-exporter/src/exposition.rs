//! Prometheus text exposition format (version 0.0.4).

use std::collections::HashMap;
use std::fmt::Write;

use nodesight_common::Sample;

/// Content type of [`render`] output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render samples in Prometheus text format.
///
/// Samples sharing a metric name are grouped under a single `# HELP` /
/// `# TYPE` block. Blocks appear in the order their name was first seen and
/// keep the original sample order inside each block.
pub fn render(samples: &[Sample]) -> String {
    let mut order: Vec<&str> = Vec::new();
    let mut by_name: HashMap<&str, Vec<&Sample>> = HashMap::new();
    for sample in samples {
        by_name
            .entry(sample.name())
            .or_insert_with(|| {
                order.push(sample.name());
                Vec::new()
            })
            .push(sample);
    }

    let mut output = String::with_capacity(samples.len() * 64);

    for name in order {
        let series = &by_name[name];
        let desc = series[0].desc();

        writeln!(output, "# HELP {} {}", name, escape_help(desc.help())).ok();
        writeln!(output, "# TYPE {} {}", name, desc.kind().as_str()).ok();

        for sample in series {
            writeln!(
                output,
                "{}{} {}",
                name,
                format_labels(sample),
                format_value(sample.value())
            )
            .ok();
        }
    }

    output
}

/// Escape a HELP docstring.
fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Escape a label value for Prometheus.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

fn format_labels(sample: &Sample) -> String {
    let parts: Vec<String> = sample
        .labels()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    if parts.is_empty() {
        String::new()
    } else {
        format!("{{{}}}", parts.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodesight_common::MetricDescriptor;

    #[test]
    fn test_escape_label_value() {
        assert_eq!(escape_label_value("simple"), "simple");
        assert_eq!(escape_label_value("with\"quote"), "with\\\"quote");
        assert_eq!(escape_label_value("with\\backslash"), "with\\\\backslash");
        assert_eq!(escape_label_value("with\nnewline"), "with\\nnewline");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(42.0), "42");
        assert_eq!(format_value(3.14), "3.14");
        assert_eq!(format_value(-0.5), "-0.5");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
        assert_eq!(format_value(513712128000.0), "513712128000");
    }

    #[test]
    fn test_render_groups_interleaved_samples() {
        let bytes = MetricDescriptor::counter("node_qdisc_bytes_total", "Number of bytes sent.", [
            "device", "kind",
        ]);
        let success = MetricDescriptor::gauge(
            "node_scrape_collector_success",
            "Whether a collector succeeded.",
            ["collector"],
        );

        let samples = vec![
            bytes.observe(1000.0, &["eth0", "pfifo"]),
            success.observe(1.0, &["qdisc"]),
            bytes.observe(42.0, &["wlan0", "fq"]),
            success.observe(0.0, &["diskstats"]),
        ];

        let expected = "\
# HELP node_qdisc_bytes_total Number of bytes sent.
# TYPE node_qdisc_bytes_total counter
node_qdisc_bytes_total{device=\"eth0\",kind=\"pfifo\"} 1000
node_qdisc_bytes_total{device=\"wlan0\",kind=\"fq\"} 42
# HELP node_scrape_collector_success Whether a collector succeeded.
# TYPE node_scrape_collector_success gauge
node_scrape_collector_success{collector=\"qdisc\"} 1
node_scrape_collector_success{collector=\"diskstats\"} 0
";
        assert_eq!(render(&samples), expected);
    }

    #[test]
    fn test_render_unlabeled_and_escaped() {
        let time = MetricDescriptor::gauge("node_time_seconds", "Line one\nline two.", Vec::<String>::new());
        let fs = MetricDescriptor::gauge("node_filesystem_size_bytes", "Size.", ["mountpoint"]);

        let output = render(&[
            time.observe(1.5, &[] as &[&str]),
            fs.observe(10.0, &["/mnt/we\"ird"]),
        ]);

        assert!(output.contains("# HELP node_time_seconds Line one\\nline two.\n"));
        assert!(output.contains("node_time_seconds 1.5\n"));
        assert!(output.contains("node_filesystem_size_bytes{mountpoint=\"/mnt/we\\\"ird\"} 10\n"));
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render(&[]), "");
    }
}
