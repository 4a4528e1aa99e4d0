//! Disk I/O statistics.
//!
//! Every readable device reports all of its counters in the same update.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use nodesight_common::{MetricDescriptor, NAMESPACE, Probe, ProbeError, SampleSink, build_fq_name};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::ProbesConfig;
use crate::filter::PatternSet;

/// File read from the fixture directory.
pub const FIXTURE_FILE: &str = "diskstats.json";

/// `/proc/diskstats` always counts in 512-byte sectors.
const SECTOR_SIZE: f64 = 512.0;

/// Raw counters for one block device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskStats {
    pub name: String,
    pub reads: u64,
    pub reads_merged: u64,
    pub sectors_read: u64,
    pub time_reading_ms: u64,
    pub writes: u64,
    pub writes_merged: u64,
    pub sectors_written: u64,
    pub time_writing_ms: u64,
    pub in_progress: u64,
    pub time_in_progress_ms: u64,
    pub weighted_time_in_progress_ms: u64,
}

/// Where the probe gets per-device counters from.
pub trait DiskStatsSource: Send {
    fn fetch(&mut self) -> Result<Vec<DiskStats>, ProbeError>;
}

/// Reads `<dir>/diskstats.json`.
#[derive(Debug, Clone)]
pub struct FixtureSource {
    path: PathBuf,
}

impl FixtureSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(FIXTURE_FILE),
        }
    }
}

impl DiskStatsSource for FixtureSource {
    fn fetch(&mut self) -> Result<Vec<DiskStats>, ProbeError> {
        let content = std::fs::read(&self.path).map_err(|e| {
            ProbeError::unavailable(format!("{}: {e}", self.path.display()))
        })?;
        Ok(serde_json::from_slice(&content)?)
    }
}

/// Reads `/proc/diskstats`.
#[cfg(target_os = "linux")]
#[derive(Debug, Clone, Default)]
pub struct ProcfsSource;

#[cfg(target_os = "linux")]
impl DiskStatsSource for ProcfsSource {
    fn fetch(&mut self) -> Result<Vec<DiskStats>, ProbeError> {
        let disks = procfs::diskstats()
            .map_err(|e| ProbeError::unavailable(format!("couldn't get diskstats: {e}")))?;

        Ok(disks
            .into_iter()
            .map(|d| DiskStats {
                name: d.name,
                reads: d.reads as u64,
                reads_merged: d.merged as u64,
                sectors_read: d.sectors_read as u64,
                time_reading_ms: d.time_reading as u64,
                writes: d.writes as u64,
                writes_merged: d.writes_merged as u64,
                sectors_written: d.sectors_written as u64,
                time_writing_ms: d.time_writing as u64,
                in_progress: d.in_progress as u64,
                time_in_progress_ms: d.time_in_progress as u64,
                weighted_time_in_progress_ms: d.weighted_time_in_progress as u64,
            })
            .collect())
    }
}

#[cfg(target_os = "linux")]
fn live_source() -> Result<Box<dyn DiskStatsSource>, ProbeError> {
    Ok(Box::new(ProcfsSource))
}

#[cfg(not(target_os = "linux"))]
fn live_source() -> Result<Box<dyn DiskStatsSource>, ProbeError> {
    Err(ProbeError::unsupported("disk statistics require /proc/diskstats"))
}

/// A descriptor plus the function extracting its value from a device.
struct DiskMetric {
    desc: Arc<MetricDescriptor>,
    value: fn(&DiskStats) -> f64,
}

impl DiskMetric {
    fn counter(name: &str, help: &str, value: fn(&DiskStats) -> f64) -> Self {
        Self {
            desc: MetricDescriptor::counter(build_fq_name(NAMESPACE, "disk", name), help, ["device"]),
            value,
        }
    }

    fn gauge(name: &str, help: &str, value: fn(&DiskStats) -> f64) -> Self {
        Self {
            desc: MetricDescriptor::gauge(build_fq_name(NAMESPACE, "disk", name), help, ["device"]),
            value,
        }
    }
}

fn millis(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

/// Exposes per-device disk I/O counters.
pub struct DiskstatsProbe {
    metrics: Vec<DiskMetric>,
    ignored: PatternSet,
    source: Box<dyn DiskStatsSource>,
}

impl DiskstatsProbe {
    pub fn new(source: Box<dyn DiskStatsSource>, ignored: PatternSet) -> Self {
        let metrics = vec![
            DiskMetric::counter(
                "reads_completed_total",
                "The total number of reads completed successfully.",
                |s| s.reads as f64,
            ),
            DiskMetric::counter(
                "reads_merged_total",
                "The total number of reads merged.",
                |s| s.reads_merged as f64,
            ),
            DiskMetric::counter(
                "read_bytes_total",
                "The total number of bytes read successfully.",
                |s| s.sectors_read as f64 * SECTOR_SIZE,
            ),
            DiskMetric::counter(
                "read_time_seconds_total",
                "The total number of seconds spent by all reads.",
                |s| millis(s.time_reading_ms),
            ),
            DiskMetric::counter(
                "writes_completed_total",
                "The total number of writes completed successfully.",
                |s| s.writes as f64,
            ),
            DiskMetric::counter(
                "writes_merged_total",
                "The number of writes merged.",
                |s| s.writes_merged as f64,
            ),
            DiskMetric::counter(
                "written_bytes_total",
                "The total number of bytes written successfully.",
                |s| s.sectors_written as f64 * SECTOR_SIZE,
            ),
            DiskMetric::counter(
                "write_time_seconds_total",
                "This is the total number of seconds spent by all writes.",
                |s| millis(s.time_writing_ms),
            ),
            DiskMetric::gauge(
                "io_now",
                "The number of I/Os currently in progress.",
                |s| s.in_progress as f64,
            ),
            DiskMetric::counter(
                "io_time_seconds_total",
                "Total seconds spent doing I/Os.",
                |s| millis(s.time_in_progress_ms),
            ),
            DiskMetric::counter(
                "io_time_weighted_seconds_total",
                "The weighted number of seconds spent doing I/Os.",
                |s| millis(s.weighted_time_in_progress_ms),
            ),
        ];

        Self {
            metrics,
            ignored,
            source,
        }
    }

    /// Fixture directory if configured, otherwise `/proc/diskstats`.
    pub fn from_config(config: &ProbesConfig) -> Result<Box<dyn Probe>, ProbeError> {
        let ignored = PatternSet::new(&config.diskstats.ignored_devices)
            .map_err(|e| ProbeError::config(format!("diskstats.ignored_devices: {e}")))?;

        let source = match &config.diskstats.fixtures {
            Some(dir) => Box::new(FixtureSource::new(dir)) as Box<dyn DiskStatsSource>,
            None => live_source()?,
        };
        Ok(Box::new(Self::new(source, ignored)))
    }

    /// Number of metrics reported for every device.
    pub fn metrics_per_device(&self) -> usize {
        self.metrics.len()
    }
}

impl Probe for DiskstatsProbe {
    fn name(&self) -> &str {
        "diskstats"
    }

    fn update(&mut self, sink: &mut dyn SampleSink) -> Result<(), ProbeError> {
        let disks = self.source.fetch()?;

        for disk in &disks {
            if self.ignored.matches(&disk.name) {
                trace!(device = %disk.name, "Ignoring device");
                continue;
            }

            let labels = [disk.name.as_str()];
            for metric in &self.metrics {
                sink.emit(metric.desc.observe((metric.value)(disk), &labels));
            }
        }

        Ok(())
    }
}
