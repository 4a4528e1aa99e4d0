//! Queueing-discipline statistics.
//!
//! Only root qdiscs (`parent == 0`) are reported; child qdiscs would count
//! the same traffic twice.
//!
//! Two data sources are available:
//! - [`TcSource`] runs `tc -s -j qdisc show` and reads its JSON output.
//! - [`FixtureSource`] reads a `results.json` file with pre-recorded entries,
//!   for deterministic end-to-end tests.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use nodesight_common::{MetricDescriptor, NAMESPACE, Probe, ProbeError, SampleSink, build_fq_name};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::ProbesConfig;

/// File read from the fixture directory.
pub const FIXTURE_FILE: &str = "results.json";

const LABELS: [&str; 2] = ["device", "kind"];

/// Statistics for one qdisc.
///
/// Counters missing from a fixture entry read as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct QdiscInfo {
    pub iface_name: String,
    pub parent: u32,
    pub handle: u32,
    pub kind: String,
    pub bytes: u64,
    pub packets: u64,
    pub drops: u64,
    pub requeues: u64,
    pub overlimits: u64,
    pub gc_flows: u64,
    pub throttled: u64,
    pub flows_plimit: u64,
    pub qlen: u64,
    pub backlog: u64,
}

/// Where the probe gets its qdisc list from.
pub trait QdiscSource: Send {
    fn fetch(&mut self) -> Result<Vec<QdiscInfo>, ProbeError>;
}

/// Reads `<dir>/results.json`.
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

impl QdiscSource for FixtureSource {
    fn fetch(&mut self) -> Result<Vec<QdiscInfo>, ProbeError> {
        let content = std::fs::read(&self.path).map_err(|e| {
            ProbeError::unavailable(format!("{}: {e}", self.path.display()))
        })?;
        Ok(serde_json::from_slice(&content)?)
    }
}

/// Entry of `tc -j qdisc show` output.
#[derive(Debug, Deserialize)]
struct TcQdisc {
    kind: String,
    dev: String,
    #[serde(default)]
    handle: Option<String>,
    #[serde(default)]
    root: bool,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    bytes: u64,
    #[serde(default)]
    packets: u64,
    #[serde(default)]
    drops: u64,
    #[serde(default)]
    overlimits: u64,
    #[serde(default)]
    requeues: u64,
    #[serde(default)]
    backlog: u64,
    #[serde(default)]
    qlen: u64,
}

impl TryFrom<TcQdisc> for QdiscInfo {
    type Error = ProbeError;

    fn try_from(tc: TcQdisc) -> Result<Self, Self::Error> {
        let parent = match (tc.root, tc.parent.as_deref()) {
            (true, _) => 0,
            (false, Some(parent)) => parse_handle(parent)?,
            (false, None) => {
                return Err(ProbeError::malformed(format!(
                    "qdisc {} on {} has neither root nor parent",
                    tc.kind, tc.dev
                )));
            }
        };
        let handle = tc.handle.as_deref().map(parse_handle).transpose()?.unwrap_or(0);

        Ok(Self {
            iface_name: tc.dev,
            parent,
            handle,
            kind: tc.kind,
            bytes: tc.bytes,
            packets: tc.packets,
            drops: tc.drops,
            requeues: tc.requeues,
            overlimits: tc.overlimits,
            qlen: tc.qlen,
            backlog: tc.backlog,
            ..Self::default()
        })
    }
}

/// Parse a `major:minor` tc handle (hex) into its 32-bit form.
pub fn parse_handle(s: &str) -> Result<u32, ProbeError> {
    let (major, minor) = s
        .split_once(':')
        .ok_or_else(|| ProbeError::malformed(format!("invalid tc handle '{s}'")))?;

    let part = |p: &str| -> Result<u32, ProbeError> {
        if p.is_empty() {
            return Ok(0);
        }
        u32::from_str_radix(p, 16)
            .ok()
            .filter(|v| *v <= 0xffff)
            .ok_or_else(|| ProbeError::malformed(format!("invalid tc handle '{s}'")))
    };

    Ok((part(major)? << 16) | part(minor)?)
}

/// Queries the kernel through the `tc` tool from iproute2.
#[derive(Debug, Clone)]
pub struct TcSource {
    program: String,
}

impl TcSource {
    pub fn new() -> Result<Self, ProbeError> {
        if !cfg!(target_os = "linux") {
            return Err(ProbeError::unsupported("qdisc statistics require Linux"));
        }
        Ok(Self::with_program("tc"))
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Convert raw `tc -j` output into qdisc entries.
    pub fn parse(output: &[u8]) -> Result<Vec<QdiscInfo>, ProbeError> {
        let entries: Vec<TcQdisc> = serde_json::from_slice(output)?;
        entries.into_iter().map(QdiscInfo::try_from).collect()
    }
}

impl QdiscSource for TcSource {
    fn fetch(&mut self) -> Result<Vec<QdiscInfo>, ProbeError> {
        let output = Command::new(&self.program)
            .args(["-s", "-j", "qdisc", "show"])
            .output()
            .map_err(|e| ProbeError::unavailable(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            return Err(ProbeError::unavailable(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Self::parse(&output.stdout)
    }
}

/// Exposes queueing-discipline statistics per device.
pub struct QdiscProbe {
    bytes: Arc<MetricDescriptor>,
    packets: Arc<MetricDescriptor>,
    drops: Arc<MetricDescriptor>,
    requeues: Arc<MetricDescriptor>,
    overlimits: Arc<MetricDescriptor>,
    qlength: Arc<MetricDescriptor>,
    backlog: Arc<MetricDescriptor>,
    source: Box<dyn QdiscSource>,
}

impl QdiscProbe {
    pub fn new(source: Box<dyn QdiscSource>) -> Self {
        let name = |n: &str| build_fq_name(NAMESPACE, "qdisc", n);

        Self {
            bytes: MetricDescriptor::counter(name("bytes_total"), "Number of bytes sent.", LABELS),
            packets: MetricDescriptor::counter(
                name("packets_total"),
                "Number of packets sent.",
                LABELS,
            ),
            drops: MetricDescriptor::counter(
                name("drops_total"),
                "Number of packets dropped.",
                LABELS,
            ),
            requeues: MetricDescriptor::counter(
                name("requeues_total"),
                "Number of packets dequeued, not transmitted, and requeued.",
                LABELS,
            ),
            overlimits: MetricDescriptor::counter(
                name("overlimits_total"),
                "Number of overlimit packets.",
                LABELS,
            ),
            qlength: MetricDescriptor::gauge(
                name("current_queue_length"),
                "Number of packets currently in queue to be sent.",
                LABELS,
            ),
            backlog: MetricDescriptor::gauge(
                name("backlog"),
                "Number of bytes currently in queue to be sent.",
                LABELS,
            ),
            source,
        }
    }

    /// Fixture directory if configured, otherwise the live `tc` source.
    pub fn from_config(config: &ProbesConfig) -> Result<Box<dyn Probe>, ProbeError> {
        let source: Box<dyn QdiscSource> = match &config.qdisc.fixtures {
            Some(dir) => Box::new(FixtureSource::new(dir)),
            None => Box::new(TcSource::new()?),
        };
        Ok(Box::new(Self::new(source)))
    }
}

impl Probe for QdiscProbe {
    fn name(&self) -> &str {
        "qdisc"
    }

    fn update(&mut self, sink: &mut dyn SampleSink) -> Result<(), ProbeError> {
        let msgs = self.source.fetch()?;

        for msg in &msgs {
            if msg.parent != 0 {
                trace!(device = %msg.iface_name, kind = %msg.kind, parent = msg.parent, "Skipping child qdisc");
                continue;
            }

            let labels = [msg.iface_name.as_str(), msg.kind.as_str()];
            sink.emit(self.bytes.observe(msg.bytes as f64, &labels));
            sink.emit(self.packets.observe(msg.packets as f64, &labels));
            sink.emit(self.drops.observe(msg.drops as f64, &labels));
            sink.emit(self.requeues.observe(msg.requeues as f64, &labels));
            sink.emit(self.overlimits.observe(msg.overlimits as f64, &labels));
            sink.emit(self.qlength.observe(msg.qlen as f64, &labels));
            sink.emit(self.backlog.observe(msg.backlog as f64, &labels));
        }

        Ok(())
    }
}
