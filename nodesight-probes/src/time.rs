//! Wall-clock time probe.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use nodesight_common::{MetricDescriptor, NAMESPACE, Probe, ProbeError, SampleSink, build_fq_name};
use tracing::debug;

use crate::config::ProbesConfig;

/// Exposes the current system time in seconds since the epoch.
pub struct TimeProbe {
    desc: Arc<MetricDescriptor>,
}

impl TimeProbe {
    pub fn new() -> Self {
        Self {
            desc: MetricDescriptor::gauge(
                build_fq_name(NAMESPACE, "", "time_seconds"),
                "System time in seconds since epoch (1970).",
                Vec::<String>::new(),
            ),
        }
    }

    pub fn from_config(_config: &ProbesConfig) -> Result<Box<dyn Probe>, ProbeError> {
        Ok(Box::new(Self::new()))
    }
}

impl Default for TimeProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for TimeProbe {
    fn name(&self) -> &str {
        "time"
    }

    fn update(&mut self, sink: &mut dyn SampleSink) -> Result<(), ProbeError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ProbeError::malformed(format!("system clock before epoch: {e}")))?
            .as_secs_f64();

        debug!(now, "Return time");
        sink.emit(self.desc.observe(now, &[] as &[&str]));
        Ok(())
    }
}
