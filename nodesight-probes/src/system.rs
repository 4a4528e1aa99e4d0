//! Host-wide gauges read through `sysinfo`: load average, memory and boot time.

use std::sync::Arc;

use nodesight_common::{MetricDescriptor, NAMESPACE, Probe, ProbeError, SampleSink, build_fq_name};
use sysinfo::{MemoryRefreshKind, System};
use tracing::debug;

use crate::config::ProbesConfig;

const NO_LABELS: [&str; 0] = [];

fn require_supported() -> Result<(), ProbeError> {
    if sysinfo::IS_SUPPORTED_SYSTEM {
        Ok(())
    } else {
        Err(ProbeError::unsupported("sysinfo does not support this platform"))
    }
}

/// Exposes the 1, 5 and 15 minute load averages.
pub struct LoadavgProbe {
    descs: [Arc<MetricDescriptor>; 3],
}

impl LoadavgProbe {
    pub fn new() -> Self {
        let desc = |window: &str, help: &str| {
            MetricDescriptor::gauge(build_fq_name(NAMESPACE, "", &format!("load{window}")), help, NO_LABELS)
        };

        Self {
            descs: [
                desc("1", "1m load average."),
                desc("5", "5m load average."),
                desc("15", "15m load average."),
            ],
        }
    }

    pub fn from_config(_: &ProbesConfig) -> Result<Box<dyn Probe>, ProbeError> {
        require_supported()?;
        if cfg!(target_os = "windows") {
            return Err(ProbeError::unsupported("load average is not available on Windows"));
        }
        Ok(Box::new(Self::new()))
    }
}

impl Default for LoadavgProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for LoadavgProbe {
    fn name(&self) -> &str {
        "loadavg"
    }

    fn update(&mut self, sink: &mut dyn SampleSink) -> Result<(), ProbeError> {
        let load = System::load_average();
        debug!(one = load.one, five = load.five, fifteen = load.fifteen, "Load average");

        let [one, five, fifteen] = &self.descs;
        sink.emit(one.observe(load.one, &NO_LABELS));
        sink.emit(five.observe(load.five, &NO_LABELS));
        sink.emit(fifteen.observe(load.fifteen, &NO_LABELS));
        Ok(())
    }
}

/// Exposes physical memory and swap usage.
pub struct MeminfoProbe {
    system: System,
    total: Arc<MetricDescriptor>,
    available: Arc<MetricDescriptor>,
    free: Arc<MetricDescriptor>,
    used: Arc<MetricDescriptor>,
    swap_total: Arc<MetricDescriptor>,
    swap_free: Arc<MetricDescriptor>,
}

impl MeminfoProbe {
    pub fn new() -> Self {
        let desc = |name: &str, help: &str| {
            MetricDescriptor::gauge(build_fq_name(NAMESPACE, "memory", name), help, NO_LABELS)
        };

        Self {
            system: System::new(),
            total: desc("total_bytes", "Total physical memory in bytes."),
            available: desc("available_bytes", "Memory available for new allocations in bytes."),
            free: desc("free_bytes", "Unused physical memory in bytes."),
            used: desc("used_bytes", "Physical memory in use in bytes."),
            swap_total: desc("swap_total_bytes", "Total swap space in bytes."),
            swap_free: desc("swap_free_bytes", "Unused swap space in bytes."),
        }
    }

    pub fn from_config(_: &ProbesConfig) -> Result<Box<dyn Probe>, ProbeError> {
        require_supported()?;
        Ok(Box::new(Self::new()))
    }
}

impl Default for MeminfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for MeminfoProbe {
    fn name(&self) -> &str {
        "meminfo"
    }

    fn update(&mut self, sink: &mut dyn SampleSink) -> Result<(), ProbeError> {
        self.system.refresh_memory_specifics(MemoryRefreshKind::everything());

        let total = self.system.total_memory();
        if total == 0 {
            return Err(ProbeError::unavailable("memory information is not readable"));
        }

        sink.emit(self.total.observe(total as f64, &NO_LABELS));
        sink.emit(self.available.observe(self.system.available_memory() as f64, &NO_LABELS));
        sink.emit(self.free.observe(self.system.free_memory() as f64, &NO_LABELS));
        sink.emit(self.used.observe(self.system.used_memory() as f64, &NO_LABELS));
        sink.emit(self.swap_total.observe(self.system.total_swap() as f64, &NO_LABELS));
        sink.emit(self.swap_free.observe(self.system.free_swap() as f64, &NO_LABELS));
        Ok(())
    }
}

/// Exposes the system boot time as a Unix timestamp.
pub struct BoottimeProbe {
    desc: Arc<MetricDescriptor>,
}

impl BoottimeProbe {
    pub fn new() -> Self {
        Self {
            desc: MetricDescriptor::gauge(
                build_fq_name(NAMESPACE, "boot", "time_seconds"),
                "Node boot time, in unixtime.",
                NO_LABELS,
            ),
        }
    }

    pub fn from_config(_: &ProbesConfig) -> Result<Box<dyn Probe>, ProbeError> {
        require_supported()?;
        Ok(Box::new(Self::new()))
    }
}

impl Default for BoottimeProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for BoottimeProbe {
    fn name(&self) -> &str {
        "boottime"
    }

    fn update(&mut self, sink: &mut dyn SampleSink) -> Result<(), ProbeError> {
        let boot_time = System::boot_time();
        if boot_time == 0 {
            return Err(ProbeError::unavailable("boot time is not readable"));
        }

        sink.emit(self.desc.observe(boot_time as f64, &NO_LABELS));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodesight_common::Sample;

    #[test]
    fn test_loadavg_names() {
        let probe = LoadavgProbe::new();
        let names: Vec<_> = probe.descs.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["node_load1", "node_load5", "node_load15"]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_loadavg_update() {
        let mut probe = LoadavgProbe::new();
        let mut samples = Vec::new();

        probe.update(&mut samples).unwrap();

        assert_eq!(samples.len(), 3);
        assert!(samples.iter().all(|s| s.value() >= 0.0));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_meminfo_update() {
        let mut probe = MeminfoProbe::new();
        let mut samples: Vec<Sample> = Vec::new();

        probe.update(&mut samples).unwrap();

        assert_eq!(samples.len(), 6);
        let total = samples[0].value();
        assert_eq!(samples[0].name(), "node_memory_total_bytes");
        assert!(total > 0.0);
        assert!(samples.iter().skip(1).take(3).all(|s| s.value() <= total));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_boottime_is_in_the_past() {
        let mut probe = BoottimeProbe::new();
        let mut samples = Vec::new();

        probe.update(&mut samples).unwrap();

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs_f64();
        assert_eq!(samples.len(), 1);
        assert!(samples[0].value() > 0.0 && samples[0].value() <= now);
    }
}
