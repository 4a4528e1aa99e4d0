//! Network interface traffic counters.

use std::sync::Arc;

use nodesight_common::{MetricDescriptor, NAMESPACE, Probe, ProbeError, SampleSink, build_fq_name};
use sysinfo::{NetworkData, Networks};

use crate::config::ProbesConfig;
use crate::filter::PatternSet;

/// Exposes per-interface receive and transmit totals.
pub struct NetdevProbe {
    networks: Networks,
    receive_bytes: Arc<MetricDescriptor>,
    receive_packets: Arc<MetricDescriptor>,
    receive_errs: Arc<MetricDescriptor>,
    transmit_bytes: Arc<MetricDescriptor>,
    transmit_packets: Arc<MetricDescriptor>,
    transmit_errs: Arc<MetricDescriptor>,
    ignored: PatternSet,
}

impl NetdevProbe {
    pub fn new(ignored: PatternSet) -> Self {
        let desc = |name: &str, help: &str| {
            MetricDescriptor::counter(build_fq_name(NAMESPACE, "network", name), help, ["device"])
        };

        Self {
            networks: Networks::new_with_refreshed_list(),
            receive_bytes: desc("receive_bytes_total", "Network device statistic receive_bytes."),
            receive_packets: desc("receive_packets_total", "Network device statistic receive_packets."),
            receive_errs: desc("receive_errs_total", "Network device statistic receive_errs."),
            transmit_bytes: desc("transmit_bytes_total", "Network device statistic transmit_bytes."),
            transmit_packets: desc(
                "transmit_packets_total",
                "Network device statistic transmit_packets.",
            ),
            transmit_errs: desc("transmit_errs_total", "Network device statistic transmit_errs."),
            ignored,
        }
    }

    pub fn from_config(config: &ProbesConfig) -> Result<Box<dyn Probe>, ProbeError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(ProbeError::unsupported("sysinfo does not support this platform"));
        }

        let ignored = PatternSet::new(&config.netdev.ignored_devices)
            .map_err(|e| ProbeError::config(format!("netdev.ignored_devices: {e}")))?;
        Ok(Box::new(Self::new(ignored)))
    }

    fn emit(&self, device: &str, data: &NetworkData, sink: &mut dyn SampleSink) {
        let labels = [device];
        let counters = [
            (&self.receive_bytes, data.total_received()),
            (&self.receive_packets, data.total_packets_received()),
            (&self.receive_errs, data.total_errors_on_received()),
            (&self.transmit_bytes, data.total_transmitted()),
            (&self.transmit_packets, data.total_packets_transmitted()),
            (&self.transmit_errs, data.total_errors_on_transmitted()),
        ];

        for (desc, value) in counters {
            sink.emit(desc.observe(value as f64, &labels));
        }
    }
}

impl Probe for NetdevProbe {
    fn name(&self) -> &str {
        "netdev"
    }

    fn update(&mut self, sink: &mut dyn SampleSink) -> Result<(), ProbeError> {
        self.networks.refresh(true);

        let mut devices: Vec<(&String, &NetworkData)> = self
            .networks
            .list()
            .iter()
            .filter(|(name, _)| !self.ignored.matches(name))
            .collect();
        devices.sort_by(|a, b| a.0.cmp(b.0));

        for (name, data) in devices {
            self.emit(name, data, sink);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodesight_common::Sample;

    #[test]
    fn test_descriptor_names() {
        let probe = NetdevProbe::new(PatternSet::default());
        let names: Vec<_> = [
            &probe.receive_bytes,
            &probe.receive_packets,
            &probe.receive_errs,
            &probe.transmit_bytes,
            &probe.transmit_packets,
            &probe.transmit_errs,
        ]
        .iter()
        .map(|d| d.name().to_string())
        .collect();

        assert_eq!(
            names,
            vec![
                "node_network_receive_bytes_total",
                "node_network_receive_packets_total",
                "node_network_receive_errs_total",
                "node_network_transmit_bytes_total",
                "node_network_transmit_packets_total",
                "node_network_transmit_errs_total",
            ]
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_update_sorted_and_filtered() {
        let mut probe = NetdevProbe::new(PatternSet::new(&["lo"]).unwrap());
        let mut samples: Vec<Sample> = Vec::new();

        probe.update(&mut samples).unwrap();

        assert_eq!(samples.len() % 6, 0);
        let devices: Vec<_> = samples
            .iter()
            .step_by(6)
            .filter_map(|s| s.label("device"))
            .collect();
        let mut sorted = devices.clone();
        sorted.sort();
        assert_eq!(devices, sorted);
        assert!(!devices.contains(&"lo"));
    }
}
