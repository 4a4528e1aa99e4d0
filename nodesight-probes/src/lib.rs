//! NodeSight probes
//!
//! Leaf probes and the static registration table used by the exporter:
//!
//! | Name         | Default  | Source                              |
//! |--------------|----------|-------------------------------------|
//! | `boottime`   | enabled  | sysinfo                             |
//! | `diskstats`  | enabled  | `/proc/diskstats` or fixture        |
//! | `filesystem` | enabled  | sysinfo                             |
//! | `loadavg`    | enabled  | sysinfo                             |
//! | `meminfo`    | enabled  | sysinfo                             |
//! | `netdev`     | enabled  | sysinfo                             |
//! | `qdisc`      | disabled | `tc -s -j qdisc show` or fixture    |
//! | `time`       | enabled  | system clock                        |

pub mod config;
pub mod diskstats;
pub mod filesystem;
pub mod filter;
pub mod netdev;
pub mod qdisc;
pub mod system;
pub mod time;

pub use config::{DiskstatsConfig, FilesystemConfig, NetdevConfig, ProbesConfig, QdiscConfig};
pub use filter::PatternSet;

use nodesight_common::{ProbeRegistration, Registry, RegistryError};

/// Every probe this crate provides, in name order.
pub fn registrations() -> Vec<ProbeRegistration<ProbesConfig>> {
    vec![
        ProbeRegistration::new("boottime", true, system::BoottimeProbe::from_config),
        ProbeRegistration::new("diskstats", true, diskstats::DiskstatsProbe::from_config),
        ProbeRegistration::new("filesystem", true, filesystem::FilesystemProbe::from_config),
        ProbeRegistration::new("loadavg", true, system::LoadavgProbe::from_config),
        ProbeRegistration::new("meminfo", true, system::MeminfoProbe::from_config),
        ProbeRegistration::new("netdev", true, netdev::NetdevProbe::from_config),
        ProbeRegistration::new("qdisc", false, qdisc::QdiscProbe::from_config),
        ProbeRegistration::new("time", true, time::TimeProbe::from_config),
    ]
}

/// Registry over [`registrations`].
pub fn registry() -> Result<Registry<ProbesConfig>, RegistryError> {
    Registry::new(registrations())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_names_and_defaults() {
        let registry = registry().unwrap();

        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec![
                "boottime",
                "diskstats",
                "filesystem",
                "loadavg",
                "meminfo",
                "netdev",
                "qdisc",
                "time"
            ]
        );
        assert_eq!(registry.is_default_enabled("qdisc"), Some(false));
        assert_eq!(registry.is_default_enabled("diskstats"), Some(true));
        assert_eq!(registry.is_default_enabled("time"), Some(true));
        assert_eq!(registry.is_default_enabled("nope"), None);
    }
}
