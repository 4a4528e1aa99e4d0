//! Probe settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::filter::PatternSet;

/// Settings handed to every probe constructor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbesConfig {
    #[serde(default)]
    pub qdisc: QdiscConfig,

    #[serde(default)]
    pub diskstats: DiskstatsConfig,

    #[serde(default)]
    pub filesystem: FilesystemConfig,

    #[serde(default)]
    pub netdev: NetdevConfig,
}

impl ProbesConfig {
    /// Check that every filter pattern compiles.
    pub fn validate(&self) -> Result<(), String> {
        let lists = [
            ("diskstats.ignored_devices", &self.diskstats.ignored_devices),
            ("filesystem.ignored_mount_points", &self.filesystem.ignored_mount_points),
            ("filesystem.ignored_fs_types", &self.filesystem.ignored_fs_types),
            ("netdev.ignored_devices", &self.netdev.ignored_devices),
        ];

        for (field, patterns) in lists {
            PatternSet::new(patterns).map_err(|e| format!("invalid pattern in {field}: {e}"))?;
        }
        Ok(())
    }
}

/// Queueing-discipline probe settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QdiscConfig {
    /// Directory containing `results.json` to read instead of querying the kernel.
    #[serde(default)]
    pub fixtures: Option<PathBuf>,
}

/// Disk I/O probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskstatsConfig {
    /// Directory containing `diskstats.json` to read instead of `/proc/diskstats`.
    #[serde(default)]
    pub fixtures: Option<PathBuf>,

    /// Glob patterns of device names to skip.
    #[serde(default = "default_ignored_disks")]
    pub ignored_devices: Vec<String>,
}

fn default_ignored_disks() -> Vec<String> {
    ["ram*", "loop*", "fd*"].map(String::from).to_vec()
}

impl Default for DiskstatsConfig {
    fn default() -> Self {
        Self {
            fixtures: None,
            ignored_devices: default_ignored_disks(),
        }
    }
}

/// Filesystem probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemConfig {
    /// Glob patterns of mount points to skip.
    #[serde(default = "default_ignored_mount_points")]
    pub ignored_mount_points: Vec<String>,

    /// Glob patterns of filesystem types to skip.
    #[serde(default = "default_ignored_fs_types")]
    pub ignored_fs_types: Vec<String>,
}

fn default_ignored_mount_points() -> Vec<String> {
    ["/dev/*", "/proc/*", "/run/*", "/sys/*", "/var/lib/docker/*"]
        .map(String::from)
        .to_vec()
}

fn default_ignored_fs_types() -> Vec<String> {
    [
        "autofs",
        "binfmt_misc",
        "bpf",
        "cgroup*",
        "configfs",
        "debugfs",
        "devpts",
        "devtmpfs",
        "fusectl",
        "hugetlbfs",
        "mqueue",
        "nsfs",
        "overlay",
        "proc",
        "pstore",
        "securityfs",
        "squashfs",
        "sysfs",
        "tracefs",
    ]
    .map(String::from)
    .to_vec()
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            ignored_mount_points: default_ignored_mount_points(),
            ignored_fs_types: default_ignored_fs_types(),
        }
    }
}

/// Network device probe settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetdevConfig {
    /// Glob patterns of interface names to skip.
    #[serde(default)]
    pub ignored_devices: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProbesConfig::default();

        assert!(config.qdisc.fixtures.is_none());
        assert!(config.diskstats.ignored_devices.contains(&"loop*".to_string()));
        assert!(config.filesystem.ignored_fs_types.contains(&"sysfs".to_string()));
        assert!(config.netdev.ignored_devices.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ProbesConfig = serde_json::from_str(
            r#"{ "qdisc": { "fixtures": "/tmp/qdisc" }, "netdev": { "ignored_devices": ["lo"] } }"#,
        )
        .unwrap();

        assert_eq!(config.qdisc.fixtures, Some(PathBuf::from("/tmp/qdisc")));
        assert_eq!(config.netdev.ignored_devices, vec!["lo"]);
        assert_eq!(config.diskstats.ignored_devices, default_ignored_disks());
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let mut config = ProbesConfig::default();
        config.netdev.ignored_devices.push("[eth".to_string());

        let err = config.validate().unwrap_err();
        assert!(err.contains("netdev.ignored_devices"));
    }
}
