//! Filesystem capacity per mount point.

use std::sync::Arc;

use nodesight_common::{MetricDescriptor, NAMESPACE, Probe, ProbeError, SampleSink, build_fq_name};
use sysinfo::Disks;
use tracing::trace;

use crate::config::ProbesConfig;
use crate::filter::PatternSet;

const LABELS: [&str; 3] = ["device", "mountpoint", "fstype"];

/// Capacity of one mounted filesystem.
#[derive(Debug, Clone, PartialEq)]
pub struct MountStats {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
    pub total: u64,
    pub available: u64,
}

/// Exposes size, available and used bytes of mounted filesystems.
pub struct FilesystemProbe {
    disks: Disks,
    size: Arc<MetricDescriptor>,
    avail: Arc<MetricDescriptor>,
    used: Arc<MetricDescriptor>,
    ignored_mount_points: PatternSet,
    ignored_fs_types: PatternSet,
}

impl FilesystemProbe {
    pub fn new(ignored_mount_points: PatternSet, ignored_fs_types: PatternSet) -> Self {
        let desc = |name: &str, help: &str| {
            MetricDescriptor::gauge(build_fq_name(NAMESPACE, "filesystem", name), help, LABELS)
        };

        Self {
            disks: Disks::new_with_refreshed_list(),
            size: desc("size_bytes", "Filesystem size in bytes."),
            avail: desc("avail_bytes", "Filesystem space available to non-root users in bytes."),
            used: desc("used_bytes", "Filesystem space in use in bytes."),
            ignored_mount_points,
            ignored_fs_types,
        }
    }

    pub fn from_config(config: &ProbesConfig) -> Result<Box<dyn Probe>, ProbeError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(ProbeError::unsupported("sysinfo does not support this platform"));
        }

        let mount_points = PatternSet::new(&config.filesystem.ignored_mount_points)
            .map_err(|e| ProbeError::config(format!("filesystem.ignored_mount_points: {e}")))?;
        let fs_types = PatternSet::new(&config.filesystem.ignored_fs_types)
            .map_err(|e| ProbeError::config(format!("filesystem.ignored_fs_types: {e}")))?;

        Ok(Box::new(Self::new(mount_points, fs_types)))
    }

    fn is_ignored(&self, mount: &MountStats) -> bool {
        self.ignored_mount_points.matches(&mount.mount_point)
            || self.ignored_fs_types.matches(&mount.fs_type)
    }

    /// Currently mounted filesystems that pass the filters, sorted by mount point.
    fn mounts(&mut self) -> Vec<MountStats> {
        self.disks.refresh(true);

        let mut mounts: Vec<MountStats> = self
            .disks
            .list()
            .iter()
            .map(|disk| MountStats {
                device: disk.name().to_string_lossy().into_owned(),
                mount_point: disk.mount_point().to_string_lossy().into_owned(),
                fs_type: disk.file_system().to_string_lossy().into_owned(),
                total: disk.total_space(),
                available: disk.available_space(),
            })
            .filter(|mount| {
                let ignored = self.is_ignored(mount);
                if ignored {
                    trace!(mount_point = %mount.mount_point, fs_type = %mount.fs_type, "Ignoring filesystem");
                }
                !ignored
            })
            .collect();

        mounts.sort_by(|a, b| a.mount_point.cmp(&b.mount_point));
        mounts
    }

    fn emit(&self, mount: &MountStats, sink: &mut dyn SampleSink) {
        let labels = [
            mount.device.as_str(),
            mount.mount_point.as_str(),
            mount.fs_type.as_str(),
        ];
        let used = mount.total.saturating_sub(mount.available);

        sink.emit(self.size.observe(mount.total as f64, &labels));
        sink.emit(self.avail.observe(mount.available as f64, &labels));
        sink.emit(self.used.observe(used as f64, &labels));
    }
}

impl Probe for FilesystemProbe {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn update(&mut self, sink: &mut dyn SampleSink) -> Result<(), ProbeError> {
        for mount in self.mounts() {
            self.emit(&mount, sink);
        }
        Ok(())
    }
}
