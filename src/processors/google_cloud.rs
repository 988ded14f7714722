//! Cloud disk attach/detach.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use super::command::{CommandError, CommandRunner, CommandSpec, check_call};
use crate::evidence::CloudDisk;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("cloud disk is missing {0}")]
    MissingCoordinate(&'static str),
    #[error("cloud disks are not available on this worker")]
    Unavailable,
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Fully qualified name of a cloud disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudDiskId {
    pub project: String,
    pub zone: String,
    pub disk_name: String,
}

impl CloudDiskId {
    pub fn from_disk(cloud: &CloudDisk) -> Result<Self, CloudError> {
        Ok(Self {
            project: cloud
                .project
                .clone()
                .ok_or(CloudError::MissingCoordinate("project"))?,
            zone: cloud.zone.clone().ok_or(CloudError::MissingCoordinate("zone"))?,
            disk_name: cloud
                .disk_name
                .clone()
                .ok_or(CloudError::MissingCoordinate("disk_name"))?,
        })
    }
}

pub trait CloudDiskProvider: Send + Sync {
    /// Attaches the disk to this instance and returns its local block device.
    fn attach(&self, disk: &CloudDiskId) -> Result<PathBuf, CloudError>;

    fn detach(&self, disk: &CloudDiskId, device: &Path) -> Result<(), CloudError>;
}

/// Provider for workers that are not running in a cloud context.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCloudDisks;

impl CloudDiskProvider for NoCloudDisks {
    fn attach(&self, _disk: &CloudDiskId) -> Result<PathBuf, CloudError> {
        Err(CloudError::Unavailable)
    }

    fn detach(&self, _disk: &CloudDiskId, _device: &Path) -> Result<(), CloudError> {
        Err(CloudError::Unavailable)
    }
}

/// Attaches disks to the current instance with the `gcloud` CLI.
///
/// The disk is attached under its own name as device name, so it shows up
/// as `/dev/disk/by-id/google-<disk_name>`.
pub struct GcloudDisks {
    runner: Arc<dyn CommandRunner>,
    gcloud: String,
    instance_name: String,
}

impl GcloudDisks {
    pub fn new(runner: Arc<dyn CommandRunner>, gcloud: impl Into<String>, instance_name: impl Into<String>) -> Self {
        Self {
            runner,
            gcloud: gcloud.into(),
            instance_name: instance_name.into(),
        }
    }

    fn instances(&self, verb: &str, disk: &CloudDiskId) -> CommandSpec {
        CommandSpec::new(self.gcloud.as_str())
            .args(["compute", "instances", verb])
            .arg(self.instance_name.as_str())
            .arg("--disk")
            .arg(disk.disk_name.as_str())
            .arg("--zone")
            .arg(disk.zone.as_str())
            .arg("--project")
            .arg(disk.project.as_str())
    }

    pub fn device_path(disk: &CloudDiskId) -> PathBuf {
        PathBuf::from(format!("/dev/disk/by-id/google-{}", disk.disk_name))
    }
}

impl CloudDiskProvider for GcloudDisks {
    fn attach(&self, disk: &CloudDiskId) -> Result<PathBuf, CloudError> {
        let spec = self
            .instances("attach-disk", disk)
            .arg("--device-name")
            .arg(disk.disk_name.as_str())
            .arg("--mode")
            .arg("ro");
        check_call(self.runner.as_ref(), &spec)?;
        let device = Self::device_path(disk);
        info!("Attached {} as {}", disk.disk_name, device.display());
        Ok(device)
    }

    fn detach(&self, disk: &CloudDiskId, device: &Path) -> Result<(), CloudError> {
        info!("Detaching {} ({})", disk.disk_name, device.display());
        check_call(self.runner.as_ref(), &self.instances("detach-disk", disk))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_id_requires_all_coordinates() {
        let cloud = CloudDisk {
            project: Some("p".to_string()),
            zone: None,
            disk_name: Some("d1".to_string()),
            ..CloudDisk::default()
        };
        let err = CloudDiskId::from_disk(&cloud).expect_err("zone missing");
        assert!(matches!(err, CloudError::MissingCoordinate("zone")));
    }

    #[test]
    fn device_path_uses_disk_name() {
        let id = CloudDiskId {
            project: "p".to_string(),
            zone: "z".to_string(),
            disk_name: "evidence-1".to_string(),
        };
        assert_eq!(
            GcloudDisks::device_path(&id),
            PathBuf::from("/dev/disk/by-id/google-evidence-1")
        );
    }

    #[test]
    fn no_cloud_refuses_attach() {
        let id = CloudDiskId {
            project: "p".to_string(),
            zone: "z".to_string(),
            disk_name: "d".to_string(),
        };
        assert!(matches!(NoCloudDisks.attach(&id), Err(CloudError::Unavailable)));
    }
}
