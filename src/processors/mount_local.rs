//! Loop devices and local mounts.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::command::{CommandRunner, check_call, check_output};
use super::{AcquireError, ProcessorConfig, ReleaseReport, ReleaseStep};
use crate::util;

const MOUNT_DIR_PREFIX: &str = "casefile";

pub struct MountLocal<'a> {
    config: &'a ProcessorConfig,
    runner: &'a dyn CommandRunner,
}

impl<'a> MountLocal<'a> {
    pub fn new(config: &'a ProcessorConfig, runner: &'a dyn CommandRunner) -> Self {
        Self { config, runner }
    }

    /// Attaches `source` (image file or block device) to a free loop device
    /// with partition scanning, returning e.g. `/dev/loop0`.
    pub fn losetup_attach(&self, source: &Path) -> Result<PathBuf, AcquireError> {
        let spec = self
            .config
            .privileged(&self.config.losetup)
            .args(["--show", "--find", "-P"])
            .path_arg(source);
        let stdout = check_output(self.runner, &spec).map_err(|source_err| AcquireError::LoopSetup {
            path: source.to_path_buf(),
            source: source_err,
        })?;
        let device = String::from_utf8_lossy(&stdout).trim().to_string();
        if device.is_empty() {
            return Err(AcquireError::NoLoopDevice(source.to_path_buf()));
        }
        Ok(PathBuf::from(device))
    }

    /// Mounts `device` on a fresh directory under the mount root.
    ///
    /// The directory is removed again when the mount fails.
    pub fn mount_disk(&self, device: &Path) -> Result<PathBuf, AcquireError> {
        let mount_path = self.fresh_mount_dir()?;
        let spec = self
            .config
            .privileged(&self.config.mount)
            .path_arg(device)
            .path_arg(&mount_path);
        if let Err(err) = check_call(self.runner, &spec) {
            discard_mount_dir(&mount_path);
            return Err(AcquireError::Mount {
                device: device.to_path_buf(),
                target: mount_path,
                source: err,
            });
        }
        Ok(mount_path)
    }

    /// Mounts a container's filesystem out of a docker root directory.
    pub fn mount_container(&self, docker_root: &Path, container_id: &str) -> Result<PathBuf, AcquireError> {
        let mount_path = self.fresh_mount_dir()?;
        let spec = self
            .config
            .privileged(&self.config.docker_explorer)
            .arg("-r")
            .path_arg(docker_root)
            .arg("mount")
            .arg(container_id)
            .path_arg(&mount_path);
        if let Err(err) = check_call(self.runner, &spec) {
            discard_mount_dir(&mount_path);
            return Err(AcquireError::ContainerMount {
                container_id: container_id.to_string(),
                source: err,
            });
        }
        Ok(mount_path)
    }

    pub fn losetup_detach(&self, device: &Path, report: &mut ReleaseReport) {
        let spec = self
            .config
            .privileged(&self.config.losetup)
            .arg("-d")
            .path_arg(device);
        let outcome = check_call(self.runner, &spec).map_err(|err| err.to_string());
        report.record(ReleaseStep::DeleteLoopDevice, device, outcome);
    }

    /// Unmounts `mount_path` and removes the directory. The removal is
    /// attempted even when the unmount failed.
    pub fn unmount_path(&self, mount_path: &Path, report: &mut ReleaseReport) {
        let spec = self
            .config
            .privileged(&self.config.umount)
            .path_arg(mount_path);
        let outcome = check_call(self.runner, &spec).map_err(|err| err.to_string());
        report.record(ReleaseStep::Unmount, mount_path, outcome);

        info!("Removing mount path {}", mount_path.display());
        let outcome = std::fs::remove_dir(mount_path).map_err(|err| err.to_string());
        report.record(ReleaseStep::RemoveMountDir, mount_path, outcome);
    }

    fn fresh_mount_dir(&self) -> Result<PathBuf, AcquireError> {
        let root = &self.config.mount_dir_prefix;
        util::unique_dir(root, MOUNT_DIR_PREFIX).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotADirectory {
                AcquireError::MountRootNotDirectory(root.clone())
            } else {
                AcquireError::MountDir {
                    root: root.clone(),
                    source: err,
                }
            }
        })
    }
}

fn discard_mount_dir(mount_path: &Path) {
    if let Err(err) = std::fs::remove_dir(mount_path) {
        warn!("could not remove mount dir {}: {err}", mount_path.display());
    }
}

/// Node of partition `partition` on `loop_device`, falling back to the whole
/// loop device when no partition is requested or the node does not exist.
pub fn partition_device(loop_device: &Path, partition: Option<u32>) -> PathBuf {
    let Some(number) = partition else {
        return loop_device.to_path_buf();
    };
    let mut candidate = loop_device.as_os_str().to_os_string();
    candidate.push(format!("p{number}"));
    let candidate = PathBuf::from(candidate);
    if candidate.exists() {
        candidate
    } else {
        info!(
            "Could not find {}, trying {}",
            candidate.display(),
            loop_device.display()
        );
        loop_device.to_path_buf()
    }
}
