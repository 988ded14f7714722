//! # Processors Module
//!
//! Acquisition and release of the external resources evidence needs before
//! a task can read it: loop devices, partition mounts, attached cloud disks
//! and container filesystems.
//!
//! [`ResourceController::preprocess`] acquires in a fixed order and rolls
//! back whatever it already acquired when a later step fails.
//! [`ResourceController::postprocess`] releases in reverse order; each step
//! is best-effort and failures are collected in a [`ReleaseReport`].

pub mod command;
pub mod google_cloud;
pub mod mount_local;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::evidence::{BindState, Evidence, EvidenceType};
use crate::util;

use command::{CommandError, CommandRunner, CommandSpec};
use google_cloud::{CloudDiskId, CloudDiskProvider, CloudError};
use mount_local::{MountLocal, partition_device};

/// Explicit configuration of the controller.
///
/// `use_sudo` is the effective setting: callers resolve it against the
/// current uid before building this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    pub mount_dir_prefix: PathBuf,
    pub use_sudo: bool,
    pub losetup: String,
    pub mount: String,
    pub umount: String,
    pub docker_explorer: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            mount_dir_prefix: PathBuf::from("/mnt/casefile"),
            use_sudo: false,
            losetup: "losetup".to_string(),
            mount: "mount".to_string(),
            umount: "umount".to_string(),
            docker_explorer: "de.py".to_string(),
        }
    }
}

impl ProcessorConfig {
    pub fn privileged(&self, program: &str) -> CommandSpec {
        CommandSpec::privileged(program, self.use_sudo)
    }
}

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("{0} is already bound; postprocess it first")]
    AlreadyBound(String),
    #[error("{evidence} has no {field}")]
    MissingField {
        evidence: String,
        field: &'static str,
    },
    #[error("mount dir {0} exists, but is not a directory")]
    MountRootNotDirectory(PathBuf),
    #[error("could not create mount directory under {root}: {source}")]
    MountDir {
        root: PathBuf,
        source: std::io::Error,
    },
    #[error("could not set up loop device for {path}: {source}")]
    LoopSetup { path: PathBuf, source: CommandError },
    #[error("losetup returned no device for {0}")]
    NoLoopDevice(PathBuf),
    #[error("could not mount {device} on {target}: {source}")]
    Mount {
        device: PathBuf,
        target: PathBuf,
        source: CommandError,
    },
    #[error("could not attach cloud disk {disk}: {source}")]
    CloudAttach { disk: String, source: CloudError },
    #[error("could not mount container {container_id}: {source}")]
    ContainerMount {
        container_id: String,
        source: CommandError,
    },
    #[error("embedded path {0} escapes the disk mount")]
    InvalidEmbeddedPath(PathBuf),
    #[error("parent evidence: {0}")]
    Parent(Box<AcquireError>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStep {
    Unmount,
    RemoveMountDir,
    DeleteLoopDevice,
    DetachCloudDisk,
}

impl fmt::Display for ReleaseStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReleaseStep::Unmount => "unmount",
            ReleaseStep::RemoveMountDir => "remove mount dir",
            ReleaseStep::DeleteLoopDevice => "delete loop device",
            ReleaseStep::DetachCloudDisk => "detach cloud disk",
        })
    }
}

/// A release step that failed. Recorded, never raised.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{step} {}: {reason}", .target.display())]
pub struct ReleaseError {
    pub step: ReleaseStep,
    pub target: PathBuf,
    pub reason: String,
}

/// Every release step attempted by one postprocess, in order, with failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    attempted: Vec<(ReleaseStep, PathBuf)>,
    errors: Vec<ReleaseError>,
}

impl ReleaseReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ReleaseError] {
        &self.errors
    }

    pub fn attempted(&self) -> &[(ReleaseStep, PathBuf)] {
        &self.attempted
    }

    pub fn record(&mut self, step: ReleaseStep, target: &Path, outcome: Result<(), String>) {
        self.attempted.push((step, target.to_path_buf()));
        if let Err(reason) = outcome {
            let err = ReleaseError {
                step,
                target: target.to_path_buf(),
                reason,
            };
            warn!("release failed: {err}");
            self.errors.push(err);
        }
    }

    pub fn merge(&mut self, other: ReleaseReport) {
        self.attempted.extend(other.attempted);
        self.errors.extend(other.errors);
    }
}

/// Runs the preprocess/postprocess chains of every evidence variant.
#[derive(Clone)]
pub struct ResourceController {
    config: ProcessorConfig,
    runner: Arc<dyn CommandRunner>,
    cloud: Arc<dyn CloudDiskProvider>,
}

impl ResourceController {
    pub fn new(
        config: ProcessorConfig,
        runner: Arc<dyn CommandRunner>,
        cloud: Arc<dyn CloudDiskProvider>,
    ) -> Self {
        Self {
            config,
            runner,
            cloud,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    fn local(&self) -> MountLocal<'_> {
        MountLocal::new(&self.config, self.runner.as_ref())
    }

    /// Acquires what `evidence` needs to be readable and publishes its
    /// `local_path`. On error nothing stays acquired and `local_path` is
    /// left as it was.
    pub fn preprocess(&self, evidence: &mut Evidence) -> Result<(), AcquireError> {
        if evidence.bind_state() == BindState::Bound {
            return Err(AcquireError::AlreadyBound(evidence.to_string()));
        }
        debug!("Preprocessing {evidence}");
        match evidence.evidence_type() {
            EvidenceType::RawDisk | EvidenceType::EncryptedDisk => {
                let source = evidence
                    .disk_source()
                    .map(Path::to_path_buf)
                    .ok_or_else(|| missing(evidence, "path_to_disk"))?;
                let mount_path = self.disk_chain(evidence, &source)?;
                evidence.local_path = Some(mount_path);
            }
            EvidenceType::GoogleCloudDisk => {
                let mount_path = self.cloud_chain(evidence)?;
                evidence.local_path = Some(mount_path);
            }
            EvidenceType::GoogleCloudDiskRawEmbedded => {
                let embedded = evidence
                    .embedded_path()
                    .map(Path::to_path_buf)
                    .ok_or_else(|| missing(evidence, "embedded_path"))?;
                if util::join_inside(Path::new("/"), &embedded).is_none() {
                    return Err(AcquireError::InvalidEmbeddedPath(embedded));
                }
                let mount_path = self.cloud_chain(evidence)?;
                evidence.local_path = util::join_inside(&mount_path, &embedded);
            }
            EvidenceType::DockerContainer => self.container_chain(evidence)?,
            _ => {}
        }
        Ok(())
    }

    /// Releases everything `preprocess` acquired, in reverse order, and
    /// leaves `evidence` unbound whatever the outcome of each step.
    pub fn postprocess(&self, evidence: &mut Evidence) -> ReleaseReport {
        let mut report = ReleaseReport::default();
        debug!("Postprocessing {evidence}");
        match evidence.evidence_type() {
            EvidenceType::RawDisk | EvidenceType::EncryptedDisk => {
                self.release_disk(evidence, &mut report);
            }
            // The embedded image lives inside the cloud disk mount; releasing
            // the cloud disk releases it too.
            EvidenceType::GoogleCloudDisk | EvidenceType::GoogleCloudDiskRawEmbedded => {
                self.release_disk(evidence, &mut report);
                self.release_cloud(evidence, &mut report);
            }
            EvidenceType::DockerContainer => self.release_container(evidence, &mut report),
            _ => return report,
        }
        evidence.clear_resource_state();
        report
    }

    /// Preprocesses `evidence` and returns a guard that postprocesses it.
    pub fn acquire<'c, 'e>(&'c self, evidence: &'e mut Evidence) -> Result<Binding<'c, 'e>, AcquireError> {
        self.preprocess(evidence)?;
        Ok(Binding {
            controller: self,
            evidence,
            released: false,
        })
    }

    fn disk_chain(&self, evidence: &mut Evidence, source: &Path) -> Result<PathBuf, AcquireError> {
        let local = self.local();
        let loop_device = local.losetup_attach(source)?;
        let partition = evidence.disk().and_then(|disk| disk.mount_partition);
        let device = partition_device(&loop_device, partition);
        let mount_path = match local.mount_disk(&device) {
            Ok(path) => path,
            Err(err) => {
                let mut report = ReleaseReport::default();
                local.losetup_detach(&loop_device, &mut report);
                return Err(err);
            }
        };
        info!(
            "Mounted {} ({}) at {}",
            source.display(),
            device.display(),
            mount_path.display()
        );
        if let Some(disk) = evidence.disk_mut() {
            disk.loopdevice_path = Some(loop_device);
            disk.disk_mount_path = Some(mount_path.clone());
        }
        Ok(mount_path)
    }

    fn cloud_chain(&self, evidence: &mut Evidence) -> Result<PathBuf, AcquireError> {
        let id = evidence
            .cloud()
            .ok_or_else(|| missing(evidence, "cloud disk"))
            .and_then(|cloud| {
                CloudDiskId::from_disk(cloud).map_err(|source| AcquireError::CloudAttach {
                    disk: evidence.name.clone(),
                    source,
                })
            })?;
        let device = self
            .cloud
            .attach(&id)
            .map_err(|source| AcquireError::CloudAttach {
                disk: id.disk_name.clone(),
                source,
            })?;
        if let Some(cloud) = evidence.cloud_mut() {
            cloud.attached_device_path = Some(device.clone());
        }

        match self.disk_chain(evidence, &device) {
            Ok(mount_path) => Ok(mount_path),
            Err(err) => {
                let mut report = ReleaseReport::default();
                self.detach(&id, &device, &mut report);
                if let Some(cloud) = evidence.cloud_mut() {
                    cloud.attached_device_path = None;
                }
                Err(err)
            }
        }
    }

    fn container_chain(&self, evidence: &mut Evidence) -> Result<(), AcquireError> {
        let container_id = evidence
            .container_id()
            .map(str::to_string)
            .ok_or_else(|| missing(evidence, "container_id"))?;
        let mut parent = evidence
            .container_mut()
            .and_then(|container| container.parent.take())
            .ok_or_else(|| missing(evidence, "parent_evidence"))?;

        let outcome = self.mount_in_parent(&mut parent, &container_id);
        if let Some(container) = evidence.container_mut() {
            container.parent = Some(parent);
            if let Ok(mount_path) = &outcome {
                container.container_fs_path = Some(mount_path.clone());
            }
        }
        evidence.local_path = Some(outcome?);
        Ok(())
    }

    fn mount_in_parent(&self, parent: &mut Evidence, container_id: &str) -> Result<PathBuf, AcquireError> {
        self.preprocess(parent)
            .map_err(|err| AcquireError::Parent(Box::new(err)))?;
        let Some(root) = parent.mount_path().map(Path::to_path_buf) else {
            let err = missing(parent, "mount path");
            self.postprocess(parent);
            return Err(err);
        };
        let docker_root = root.join("var").join("lib").join("docker");
        match self.local().mount_container(&docker_root, container_id) {
            Ok(path) => Ok(path),
            Err(err) => {
                self.postprocess(parent);
                Err(err)
            }
        }
    }

    fn release_disk(&self, evidence: &Evidence, report: &mut ReleaseReport) {
        let Some(disk) = evidence.disk() else {
            return;
        };
        let local = self.local();
        if let Some(mount_path) = disk.disk_mount_path() {
            local.unmount_path(mount_path, report);
        }
        if let Some(loop_device) = disk.loopdevice_path() {
            local.losetup_detach(loop_device, report);
        }
    }

    fn release_cloud(&self, evidence: &Evidence, report: &mut ReleaseReport) {
        let Some(cloud) = evidence.cloud() else {
            return;
        };
        let Some(device) = cloud.attached_device_path() else {
            return;
        };
        match CloudDiskId::from_disk(cloud) {
            Ok(id) => self.detach(&id, device, report),
            Err(err) => report.record(ReleaseStep::DetachCloudDisk, device, Err(err.to_string())),
        }
    }

    fn release_container(&self, evidence: &mut Evidence, report: &mut ReleaseReport) {
        let fs_path = evidence
            .container()
            .and_then(|container| container.container_fs_path().map(Path::to_path_buf));
        if let Some(mount_path) = fs_path {
            self.local().unmount_path(&mount_path, report);
        }
        if let Some(parent) = evidence
            .container_mut()
            .and_then(|container| container.parent.as_deref_mut())
        {
            report.merge(self.postprocess(parent));
        }
    }

    fn detach(&self, id: &CloudDiskId, device: &Path, report: &mut ReleaseReport) {
        let outcome = self.cloud.detach(id, device).map_err(|err| err.to_string());
        report.record(ReleaseStep::DetachCloudDisk, device, outcome);
    }
}

fn missing(evidence: &Evidence, field: &'static str) -> AcquireError {
    AcquireError::MissingField {
        evidence: evidence.to_string(),
        field,
    }
}

/// Scope guard over a preprocessed evidence.
///
/// [`Binding::release`] postprocesses and hands back the report. Dropping an
/// unreleased binding still postprocesses, with a warning.
pub struct Binding<'c, 'e> {
    controller: &'c ResourceController,
    evidence: &'e mut Evidence,
    released: bool,
}

impl Binding<'_, '_> {
    pub fn evidence(&self) -> &Evidence {
        self.evidence
    }

    pub fn evidence_mut(&mut self) -> &mut Evidence {
        self.evidence
    }

    pub fn release(mut self) -> ReleaseReport {
        self.released = true;
        self.controller.postprocess(self.evidence)
    }
}

impl Drop for Binding<'_, '_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!("{} dropped while bound; releasing", self.evidence);
        let report = self.controller.postprocess(self.evidence);
        if !report.is_clean() {
            warn!(
                "{} release of dropped binding left {} errors",
                self.evidence,
                report.errors().len()
            );
        }
    }
}
