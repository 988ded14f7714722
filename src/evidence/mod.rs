//! # Evidence Module
//!
//! Typed descriptions of (and handles to) forensic inputs and outputs.
//!
//! Every piece of evidence shares the same base attributes (name, request
//! id, tags, request-scoped config, ...) and carries a variant-specific
//! [`EvidenceKind`]. Variants that need external resources before they can be
//! read (disk images, cloud disks, container filesystems) embed the shared
//! [`DiskMount`], [`CloudDisk`] or [`ContainerMount`] capabilities, which the
//! [`crate::processors::ResourceController`] fills in during preprocess and
//! clears during postprocess.

pub mod codec;
pub mod registry;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::{Map, Value};
use thiserror::Error;

pub use codec::{DecodeError, EncodeError};
pub use registry::{EvidenceRegistry, RegistryError};

#[derive(Debug, Error)]
#[error("unknown evidence type: {0}")]
pub struct UnknownEvidenceType(pub String);

/// Variant tag of an evidence object. The string form is the wire `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EvidenceType {
    Directory,
    RawDisk,
    EncryptedDisk,
    GoogleCloudDisk,
    GoogleCloudDiskRawEmbedded,
    PlasoFile,
    PlasoCsvFile,
    ReportText,
    TextFile,
    FilteredTextFile,
    ExportedFileArtifact,
    DockerContainer,
}

impl EvidenceType {
    pub const ALL: [EvidenceType; 12] = [
        EvidenceType::Directory,
        EvidenceType::RawDisk,
        EvidenceType::EncryptedDisk,
        EvidenceType::GoogleCloudDisk,
        EvidenceType::GoogleCloudDiskRawEmbedded,
        EvidenceType::PlasoFile,
        EvidenceType::PlasoCsvFile,
        EvidenceType::ReportText,
        EvidenceType::TextFile,
        EvidenceType::FilteredTextFile,
        EvidenceType::ExportedFileArtifact,
        EvidenceType::DockerContainer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EvidenceType::Directory => "Directory",
            EvidenceType::RawDisk => "RawDisk",
            EvidenceType::EncryptedDisk => "EncryptedDisk",
            EvidenceType::GoogleCloudDisk => "GoogleCloudDisk",
            EvidenceType::GoogleCloudDiskRawEmbedded => "GoogleCloudDiskRawEmbedded",
            EvidenceType::PlasoFile => "PlasoFile",
            EvidenceType::PlasoCsvFile => "PlasoCsvFile",
            EvidenceType::ReportText => "ReportText",
            EvidenceType::TextFile => "TextFile",
            EvidenceType::FilteredTextFile => "FilteredTextFile",
            EvidenceType::ExportedFileArtifact => "ExportedFileArtifact",
            EvidenceType::DockerContainer => "DockerContainer",
        }
    }
}

impl fmt::Display for EvidenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvidenceType {
    type Err = UnknownEvidenceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EvidenceType::ALL
            .into_iter()
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| UnknownEvidenceType(s.to_string()))
    }
}

/// Loop device and partition mount shared by the disk family.
///
/// `loopdevice_path` and `disk_mount_path` are working fields: they are only
/// set while the owning evidence is bound.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiskMount {
    pub mount_partition: Option<u32>,
    pub path_to_disk: Option<PathBuf>,
    pub size: Option<u64>,
    pub(crate) loopdevice_path: Option<PathBuf>,
    pub(crate) disk_mount_path: Option<PathBuf>,
}

impl DiskMount {
    pub fn loopdevice_path(&self) -> Option<&Path> {
        self.loopdevice_path.as_deref()
    }

    pub fn disk_mount_path(&self) -> Option<&Path> {
        self.disk_mount_path.as_deref()
    }

    fn is_bound(&self) -> bool {
        self.loopdevice_path.is_some() || self.disk_mount_path.is_some()
    }

    fn clear(&mut self) {
        self.loopdevice_path = None;
        self.disk_mount_path = None;
    }
}

/// Cloud disk coordinates plus the local device it is attached as.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloudDisk {
    pub project: Option<String>,
    pub zone: Option<String>,
    pub disk_name: Option<String>,
    pub(crate) attached_device_path: Option<PathBuf>,
}

impl CloudDisk {
    pub fn attached_device_path(&self) -> Option<&Path> {
        self.attached_device_path.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Encryption {
    pub encryption_type: Option<String>,
    pub encryption_key: Option<String>,
    pub unencrypted_path: Option<PathBuf>,
}

/// A container filesystem living inside another (parent) evidence.
///
/// The parent is kept as an unbound snapshot; it is preprocessed again
/// whenever the container itself is preprocessed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerMount {
    pub container_id: Option<String>,
    pub(crate) parent: Option<Box<Evidence>>,
    pub(crate) container_fs_path: Option<PathBuf>,
}

impl ContainerMount {
    pub fn parent(&self) -> Option<&Evidence> {
        self.parent.as_deref()
    }

    pub fn container_fs_path(&self) -> Option<&Path> {
        self.container_fs_path.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EvidenceKind {
    Directory,
    RawDisk(DiskMount),
    EncryptedDisk {
        disk: DiskMount,
        encryption: Encryption,
    },
    GoogleCloudDisk {
        disk: DiskMount,
        cloud: CloudDisk,
    },
    GoogleCloudDiskRawEmbedded {
        disk: DiskMount,
        cloud: CloudDisk,
        embedded_path: Option<PathBuf>,
    },
    PlasoFile {
        plaso_version: Option<String>,
    },
    PlasoCsvFile {
        plaso_version: Option<String>,
    },
    ReportText {
        text_data: Option<String>,
    },
    TextFile,
    FilteredTextFile,
    ExportedFileArtifact {
        artifact_name: Option<String>,
    },
    DockerContainer(ContainerMount),
}

impl EvidenceKind {
    pub fn new(ty: EvidenceType) -> Self {
        match ty {
            EvidenceType::Directory => EvidenceKind::Directory,
            EvidenceType::RawDisk => EvidenceKind::RawDisk(DiskMount::default()),
            EvidenceType::EncryptedDisk => EvidenceKind::EncryptedDisk {
                disk: DiskMount::default(),
                encryption: Encryption::default(),
            },
            EvidenceType::GoogleCloudDisk => EvidenceKind::GoogleCloudDisk {
                disk: DiskMount::default(),
                cloud: CloudDisk::default(),
            },
            EvidenceType::GoogleCloudDiskRawEmbedded => EvidenceKind::GoogleCloudDiskRawEmbedded {
                disk: DiskMount::default(),
                cloud: CloudDisk::default(),
                embedded_path: None,
            },
            EvidenceType::PlasoFile => EvidenceKind::PlasoFile { plaso_version: None },
            EvidenceType::PlasoCsvFile => EvidenceKind::PlasoCsvFile { plaso_version: None },
            EvidenceType::ReportText => EvidenceKind::ReportText { text_data: None },
            EvidenceType::TextFile => EvidenceKind::TextFile,
            EvidenceType::FilteredTextFile => EvidenceKind::FilteredTextFile,
            EvidenceType::ExportedFileArtifact => {
                EvidenceKind::ExportedFileArtifact { artifact_name: None }
            }
            EvidenceType::DockerContainer => EvidenceKind::DockerContainer(ContainerMount::default()),
        }
    }

    pub fn evidence_type(&self) -> EvidenceType {
        match self {
            EvidenceKind::Directory => EvidenceType::Directory,
            EvidenceKind::RawDisk(_) => EvidenceType::RawDisk,
            EvidenceKind::EncryptedDisk { .. } => EvidenceType::EncryptedDisk,
            EvidenceKind::GoogleCloudDisk { .. } => EvidenceType::GoogleCloudDisk,
            EvidenceKind::GoogleCloudDiskRawEmbedded { .. } => {
                EvidenceType::GoogleCloudDiskRawEmbedded
            }
            EvidenceKind::PlasoFile { .. } => EvidenceType::PlasoFile,
            EvidenceKind::PlasoCsvFile { .. } => EvidenceType::PlasoCsvFile,
            EvidenceKind::ReportText { .. } => EvidenceType::ReportText,
            EvidenceKind::TextFile => EvidenceType::TextFile,
            EvidenceKind::FilteredTextFile => EvidenceType::FilteredTextFile,
            EvidenceKind::ExportedFileArtifact { .. } => EvidenceType::ExportedFileArtifact,
            EvidenceKind::DockerContainer(_) => EvidenceType::DockerContainer,
        }
    }

    /// Whether this variant may be persisted to secondary storage.
    pub fn copyable(&self) -> bool {
        matches!(
            self,
            EvidenceKind::PlasoFile { .. }
                | EvidenceKind::PlasoCsvFile { .. }
                | EvidenceKind::ReportText { .. }
                | EvidenceKind::TextFile
                | EvidenceKind::FilteredTextFile
                | EvidenceKind::ExportedFileArtifact { .. }
        )
    }

    /// Whether this variant can only be preprocessed on a cloud worker.
    pub fn cloud_only(&self) -> bool {
        matches!(
            self,
            EvidenceKind::GoogleCloudDisk { .. } | EvidenceKind::GoogleCloudDiskRawEmbedded { .. }
        )
    }

    /// Whether preprocess/postprocess acquire and release anything.
    pub fn has_lifecycle(&self) -> bool {
        self.disk().is_some() || matches!(self, EvidenceKind::DockerContainer(_))
    }

    pub fn disk(&self) -> Option<&DiskMount> {
        match self {
            EvidenceKind::RawDisk(disk)
            | EvidenceKind::EncryptedDisk { disk, .. }
            | EvidenceKind::GoogleCloudDisk { disk, .. }
            | EvidenceKind::GoogleCloudDiskRawEmbedded { disk, .. } => Some(disk),
            _ => None,
        }
    }

    pub fn disk_mut(&mut self) -> Option<&mut DiskMount> {
        match self {
            EvidenceKind::RawDisk(disk)
            | EvidenceKind::EncryptedDisk { disk, .. }
            | EvidenceKind::GoogleCloudDisk { disk, .. }
            | EvidenceKind::GoogleCloudDiskRawEmbedded { disk, .. } => Some(disk),
            _ => None,
        }
    }

    pub fn cloud(&self) -> Option<&CloudDisk> {
        match self {
            EvidenceKind::GoogleCloudDisk { cloud, .. }
            | EvidenceKind::GoogleCloudDiskRawEmbedded { cloud, .. } => Some(cloud),
            _ => None,
        }
    }

    pub fn cloud_mut(&mut self) -> Option<&mut CloudDisk> {
        match self {
            EvidenceKind::GoogleCloudDisk { cloud, .. }
            | EvidenceKind::GoogleCloudDiskRawEmbedded { cloud, .. } => Some(cloud),
            _ => None,
        }
    }

    pub fn container(&self) -> Option<&ContainerMount> {
        match self {
            EvidenceKind::DockerContainer(container) => Some(container),
            _ => None,
        }
    }

    fn is_bound(&self) -> bool {
        let disk_bound = self.disk().is_some_and(DiskMount::is_bound);
        let cloud_bound = self
            .cloud()
            .is_some_and(|cloud| cloud.attached_device_path.is_some());
        let container_bound = self
            .container()
            .is_some_and(|container| container.container_fs_path.is_some());
        disk_bound || cloud_bound || container_bound
    }

    fn clear_resources(&mut self) {
        if let Some(disk) = self.disk_mut() {
            disk.clear();
        }
        if let Some(cloud) = self.cloud_mut() {
            cloud.attached_device_path = None;
        }
        if let EvidenceKind::DockerContainer(container) = self {
            container.container_fs_path = None;
            if let Some(parent) = container.parent.as_deref_mut() {
                parent.clear_resource_state();
            }
        }
    }
}

/// Whether an evidence currently holds acquired resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindState {
    Unbound,
    Bound,
}

/// A piece of evidence: base attributes plus its variant.
///
/// `type`, `copyable` and `cloud_only` are derived from the variant and can
/// not drift from it. Keys that a decoded envelope carried but no variant
/// recognises are kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq)]
pub struct Evidence {
    pub name: String,
    pub description: Option<String>,
    pub source: Option<String>,
    pub local_path: Option<PathBuf>,
    pub tags: Map<String, Value>,
    pub request_id: Option<String>,
    pub saved_path: Option<String>,
    pub saved_path_type: Option<String>,
    pub config: Map<String, Value>,
    pub(crate) processed_by: Vec<String>,
    pub(crate) kind: EvidenceKind,
    pub extra: Map<String, Value>,
}

impl Evidence {
    /// Prototype instance of a variant, with only the defaults set.
    pub fn new(ty: EvidenceType) -> Self {
        Self {
            name: ty.as_str().to_string(),
            description: None,
            source: None,
            local_path: None,
            tags: Map::new(),
            request_id: None,
            saved_path: None,
            saved_path_type: None,
            config: Map::new(),
            processed_by: Vec::new(),
            kind: EvidenceKind::new(ty),
            extra: Map::new(),
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        let mut evidence = Self::new(EvidenceType::Directory);
        evidence.local_path = Some(path.into());
        evidence
    }

    pub fn raw_disk(path_to_disk: impl Into<PathBuf>, mount_partition: Option<u32>) -> Self {
        let mut evidence = Self::new(EvidenceType::RawDisk);
        if let Some(disk) = evidence.kind.disk_mut() {
            disk.path_to_disk = Some(path_to_disk.into());
            disk.mount_partition = mount_partition;
        }
        evidence
    }

    pub fn encrypted_disk(
        path_to_disk: impl Into<PathBuf>,
        encryption_type: impl Into<String>,
        encryption_key: Option<String>,
    ) -> Self {
        let disk = DiskMount {
            path_to_disk: Some(path_to_disk.into()),
            ..DiskMount::default()
        };
        let encryption = Encryption {
            encryption_type: Some(encryption_type.into()),
            encryption_key,
            unencrypted_path: None,
        };
        Self::with_kind(EvidenceKind::EncryptedDisk { disk, encryption })
    }

    pub fn google_cloud_disk(
        project: impl Into<String>,
        zone: impl Into<String>,
        disk_name: impl Into<String>,
    ) -> Self {
        Self::with_kind(EvidenceKind::GoogleCloudDisk {
            disk: DiskMount::default(),
            cloud: CloudDisk {
                project: Some(project.into()),
                zone: Some(zone.into()),
                disk_name: Some(disk_name.into()),
                attached_device_path: None,
            },
        })
    }

    pub fn google_cloud_disk_raw_embedded(
        project: impl Into<String>,
        zone: impl Into<String>,
        disk_name: impl Into<String>,
        embedded_path: impl Into<PathBuf>,
    ) -> Self {
        Self::with_kind(EvidenceKind::GoogleCloudDiskRawEmbedded {
            disk: DiskMount::default(),
            cloud: CloudDisk {
                project: Some(project.into()),
                zone: Some(zone.into()),
                disk_name: Some(disk_name.into()),
                attached_device_path: None,
            },
            embedded_path: Some(embedded_path.into()),
        })
    }

    pub fn plaso_file(path: impl Into<PathBuf>, plaso_version: Option<String>) -> Self {
        let mut evidence = Self::with_kind(EvidenceKind::PlasoFile { plaso_version });
        evidence.local_path = Some(path.into());
        evidence
    }

    pub fn text_file(path: impl Into<PathBuf>) -> Self {
        let mut evidence = Self::new(EvidenceType::TextFile);
        evidence.local_path = Some(path.into());
        evidence
    }

    pub fn report_text(path: impl Into<PathBuf>, text_data: impl Into<String>) -> Self {
        let mut evidence = Self::with_kind(EvidenceKind::ReportText {
            text_data: Some(text_data.into()),
        });
        evidence.local_path = Some(path.into());
        evidence
    }

    pub fn exported_file_artifact(
        artifact_name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        let mut evidence = Self::with_kind(EvidenceKind::ExportedFileArtifact {
            artifact_name: Some(artifact_name.into()),
        });
        evidence.local_path = Some(path.into());
        evidence
    }

    pub fn docker_container(container_id: impl Into<String>) -> Self {
        Self::with_kind(EvidenceKind::DockerContainer(ContainerMount {
            container_id: Some(container_id.into()),
            ..ContainerMount::default()
        }))
    }

    fn with_kind(kind: EvidenceKind) -> Self {
        let mut evidence = Self::new(kind.evidence_type());
        evidence.kind = kind;
        evidence
    }

    pub fn evidence_type(&self) -> EvidenceType {
        self.kind.evidence_type()
    }

    /// The wire `type` tag.
    pub fn type_name(&self) -> &'static str {
        self.kind.evidence_type().as_str()
    }

    pub fn kind(&self) -> &EvidenceKind {
        &self.kind
    }

    pub fn copyable(&self) -> bool {
        self.kind.copyable()
    }

    pub fn cloud_only(&self) -> bool {
        self.kind.cloud_only()
    }

    pub fn disk(&self) -> Option<&DiskMount> {
        self.kind.disk()
    }

    pub fn disk_mut(&mut self) -> Option<&mut DiskMount> {
        self.kind.disk_mut()
    }

    pub fn cloud(&self) -> Option<&CloudDisk> {
        self.kind.cloud()
    }

    pub fn cloud_mut(&mut self) -> Option<&mut CloudDisk> {
        self.kind.cloud_mut()
    }

    pub fn encryption_mut(&mut self) -> Option<&mut Encryption> {
        match &mut self.kind {
            EvidenceKind::EncryptedDisk { encryption, .. } => Some(encryption),
            _ => None,
        }
    }

    pub fn container(&self) -> Option<&ContainerMount> {
        self.kind.container()
    }

    pub(crate) fn container_mut(&mut self) -> Option<&mut ContainerMount> {
        match &mut self.kind {
            EvidenceKind::DockerContainer(container) => Some(container),
            _ => None,
        }
    }

    pub fn embedded_path(&self) -> Option<&Path> {
        match &self.kind {
            EvidenceKind::GoogleCloudDiskRawEmbedded { embedded_path, .. } => {
                embedded_path.as_deref()
            }
            _ => None,
        }
    }

    /// Image the disk chain attaches: the decrypted copy when one exists.
    pub fn disk_source(&self) -> Option<&Path> {
        match &self.kind {
            EvidenceKind::EncryptedDisk { disk, encryption } => encryption
                .unencrypted_path
                .as_deref()
                .or(disk.path_to_disk.as_deref()),
            kind => kind.disk().and_then(|disk| disk.path_to_disk.as_deref()),
        }
    }

    pub fn container_id(&self) -> Option<&str> {
        self.container()
            .and_then(|container| container.container_id.as_deref())
    }

    pub fn artifact_name(&self) -> Option<&str> {
        match &self.kind {
            EvidenceKind::ExportedFileArtifact { artifact_name } => artifact_name.as_deref(),
            _ => None,
        }
    }

    pub fn text_data(&self) -> Option<&str> {
        match &self.kind {
            EvidenceKind::ReportText { text_data } => text_data.as_deref(),
            _ => None,
        }
    }

    /// Append-only audit trail of the jobs that claimed this evidence.
    pub fn processed_by(&self) -> &[String] {
        &self.processed_by
    }

    pub fn mark_processed_by(&mut self, job_name: impl Into<String>) {
        self.processed_by.push(job_name.into());
    }

    pub fn bind_state(&self) -> BindState {
        if self.kind.is_bound() {
            BindState::Bound
        } else {
            BindState::Unbound
        }
    }

    /// True once a filesystem from this evidence is mounted locally.
    pub fn is_mounted(&self) -> bool {
        self.mount_path().is_some()
    }

    /// Root of the mounted filesystem, if any.
    pub fn mount_path(&self) -> Option<&Path> {
        match &self.kind {
            EvidenceKind::DockerContainer(container) => container.container_fs_path.as_deref(),
            kind => kind.disk().and_then(DiskMount::disk_mount_path),
        }
    }

    /// Raw block device (or image) backing this evidence.
    ///
    /// For a bound disk this is the loop device; otherwise the attached cloud
    /// device or the image path. Embedded raw images resolve to the image file
    /// inside the mounted cloud disk.
    pub fn device_path(&self) -> Option<&Path> {
        match &self.kind {
            EvidenceKind::GoogleCloudDiskRawEmbedded { .. } if self.is_mounted() => {
                self.local_path.as_deref()
            }
            EvidenceKind::EncryptedDisk { disk, encryption } => disk
                .loopdevice_path()
                .or(encryption.unencrypted_path.as_deref())
                .or(disk.path_to_disk.as_deref()),
            kind => match kind.disk() {
                Some(disk) => disk
                    .loopdevice_path()
                    .or_else(|| kind.cloud().and_then(CloudDisk::attached_device_path))
                    .or(disk.path_to_disk.as_deref()),
                None => self.local_path.as_deref(),
            },
        }
    }

    /// Copies the context needed to pre/postprocess `target` like `self`.
    ///
    /// Disk variants transfer their disk fields (and cloud coordinates when
    /// both sides are cloud disks). A container target records an unbound
    /// snapshot of `self` as its parent. Base fields are never touched.
    /// Returns false when the two variants share nothing.
    pub fn copy_context(&self, target: &mut Evidence) -> bool {
        if let EvidenceKind::DockerContainer(container) = &mut target.kind {
            container.parent = Some(Box::new(self.unbound_snapshot()));
            return true;
        }

        let mut copied = false;
        if let (Some(source), Some(dest)) = (self.kind.disk(), target.kind.disk_mut()) {
            *dest = source.clone();
            copied = true;
        }
        if let (Some(source), Some(dest)) = (self.kind.cloud(), target.kind.cloud_mut()) {
            *dest = source.clone();
            copied = true;
        }
        copied
    }

    /// Clone of this evidence with every acquired resource forgotten.
    pub fn unbound_snapshot(&self) -> Evidence {
        let mut snapshot = self.clone();
        snapshot.clear_resource_state();
        snapshot
    }

    pub(crate) fn clear_resource_state(&mut self) {
        if self.kind.has_lifecycle() {
            self.local_path = None;
        }
        self.kind.clear_resources();
    }
}

impl fmt::Display for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.local_path {
            Some(path) => write!(f, "{}:{}:{}", self.type_name(), self.name, path.display()),
            None => write!(f, "{}:{}:None", self.type_name(), self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_parse_back() {
        for ty in EvidenceType::ALL {
            assert_eq!(ty.as_str().parse::<EvidenceType>().expect("parse"), ty);
        }
        assert!("rawdisk".parse::<EvidenceType>().is_err());
    }

    #[test]
    fn defaults_follow_variant() {
        let disk = Evidence::new(EvidenceType::RawDisk);
        assert_eq!(disk.name, "RawDisk");
        assert!(!disk.copyable());
        assert!(!disk.cloud_only());
        assert_eq!(disk.bind_state(), BindState::Unbound);

        let gcd = Evidence::google_cloud_disk("p", "z", "d1");
        assert!(gcd.cloud_only());
        assert_eq!(gcd.type_name(), "GoogleCloudDisk");

        let text = Evidence::text_file("/tmp/out.ascii");
        assert!(text.copyable());
        assert!(!text.kind().has_lifecycle());
    }

    #[test]
    fn copy_context_transfers_disk_fields_only() {
        let mut source = Evidence::raw_disk("/images/disk.raw", Some(2));
        source.description = Some("source".to_string());
        if let Some(disk) = source.disk_mut() {
            disk.size = Some(4096);
            disk.loopdevice_path = Some(PathBuf::from("/dev/loop3"));
            disk.disk_mount_path = Some(PathBuf::from("/mnt/casefile/x"));
        }

        let mut target = Evidence::new(EvidenceType::EncryptedDisk);
        assert!(source.copy_context(&mut target));
        let disk = target.disk().expect("disk");
        assert_eq!(disk.mount_partition, Some(2));
        assert_eq!(disk.size, Some(4096));
        assert_eq!(disk.loopdevice_path(), Some(Path::new("/dev/loop3")));
        assert_eq!(target.description, None);
    }

    #[test]
    fn copy_context_between_cloud_disks_keeps_coordinates() {
        let source = Evidence::google_cloud_disk("proj", "zone-a", "disk-1");
        let mut target = Evidence::new(EvidenceType::GoogleCloudDiskRawEmbedded);
        assert!(source.copy_context(&mut target));
        let cloud = target.cloud().expect("cloud");
        assert_eq!(cloud.disk_name.as_deref(), Some("disk-1"));
        assert_eq!(cloud.project.as_deref(), Some("proj"));
    }

    #[test]
    fn copy_context_into_container_stores_unbound_parent() {
        let mut source = Evidence::raw_disk("/images/disk.raw", Some(1));
        source.local_path = Some(PathBuf::from("/mnt/casefile/abc"));
        if let Some(disk) = source.disk_mut() {
            disk.loopdevice_path = Some(PathBuf::from("/dev/loop7"));
            disk.disk_mount_path = Some(PathBuf::from("/mnt/casefile/abc"));
        }

        let mut container = Evidence::docker_container("abc");
        assert!(source.copy_context(&mut container));
        let parent = container.container().and_then(ContainerMount::parent).expect("parent");
        assert_eq!(parent.bind_state(), BindState::Unbound);
        assert_eq!(parent.local_path, None);
        assert_eq!(
            parent.disk().and_then(|d| d.path_to_disk.as_deref()),
            Some(Path::new("/images/disk.raw"))
        );
    }

    #[test]
    fn copy_context_between_unrelated_variants_is_noop() {
        let source = Evidence::text_file("/tmp/a.txt");
        let mut target = Evidence::new(EvidenceType::RawDisk);
        assert!(!source.copy_context(&mut target));
        assert_eq!(target, Evidence::new(EvidenceType::RawDisk));
    }

    #[test]
    fn display_matches_type_name_path_triplet() {
        let evidence = Evidence::text_file("/tmp/a.txt");
        assert_eq!(evidence.to_string(), "TextFile:TextFile:/tmp/a.txt");
        let disk = Evidence::new(EvidenceType::RawDisk);
        assert_eq!(disk.to_string(), "RawDisk:RawDisk:None");
    }

    #[test]
    fn device_path_prefers_loop_device_when_bound() {
        let mut disk = Evidence::raw_disk("/images/disk.raw", None);
        assert_eq!(disk.device_path(), Some(Path::new("/images/disk.raw")));
        if let Some(mount) = disk.disk_mut() {
            mount.loopdevice_path = Some(PathBuf::from("/dev/loop4"));
        }
        assert_eq!(disk.device_path(), Some(Path::new("/dev/loop4")));
    }
}
