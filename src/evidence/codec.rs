//! # Evidence Codec
//!
//! Converts evidence to and from the flat JSON envelope used to ship it
//! between workers: `{"type": "<VariantName>", ...all attributes...}`.
//!
//! Decoding is an explicit per-field overlay onto a prototype built by the
//! registry. Every known key is type-checked; keys no variant recognises are
//! kept in [`Evidence::extra`] and written back out on encode.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::evidence::registry::EvidenceRegistry;
use crate::evidence::{CloudDisk, DiskMount, Evidence, EvidenceKind};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("evidence envelope is not a mapping, got {0}")]
    NotAMapping(&'static str),
    #[error("evidence envelope has no type attribute")]
    MissingType,
    #[error("evidence type attribute must be a non-empty string, got {0}")]
    InvalidType(String),
    #[error("no evidence variant registered for type {0}")]
    UnknownType(String),
    #[error("invalid value for field {field} of {type_name}: {reason}")]
    InvalidField {
        type_name: String,
        field: String,
        reason: String,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("field {field} of {type_name} is not valid UTF-8: {path}")]
    NonUtf8Path {
        type_name: String,
        field: String,
        path: String,
    },
    #[error("extra attribute {field} of {type_name} shadows a known field")]
    ShadowedField { type_name: String, field: String },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Returns the full attribute set of `evidence`, private working fields
/// included.
pub fn encode(evidence: &Evidence) -> Result<Map<String, Value>, EncodeError> {
    let type_name = evidence.type_name();
    let mut out = Writer {
        type_name,
        map: Map::new(),
    };

    out.put("type", type_name)?;
    out.put("name", &evidence.name)?;
    out.put("description", &evidence.description)?;
    out.put("source", &evidence.source)?;
    out.put_path("local_path", evidence.local_path.as_deref())?;
    out.put("tags", &evidence.tags)?;
    out.put("request_id", &evidence.request_id)?;
    out.put("saved_path", &evidence.saved_path)?;
    out.put("saved_path_type", &evidence.saved_path_type)?;
    out.put("config", &evidence.config)?;
    out.put("processed_by", &evidence.processed_by)?;
    out.put("copyable", evidence.copyable())?;
    out.put("cloud_only", evidence.cloud_only())?;

    match &evidence.kind {
        EvidenceKind::Directory | EvidenceKind::TextFile | EvidenceKind::FilteredTextFile => {}
        EvidenceKind::RawDisk(disk) => out.put_disk(disk)?,
        EvidenceKind::EncryptedDisk { disk, encryption } => {
            out.put_disk(disk)?;
            out.put("encryption_type", &encryption.encryption_type)?;
            out.put("encryption_key", &encryption.encryption_key)?;
            out.put_path("unencrypted_path", encryption.unencrypted_path.as_deref())?;
        }
        EvidenceKind::GoogleCloudDisk { disk, cloud } => {
            out.put_disk(disk)?;
            out.put_cloud(cloud)?;
        }
        EvidenceKind::GoogleCloudDiskRawEmbedded {
            disk,
            cloud,
            embedded_path,
        } => {
            out.put_disk(disk)?;
            out.put_cloud(cloud)?;
            out.put_path("embedded_path", embedded_path.as_deref())?;
        }
        EvidenceKind::PlasoFile { plaso_version } | EvidenceKind::PlasoCsvFile { plaso_version } => {
            out.put("plaso_version", plaso_version)?;
        }
        EvidenceKind::ReportText { text_data } => out.put("text_data", text_data)?,
        EvidenceKind::ExportedFileArtifact { artifact_name } => {
            out.put("artifact_name", artifact_name)?;
        }
        EvidenceKind::DockerContainer(container) => {
            out.put("container_id", &container.container_id)?;
            let parent = match container.parent.as_deref() {
                Some(parent) => Value::Object(encode(parent)?),
                None => Value::Null,
            };
            out.map.insert("parent_evidence".to_string(), parent);
            out.put_path("_container_fs_path", container.container_fs_path.as_deref())?;
        }
    }

    let mut map = out.map;
    for (key, value) in &evidence.extra {
        if map.contains_key(key) {
            return Err(EncodeError::ShadowedField {
                type_name: type_name.to_string(),
                field: key.clone(),
            });
        }
        map.insert(key.clone(), value.clone());
    }
    Ok(map)
}

pub fn to_json(evidence: &Evidence) -> Result<String, EncodeError> {
    let map = encode(evidence)?;
    Ok(serde_json::to_string(&map)?)
}

/// Builds the registered variant named by `type` and overlays the envelope.
pub fn decode(registry: &EvidenceRegistry, envelope: &Value) -> Result<Evidence, DecodeError> {
    let map = match envelope {
        Value::Object(map) => map.clone(),
        other => return Err(DecodeError::NotAMapping(json_kind(other))),
    };

    let type_name = match map.get("type") {
        None | Some(Value::Null) => return Err(DecodeError::MissingType),
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        Some(other) => return Err(DecodeError::InvalidType(other.to_string())),
    };
    let constructor = registry
        .get(&type_name)
        .ok_or_else(|| DecodeError::UnknownType(type_name.clone()))?;

    let mut evidence = constructor();
    let mut fields = Fields {
        type_name: &type_name,
        map,
    };
    fields.map.remove("type");

    if let Some(name) = fields.take("name")? {
        evidence.name = name;
    }
    if let Some(description) = fields.take("description")? {
        evidence.description = Some(description);
    }
    if let Some(source) = fields.take("source")? {
        evidence.source = Some(source);
    }
    if let Some(local_path) = fields.take("local_path")? {
        evidence.local_path = Some(local_path);
    }
    if let Some(tags) = fields.take("tags")? {
        evidence.tags = tags;
    }
    if let Some(request_id) = fields.take("request_id")? {
        evidence.request_id = Some(request_id);
    }
    if let Some(saved_path) = fields.take("saved_path")? {
        evidence.saved_path = Some(saved_path);
    }
    if let Some(saved_path_type) = fields.take("saved_path_type")? {
        evidence.saved_path_type = Some(saved_path_type);
    }
    if let Some(config) = fields.take("config")? {
        evidence.config = config;
    }
    if let Some(processed_by) = fields.take("processed_by")? {
        evidence.processed_by = processed_by;
    }
    fields.expect_flag("copyable", evidence.copyable())?;
    fields.expect_flag("cloud_only", evidence.cloud_only())?;

    match &mut evidence.kind {
        EvidenceKind::Directory | EvidenceKind::TextFile | EvidenceKind::FilteredTextFile => {}
        EvidenceKind::RawDisk(disk) => fields.take_disk(disk)?,
        EvidenceKind::EncryptedDisk { disk, encryption } => {
            fields.take_disk(disk)?;
            if let Some(value) = fields.take("encryption_type")? {
                encryption.encryption_type = Some(value);
            }
            if let Some(value) = fields.take("encryption_key")? {
                encryption.encryption_key = Some(value);
            }
            if let Some(value) = fields.take::<PathBuf>("unencrypted_path")? {
                encryption.unencrypted_path = Some(value);
            }
        }
        EvidenceKind::GoogleCloudDisk { disk, cloud } => {
            fields.take_disk(disk)?;
            fields.take_cloud(cloud)?;
        }
        EvidenceKind::GoogleCloudDiskRawEmbedded {
            disk,
            cloud,
            embedded_path,
        } => {
            fields.take_disk(disk)?;
            fields.take_cloud(cloud)?;
            if let Some(value) = fields.take::<PathBuf>("embedded_path")? {
                *embedded_path = Some(value);
            }
        }
        EvidenceKind::PlasoFile { plaso_version } | EvidenceKind::PlasoCsvFile { plaso_version } => {
            if let Some(value) = fields.take("plaso_version")? {
                *plaso_version = Some(value);
            }
        }
        EvidenceKind::ReportText { text_data } => {
            if let Some(value) = fields.take("text_data")? {
                *text_data = Some(value);
            }
        }
        EvidenceKind::ExportedFileArtifact { artifact_name } => {
            if let Some(value) = fields.take("artifact_name")? {
                *artifact_name = Some(value);
            }
        }
        EvidenceKind::DockerContainer(container) => {
            if let Some(value) = fields.take("container_id")? {
                container.container_id = Some(value);
            }
            match fields.map.remove("parent_evidence") {
                None | Some(Value::Null) => {}
                Some(parent) => {
                    let parent = decode(registry, &parent).map_err(|err| fields.invalid(
                        "parent_evidence",
                        err.to_string(),
                    ))?;
                    container.parent = Some(Box::new(parent));
                }
            }
            if let Some(value) = fields.take::<PathBuf>("_container_fs_path")? {
                container.container_fs_path = Some(value);
            }
        }
    }

    evidence.extra = fields.map;
    Ok(evidence)
}

pub fn from_json(registry: &EvidenceRegistry, json: &str) -> Result<Evidence, DecodeError> {
    let value: Value = serde_json::from_str(json)?;
    decode(registry, &value)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

struct Writer<'a> {
    type_name: &'a str,
    map: Map<String, Value>,
}

impl Writer<'_> {
    fn put<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), EncodeError> {
        self.map.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    fn put_path(&mut self, key: &str, path: Option<&Path>) -> Result<(), EncodeError> {
        let value = match path {
            None => Value::Null,
            Some(path) => match path.to_str() {
                Some(text) => Value::String(text.to_string()),
                None => {
                    return Err(EncodeError::NonUtf8Path {
                        type_name: self.type_name.to_string(),
                        field: key.to_string(),
                        path: path.to_string_lossy().to_string(),
                    });
                }
            },
        };
        self.map.insert(key.to_string(), value);
        Ok(())
    }

    fn put_disk(&mut self, disk: &DiskMount) -> Result<(), EncodeError> {
        self.put("mount_partition", disk.mount_partition)?;
        self.put_path("path_to_disk", disk.path_to_disk.as_deref())?;
        self.put("size", disk.size)?;
        self.put_path("_loopdevice_path", disk.loopdevice_path.as_deref())?;
        self.put_path("_disk_mount_path", disk.disk_mount_path.as_deref())?;
        Ok(())
    }

    fn put_cloud(&mut self, cloud: &CloudDisk) -> Result<(), EncodeError> {
        self.put("project", &cloud.project)?;
        self.put("zone", &cloud.zone)?;
        self.put("disk_name", &cloud.disk_name)?;
        self.put_path("_attached_device_path", cloud.attached_device_path.as_deref())?;
        Ok(())
    }
}

struct Fields<'a> {
    type_name: &'a str,
    map: Map<String, Value>,
}

impl Fields<'_> {
    /// Removes `key`; absent and `null` both read as `None`.
    fn take<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>, DecodeError> {
        match self.map.remove(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|err| self.invalid(key, err.to_string())),
        }
    }

    /// `copyable`/`cloud_only` are fixed per variant; a contradicting
    /// envelope is rejected rather than silently re-typed.
    fn expect_flag(&mut self, key: &str, expected: bool) -> Result<(), DecodeError> {
        match self.take::<bool>(key)? {
            Some(found) if found != expected => Err(self.invalid(
                key,
                format!("{} is always {expected} for this type", key),
            )),
            _ => Ok(()),
        }
    }

    fn take_disk(&mut self, disk: &mut DiskMount) -> Result<(), DecodeError> {
        if let Some(value) = self.take("mount_partition")? {
            disk.mount_partition = Some(value);
        }
        if let Some(value) = self.take::<PathBuf>("path_to_disk")? {
            disk.path_to_disk = Some(value);
        }
        if let Some(value) = self.take("size")? {
            disk.size = Some(value);
        }
        if let Some(value) = self.take::<PathBuf>("_loopdevice_path")? {
            disk.loopdevice_path = Some(value);
        }
        if let Some(value) = self.take::<PathBuf>("_disk_mount_path")? {
            disk.disk_mount_path = Some(value);
        }
        Ok(())
    }

    fn take_cloud(&mut self, cloud: &mut CloudDisk) -> Result<(), DecodeError> {
        if let Some(value) = self.take("project")? {
            cloud.project = Some(value);
        }
        if let Some(value) = self.take("zone")? {
            cloud.zone = Some(value);
        }
        if let Some(value) = self.take("disk_name")? {
            cloud.disk_name = Some(value);
        }
        if let Some(value) = self.take::<PathBuf>("_attached_device_path")? {
            cloud.attached_device_path = Some(value);
        }
        Ok(())
    }

    fn invalid(&self, field: &str, reason: String) -> DecodeError {
        DecodeError::InvalidField {
            type_name: self.type_name.to_string(),
            field: field.to_string(),
            reason,
        }
    }
}
