use std::collections::HashMap;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::evidence::codec::{self, DecodeError, EncodeError};
use crate::evidence::{Evidence, EvidenceType};

/// Builds a prototype instance of one evidence variant.
pub type Constructor = fn() -> Evidence;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("constructor registered as {type_name} builds {built} evidence")]
    TypeMismatch { type_name: String, built: String },
    #[error("evidence type {0} is already registered with a different constructor")]
    Conflict(String),
}

/// Maps the wire `type` tag to the constructor of its variant.
#[derive(Clone, Default)]
pub struct EvidenceRegistry {
    constructors: HashMap<String, Constructor>,
}

impl EvidenceRegistry {
    /// An empty registry; nothing decodes until variants are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in variant.
    pub fn with_builtin() -> Self {
        fn key(ty: EvidenceType) -> String {
            ty.as_str().to_string()
        }

        let mut constructors: HashMap<String, Constructor> = HashMap::new();
        constructors.insert(key(EvidenceType::Directory), || {
            Evidence::new(EvidenceType::Directory)
        });
        constructors.insert(key(EvidenceType::RawDisk), || Evidence::new(EvidenceType::RawDisk));
        constructors.insert(key(EvidenceType::EncryptedDisk), || {
            Evidence::new(EvidenceType::EncryptedDisk)
        });
        constructors.insert(key(EvidenceType::GoogleCloudDisk), || {
            Evidence::new(EvidenceType::GoogleCloudDisk)
        });
        constructors.insert(key(EvidenceType::GoogleCloudDiskRawEmbedded), || {
            Evidence::new(EvidenceType::GoogleCloudDiskRawEmbedded)
        });
        constructors.insert(key(EvidenceType::PlasoFile), || {
            Evidence::new(EvidenceType::PlasoFile)
        });
        constructors.insert(key(EvidenceType::PlasoCsvFile), || {
            Evidence::new(EvidenceType::PlasoCsvFile)
        });
        constructors.insert(key(EvidenceType::ReportText), || {
            Evidence::new(EvidenceType::ReportText)
        });
        constructors.insert(key(EvidenceType::TextFile), || {
            Evidence::new(EvidenceType::TextFile)
        });
        constructors.insert(key(EvidenceType::FilteredTextFile), || {
            Evidence::new(EvidenceType::FilteredTextFile)
        });
        constructors.insert(key(EvidenceType::ExportedFileArtifact), || {
            Evidence::new(EvidenceType::ExportedFileArtifact)
        });
        constructors.insert(key(EvidenceType::DockerContainer), || {
            Evidence::new(EvidenceType::DockerContainer)
        });

        Self { constructors }
    }

    /// Registers `constructor` under `type_name`.
    ///
    /// Registering the same variant twice is a no-op. A name whose
    /// constructor builds another variant, or builds a different prototype
    /// than the one already registered, is a configuration error.
    pub fn register(&mut self, type_name: &str, constructor: Constructor) -> Result<(), RegistryError> {
        let prototype = constructor();
        if prototype.type_name() != type_name {
            return Err(RegistryError::TypeMismatch {
                type_name: type_name.to_string(),
                built: prototype.type_name().to_string(),
            });
        }
        if let Some(existing) = self.constructors.get(type_name) {
            if existing() == prototype {
                return Ok(());
            }
            return Err(RegistryError::Conflict(type_name.to_string()));
        }
        self.constructors.insert(type_name.to_string(), constructor);
        Ok(())
    }

    pub fn get(&self, type_name: &str) -> Option<Constructor> {
        self.constructors.get(type_name).copied()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn decode(&self, envelope: &Value) -> Result<Evidence, DecodeError> {
        codec::decode(self, envelope)
    }

    pub fn decode_str(&self, json: &str) -> Result<Evidence, DecodeError> {
        codec::from_json(self, json)
    }

    pub fn encode(&self, evidence: &Evidence) -> Result<Map<String, Value>, EncodeError> {
        codec::encode(evidence)
    }
}

impl std::fmt::Debug for EvidenceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvidenceRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged_directory() -> Evidence {
        let mut evidence = Evidence::new(EvidenceType::Directory);
        evidence.description = Some("tagged".to_string());
        evidence
    }

    #[test]
    fn builtin_registry_knows_every_variant() {
        let registry = EvidenceRegistry::with_builtin();
        for ty in EvidenceType::ALL {
            let ctor = registry.get(ty.as_str()).expect("registered");
            assert_eq!(ctor().evidence_type(), ty);
        }
        assert_eq!(registry.type_names().len(), EvidenceType::ALL.len());
    }

    #[test]
    fn register_is_idempotent() {
        let mut registry = EvidenceRegistry::with_builtin();
        registry
            .register("RawDisk", || Evidence::new(EvidenceType::RawDisk))
            .expect("same constructor");
        assert!(registry.contains("RawDisk"));
    }

    #[test]
    fn register_rejects_conflicting_constructor() {
        let mut registry = EvidenceRegistry::with_builtin();
        let err = registry
            .register("Directory", tagged_directory)
            .expect_err("conflict");
        assert!(matches!(err, RegistryError::Conflict(name) if name == "Directory"));
    }

    #[test]
    fn register_rejects_mismatched_type_name() {
        let mut registry = EvidenceRegistry::new();
        let err = registry
            .register("TextFile", || Evidence::new(EvidenceType::RawDisk))
            .expect_err("mismatch");
        assert!(matches!(err, RegistryError::TypeMismatch { .. }));
    }

    #[test]
    fn empty_registry_decodes_nothing() {
        let registry = EvidenceRegistry::new();
        let err = registry
            .decode_str(r#"{"type": "RawDisk"}"#)
            .expect_err("unregistered");
        assert!(matches!(err, DecodeError::UnknownType(_)));
    }
}
