use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::processors::ProcessorConfig;
use crate::util;
use crate::workers::TaskTools;

/// Program paths of the external tools.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ToolsConfig {
    pub losetup: String,
    pub mount: String,
    pub umount: String,
    pub strings: String,
    pub docker_explorer: String,
    pub image_export: String,
    pub gcloud: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            losetup: "losetup".to_string(),
            mount: "mount".to_string(),
            umount: "umount".to_string(),
            strings: "strings".to_string(),
            docker_explorer: "de.py".to_string(),
            image_export: "image_export.py".to_string(),
            gcloud: "gcloud".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub mount_dir_prefix: PathBuf,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub use_sudo: bool,
    #[serde(default)]
    pub cloud_context: bool,
    #[serde(default)]
    pub instance_name: String,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
    #[serde(default)]
    pub disabled_jobs: Vec<String>,
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_max_rounds() -> usize {
    5
}

impl Config {
    /// `use_sudo` resolved against the current user.
    pub fn effective_sudo(&self) -> bool {
        util::needs_sudo(self.use_sudo)
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            mount_dir_prefix: self.mount_dir_prefix.clone(),
            use_sudo: self.effective_sudo(),
            losetup: self.tools.losetup.clone(),
            mount: self.tools.mount.clone(),
            umount: self.tools.umount.clone(),
            docker_explorer: self.tools.docker_explorer.clone(),
        }
    }

    pub fn task_tools(&self) -> TaskTools {
        TaskTools {
            strings: self.tools.strings.clone(),
            docker_explorer: self.tools.docker_explorer.clone(),
            image_export: self.tools.image_export.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_hash: String,
}

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p).with_context(|| format!("reading config {}", p.display()))?
    } else {
        include_bytes!("../config/default.yml").to_vec()
    };

    let config: Config = serde_yaml::from_slice(&bytes).context("parsing config")?;
    let config_hash = hash_bytes(&bytes);

    Ok(LoadedConfig { config, config_hash })
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex::encode(digest)
}
