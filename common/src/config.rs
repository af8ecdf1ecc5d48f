//! Provider configuration tree (§4.7).
//!
//! Shaped the way `StartupMethod` elsewhere in this stack wraps a raw `config::Config`:
//! a typed struct deserialized with `serde`, defaulted where the tree omits a
//! key, with a `from_config` constructor and a validation pass that turns
//! illegal values into `BakeError::InvalidArg` rather than panicking.

use crate::error::BakeError;
use serde::{Deserialize, Serialize};

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_true() -> bool {
    true
}

fn default_pipeline_npools() -> u32 {
    4
}

fn default_pipeline_nbuffers_per_pool() -> u32 {
    32
}

fn default_pipeline_first_buffer_size() -> u64 {
    65536
}

fn default_pipeline_multiplier() -> u32 {
    4
}

fn default_nlogs() -> u32 {
    4
}

fn default_alignment() -> u64 {
    4096
}

fn default_abtio_nthreads() -> u32 {
    16
}

fn default_pmem_initial_target_size() -> u64 {
    1 << 30
}

/// `pipeline_*` keys: the staging poolset's shape (§4.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub enable: bool,
    pub npools: u32,
    pub nbuffers_per_pool: u32,
    pub first_buffer_size: u64,
    pub multiplier: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            enable: false,
            npools: default_pipeline_npools(),
            nbuffers_per_pool: default_pipeline_nbuffers_per_pool(),
            first_buffer_size: default_pipeline_first_buffer_size(),
            multiplier: default_pipeline_multiplier(),
        }
    }
}

/// `file_backend.*` keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileBackendConfig {
    pub nlogs: u32,
    pub alignment: u64,
    pub sync: bool,
    pub directio: bool,
    pub abtio_nthreads: u32,
    pub targets: Vec<String>,
}

impl Default for FileBackendConfig {
    fn default() -> Self {
        FileBackendConfig {
            nlogs: default_nlogs(),
            alignment: default_alignment(),
            sync: true,
            directio: true,
            abtio_nthreads: default_abtio_nthreads(),
            targets: Vec::new(),
        }
    }
}

impl FileBackendConfig {
    /// Rejects illegal values at attach time (§4.7: "fail invalid-arg at
    /// target attach").
    pub fn validate(&self) -> Result<(), BakeError> {
        if self.nlogs == 0 {
            return Err(BakeError::InvalidArg("file_backend.nlogs must be > 0".into()));
        }
        if self.alignment == 0 || !self.alignment.is_power_of_two() {
            return Err(BakeError::InvalidArg(
                "file_backend.alignment must be a power of two".into(),
            ));
        }
        Ok(())
    }
}

/// `pmem_backend.*` keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PmemBackendConfig {
    pub default_initial_target_size: u64,
    pub targets: Vec<String>,
}

impl Default for PmemBackendConfig {
    fn default() -> Self {
        PmemBackendConfig {
            default_initial_target_size: default_pmem_initial_target_size(),
            targets: Vec::new(),
        }
    }
}

/// The whole provider configuration tree (§4.7). Unknown keys at the
/// `config::Config` layer are preserved in the raw source; only the keys
/// this struct names are interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    #[serde(default = "default_version")]
    pub version: String,
    pub pipeline: PipelineConfig,
    pub file_backend: FileBackendConfig,
    pub pmem_backend: PmemBackendConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            version: default_version(),
            pipeline: PipelineConfig::default(),
            file_backend: FileBackendConfig::default(),
            pmem_backend: PmemBackendConfig::default(),
        }
    }
}

impl ProviderConfig {
    /// Builds a `ProviderConfig` from a raw `config::Config`, filling in
    /// every default for keys the tree omits (§4.7: "missing keys are
    /// filled with defaults"). `version` is always overwritten with the
    /// crate's own version, mirroring "written by the provider; overwritten
    /// on every load".
    pub fn from_config(config: &config::Config) -> anyhow::Result<Self> {
        let mut parsed: ProviderConfig = config.clone().try_deserialize()?;
        parsed.version = default_version();
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<(), BakeError> {
        self.file_backend.validate()
    }
}
