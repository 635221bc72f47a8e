//! # Configuration Module
//!
//! Job configuration loaded from TOML and passed explicitly into the pipeline
//!
//! ## Key Components
//! - [`JobConfig`] - Quota, sharding, worker and seed settings
//! - [`InputConfig`] - Default row source paths
//! - [`resolve_config_path`] - Locate the configuration file

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AnalysisError, Result};
use crate::sampler::DEFAULT_TOTAL_QUOTA;

pub const CONFIG_ENV_VAR: &str = "SESSION_ANALYZER_CONFIG";
pub const DEFAULT_PARTITIONS: usize = 8;

/// Resolve the configuration file path based on priority:
/// 1. Explicit path
/// 2. SESSION_ANALYZER_CONFIG environment variable
/// 3. XDG config directory
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|dir| dir.join("session-analyzer").join("config.toml"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default)]
    pub actions: Option<PathBuf>,
    #[serde(default)]
    pub users: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Sessions to sample across all dates
    #[serde(default = "default_total_quota")]
    pub total_quota: u64,
    #[serde(default = "default_partitions")]
    pub partitions: usize,
    /// Worker threads; rayon's default when unset
    #[serde(default)]
    pub workers: Option<usize>,
    /// Fixed sampling seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub input: InputConfig,
}

fn default_total_quota() -> u64 {
    DEFAULT_TOTAL_QUOTA
}

fn default_partitions() -> usize {
    DEFAULT_PARTITIONS
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            total_quota: DEFAULT_TOTAL_QUOTA,
            partitions: DEFAULT_PARTITIONS,
            workers: None,
            seed: None,
            input: InputConfig::default(),
        }
    }
}

impl JobConfig {
    /// A missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: JobConfig = toml::from_str(&content)
            .map_err(|e| AnalysisError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(explicit_path) {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.partitions == 0 {
            return Err(AnalysisError::Config("partitions must be at least 1".to_string()));
        }
        if self.workers == Some(0) {
            return Err(AnalysisError::Config("workers must be at least 1".to_string()));
        }
        Ok(())
    }
}
