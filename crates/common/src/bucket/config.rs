use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::types::RedundancyLevel;

/// Tunables for a bucket.
///
/// `workload_ceiling` bounds how many triples a single batch call may touch,
/// `epoch_size` is the width of a key epoch in blocks. Both are fixed for the
/// lifetime of a bucket once it has been created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
    #[serde(default = "default_workload_ceiling")]
    pub workload_ceiling: usize,
    #[serde(default = "default_epoch_size")]
    pub epoch_size: u64,
    #[serde(default = "default_min_element_redundancy")]
    pub min_element_redundancy: RedundancyLevel,
}

fn default_workload_ceiling() -> usize {
    60
}

fn default_epoch_size() -> u64 {
    100
}

fn default_min_element_redundancy() -> RedundancyLevel {
    RedundancyLevel(1)
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            workload_ceiling: default_workload_ceiling(),
            epoch_size: default_epoch_size(),
            min_element_redundancy: default_min_element_redundancy(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("workload ceiling must be at least 1")]
    ZeroWorkloadCeiling,
    #[error("epoch size must be at least 1 block")]
    ZeroEpochSize,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl BucketConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workload_ceiling == 0 {
            return Err(ConfigError::ZeroWorkloadCeiling);
        }
        if self.epoch_size == 0 {
            return Err(ConfigError::ZeroEpochSize);
        }
        Ok(())
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let s = fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}
