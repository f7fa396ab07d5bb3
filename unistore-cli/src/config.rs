//! Configuration management for the CLI.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use unistore_backend::DEFAULT_FILER_ADDRESS;
use unistore_common::{LogFormat, LOG_LEVELS};

use crate::cli::Args;

/// Location tried when no `--config` is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/unistore/unistore.yaml";

/// Default inventory file of the in-memory backend.
pub const DEFAULT_INVENTORY_PATH: &str = "/var/lib/unistore/inventory.yaml";

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Storage backend to drive
    pub backend: BackendKind,
    /// In-memory backend configuration
    pub memory: MemoryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            backend: BackendKind::Memory,
            memory: MemoryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref level) = args.log_level {
            self.log_level = level.clone();
        }

        if let Some(ref inventory) = args.inventory {
            self.memory.inventory_path = inventory.clone();
        }

        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "log_level".to_string(),
                message: format!("must be one of: {:?}", LOG_LEVELS),
            });
        }

        if self.memory.filer_address.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "memory.filer_address".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if self.memory.inventory_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "memory.inventory_path".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Storage backend type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Reference in-memory backend, persisted to the inventory file
    #[default]
    Memory,
    /// NetApp filer
    Netapp,
}

/// In-memory backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Filer address reported for volumes created without one
    pub filer_address: String,
    /// Where the backend state is kept between invocations
    pub inventory_path: PathBuf,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            filer_address: DEFAULT_FILER_ADDRESS.to_string(),
            inventory_path: PathBuf::from(DEFAULT_INVENTORY_PATH),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Backend '{0}' needs a filer client and cannot be driven from the CLI")]
    UnsupportedBackend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.memory.filer_address, DEFAULT_FILER_ADDRESS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        // Invalid log level
        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());
        config.log_level = "WARN".to_string();
        assert!(config.validate().is_ok());

        // Empty filer address
        config.memory.filer_address = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "memory.filer_address"
        ));
    }
}
