//! Configuration file support for routerd
//!
//! Loads and validates routerd configuration from TOML files.
//! Default location: /etc/routerd/routerd.toml

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tables::{DEFAULT_CONFIG_PATH, DEFAULT_EGRESS_INTERFACE, DEFAULT_PARENT_INTERFACE};
use crate::types::validate_interface_name;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Host networking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Link that per-unit macvlan interfaces attach to
    #[serde(default = "default_parent_interface")]
    pub parent_interface: String,

    /// Interface NAT masquerade is applied on
    #[serde(default = "default_egress_interface")]
    pub egress_interface: String,

    /// Enable forwarding and masquerade before handling events
    #[serde(default = "default_prepare_on_start")]
    pub prepare_on_start: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Complete routerd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterdConfig {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_parent_interface() -> String {
    DEFAULT_PARENT_INTERFACE.to_string()
}

fn default_egress_interface() -> String {
    DEFAULT_EGRESS_INTERFACE.to_string()
}

fn default_prepare_on_start() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            parent_interface: default_parent_interface(),
            egress_interface: default_egress_interface(),
            prepare_on_start: default_prepare_on_start(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl RouterdConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).map_err(|message| ConfigError::Parse {
                path: path.display().to_string(),
                message,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!(
                    "routerd: Config file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> ConfigResult<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        validate_interface_name(&self.network.parent_interface)
            .map_err(|msg| ConfigError::Invalid(format!("parent_interface: {}", msg)))?;

        validate_interface_name(&self.network.egress_interface)
            .map_err(|msg| ConfigError::Invalid(format!("egress_interface: {}", msg)))?;

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.level must not be empty".to_string()));
        }

        Ok(())
    }
}
