//! Controller configuration
//!
//! Parses `casa.yaml` from the configuration directory.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;

/// Name of the configuration file
pub const CONFIG_FILE: &str = "casa.yaml";

/// A bridge enabled for this deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Name of the deployment (e.g., "Home")
    #[serde(default = "default_name")]
    pub name: String,

    /// Storage directory, relative to the configuration directory
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Bridge refresh period in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Default log filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub bridges: Vec<BridgeConfig>,
}

fn default_true() -> bool {
    true
}

fn default_name() -> String {
    "Home".to_string()
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from(".casa")
}

fn default_poll_interval() -> u64 {
    600
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            storage_dir: default_storage_dir(),
            poll_interval_secs: default_poll_interval(),
            log_level: default_log_level(),
            bridges: Vec::new(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from a config directory
    ///
    /// Defaults are used when `casa.yaml` does not exist.
    pub fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref();
        if !config_dir.join(CONFIG_FILE).exists() {
            info!("No {} in {:?}, using defaults", CONFIG_FILE, config_dir);
            return Ok(Self::default());
        }

        let yaml = load_yaml(config_dir, CONFIG_FILE)?;
        let config = Self::from_yaml(&yaml)?;
        debug!(name = %config.name, bridges = config.bridges.len(), "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration from a YAML value
    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        if yaml.is_null() {
            return Ok(Self::default());
        }
        if !yaml.is_mapping() {
            return Err(ConfigError::InvalidValue {
                key: "root".to_string(),
                reason: "configuration must be a mapping".to_string(),
            });
        }

        let config: ControllerConfig =
            serde_yaml::from_value(yaml.clone()).map_err(|e| ConfigError::InvalidValue {
                key: "root".to_string(),
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "poll_interval_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(bridge) = self.bridges.iter().find(|b| b.name.trim().is_empty()) {
            return Err(ConfigError::InvalidValue {
                key: "bridges".to_string(),
                reason: format!("bridge name must not be empty: {:?}", bridge),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Storage directory resolved against the config directory
    pub fn storage_path(&self, config_dir: impl AsRef<Path>) -> PathBuf {
        if self.storage_dir.is_absolute() {
            self.storage_dir.clone()
        } else {
            config_dir.as_ref().join(&self.storage_dir)
        }
    }

    /// Names of the enabled bridges
    pub fn enabled_bridges(&self) -> impl Iterator<Item = &str> {
        self.bridges
            .iter()
            .filter(|b| b.enabled)
            .map(|b| b.name.as_str())
    }
}
