//! YAML configuration loading for casa
//!
//! Loads `casa.yaml` with support for custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!env_var VAR [default]` - Environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use casa_config::ControllerConfig;
//!
//! let config = ControllerConfig::load("/etc/casa")?;
//! let period = config.poll_interval();
//! ```

mod controller_config;
mod error;
mod loader;

pub use controller_config::{BridgeConfig, ControllerConfig, CONFIG_FILE};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, YamlLoader};

// Re-export serde_yaml::Value for convenience
pub use serde_yaml::Value;
