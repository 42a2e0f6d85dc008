//! Configuration management for the schema engine
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (casework.toml)
//! - Environment variables (CASEWORK__*)
//!
//! ## Example config file (casework.toml):
//! ```toml
//! [registry]
//! key_pattern = "^[A-Za-z][A-Za-z0-9_]{0,63}$"
//! schema_dir = "./schemas"
//!
//! [validation]
//! suppress_hidden_list_errors = true
//!
//! [logging]
//! filter = "casework_schemas=debug"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::schema::DEFAULT_KEY_PATTERN;

/// Main configuration for the engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Pattern every schema key must match
    #[serde(default = "default_key_pattern")]
    pub key_pattern: String,

    /// Directory of schema definition files loaded by the CLI
    #[serde(default)]
    pub schema_dir: Option<PathBuf>,
}

/// Form validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Drop errors raised beneath statically hidden list wrappers
    #[serde(default = "default_true")]
    pub suppress_hidden_list_errors: bool,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when RUST_LOG is unset
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_key_pattern() -> String {
    DEFAULT_KEY_PATTERN.to_string()
}

fn default_true() -> bool {
    true
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            key_pattern: default_key_pattern(),
            schema_dir: None,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            suppress_hidden_list_errors: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        for location in ["casework.toml", ".casework.toml", "config/casework.toml"] {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "casework", "schemas") {
            let xdg_config = config_dir.config_dir().join("casework.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("CASEWORK")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }
}
