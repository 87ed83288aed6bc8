//! Configuration loading and validation.
//!
//! Two layers: [`AppConfig`] says where data lives and what to write, and
//! [`ReferenceTables`] holds the hand-maintained lookup tables (round
//! calendar, playoff results, identity overrides, name corrections).

mod reference;

pub use reference::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to load layered config: {0}")]
    LayerError(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Also export Parquet files next to the JSONL outputs
    #[serde(default = "default_write_parquet")]
    pub write_parquet: bool,

    /// Suffix for primary-source year-round columns in the wide table
    #[serde(default = "default_primary_suffix")]
    pub primary_suffix: String,

    /// Suffix for secondary-source year-round columns in the wide table
    #[serde(default = "default_secondary_suffix")]
    pub secondary_suffix: String,
}

fn default_write_parquet() -> bool {
    true
}

fn default_primary_suffix() -> String {
    "_gp".to_string()
}

fn default_secondary_suffix() -> String {
    "_wsc".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            write_parquet: default_write_parquet(),
            primary_suffix: default_primary_suffix(),
            secondary_suffix: default_secondary_suffix(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// TOML file with the reference tables
    #[serde(default = "default_reference_path")]
    pub reference_path: PathBuf,

    #[serde(default)]
    pub output: OutputConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_reference_path() -> PathBuf {
    PathBuf::from("./reference.toml")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            reference_path: default_reference_path(),
            output: OutputConfig::default(),
        }
    }
}

/// Environment prefix for overrides, e.g. `RESULTS_LEDGER__DATA_DIR`.
pub const ENV_PREFIX: &str = "RESULTS_LEDGER";

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load an optional TOML file, then apply `RESULTS_LEDGER__*` environment
    /// overrides on top.
    pub fn load_layered(path: &Path) -> Result<Self, ConfigError> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let primary = self.output.primary_suffix.trim();
        let secondary = self.output.secondary_suffix.trim();

        if primary.is_empty() || secondary.is_empty() {
            return Err(ConfigError::ValidationError(
                "Column suffixes must not be empty".to_string(),
            ));
        }

        if primary == secondary {
            return Err(ConfigError::ValidationError(format!(
                "Primary and secondary suffixes must differ (both \"{}\")",
                primary
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.reference_path, PathBuf::from("./reference.toml"));
        assert!(config.output.write_parquet);
        assert_eq!(config.output.primary_suffix, "_gp");
        assert_eq!(config.output.secondary_suffix, "_wsc");
    }

    #[test]
    fn test_config_validation_ok() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_same_suffix() {
        let mut config = AppConfig::default();
        config.output.secondary_suffix = "_gp".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_empty_suffix() {
        let mut config = AppConfig::default();
        config.output.primary_suffix = " ".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();

        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.data_dir, parsed.data_dir);
        assert_eq!(config.output.secondary_suffix, parsed.output.secondary_suffix);
    }

    #[test]
    fn test_from_file_partial() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "data_dir = \"/srv/results\"\n[output]\nwrite_parquet = false\n")
            .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/results"));
        assert!(!config.output.write_parquet);
        assert_eq!(config.output.primary_suffix, "_gp");
    }

    #[test]
    fn test_load_layered_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = AppConfig::load_layered(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.log_level, "info");
    }
}
