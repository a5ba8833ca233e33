use std::path::Path;

use dimse::{DimseConfig, DimseError};
use serde::Deserialize;
use thiserror::Error;

use crate::config::LoggingConfig;

/// Errors raised while loading or validating the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid DIMSE configuration: {0}")]
    Dimse(#[from] DimseError),

    #[error("log_to_file is enabled but log_file_path is empty")]
    MissingLogFilePath,

    #[error("Invalid log level: {0:?}")]
    InvalidLogLevel(String),
}

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub dimse: DimseConfig,
}

impl Config {
    /// Parse and validate a TOML document
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logging.validate()?;
        self.dimse.validate()?;
        Ok(())
    }
}
