//! Error types for the reconciler_config crate.

use thiserror::Error;
use vapp_shared_types::VAppError;

/// Result type for reconciler_config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur loading configuration or declarations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// I/O error when reading or writing configuration files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing TOML.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Error serializing to TOML.
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Configuration file not found.
    #[error("Configuration not found: {0}")]
    NotFound(String),

    /// A value failed validation. The message names the field.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration path error.
    #[error("Path error: {0}")]
    PathError(String),
}

impl ConfigError {
    /// Create a new validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<ConfigError> for VAppError {
    fn from(err: ConfigError) -> Self {
        VAppError::Configuration(err.to_string())
    }
}
