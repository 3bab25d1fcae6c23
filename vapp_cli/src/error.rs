//! CLI error types.

use thiserror::Error;

/// CLI error type.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("vApp {0} has no stored state")]
    NotManaged(String),

    #[error("{0}")]
    Config(#[from] reconciler_config::ConfigError),

    #[error("state store error: {0}")]
    Store(#[from] state_store_interface::StateStoreError),

    #[error("{0}")]
    Engine(#[from] vapp_shared_types::VAppError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
