//! Configuration for the vApp reconciler.
//!
//! This crate provides:
//! - the engine configuration (`config.toml`): task polling, metadata scope,
//!   detach verification, logging
//! - the declaration boundary that parses a container declaration into a
//!   validated `DeclaredContainer`
//! - XDG-compliant paths for configuration and the state directory
//!
//! # Configuration Location
//!
//! - `~/.config/vapp-reconciler/config.toml` - engine configuration
//! - `~/.local/share/vapp-reconciler/state/` - file-backed state store

pub mod config;
pub mod declaration;
pub mod paths;
mod error;

pub use config::{BackoffKind, LoggingSettings, ReconcilerConfig, TaskWaitSettings};
pub use declaration::{load_declaration, parse_declaration};
pub use error::{ConfigError, Result};
pub use paths::ConfigPaths;

/// Application name used for XDG paths
pub const APP_NAME: &str = "vapp-reconciler";

/// Description given to containers that declare none.
pub const DEFAULT_DESCRIPTION: &str = "Created by vapp-reconciler";
