//! XDG-compliant configuration paths.

use std::path::{Path, PathBuf};

use crate::{error::Result, ConfigError, APP_NAME};

/// Configuration paths following the XDG Base Directory Specification.
///
/// Default locations:
/// - Config: `~/.config/vapp-reconciler/`
/// - Data: `~/.local/share/vapp-reconciler/`
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl ConfigPaths {
    /// Create paths using XDG defaults.
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::PathError("Could not determine config directory".into()))?
            .join(APP_NAME);

        let data_dir = dirs::data_dir()
            .ok_or_else(|| ConfigError::PathError("Could not determine data directory".into()))?
            .join(APP_NAME);

        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    /// Create paths with a custom base directory (for testing).
    pub fn with_base(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            config_dir: base.join("config"),
            data_dir: base.join("data"),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The engine configuration file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Directory of the file-backed state store.
    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }

    /// Ensure all directories exist.
    pub async fn ensure_dirs(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.config_dir).await?;
        tokio::fs::create_dir_all(self.state_dir()).await?;
        Ok(())
    }
}
