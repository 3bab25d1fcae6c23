//! Engine configuration.
//!
//! Every field has a default, so an absent or partial `config.toml` is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use vapp_shared_types::MetadataScope;

use crate::error::{ConfigError, Result};
use crate::paths::ConfigPaths;

/// How the interval between task polls grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Linear,
    #[default]
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskWaitSettings {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub backoff: BackoffKind,
    /// No deadline when absent; the caller bounds the whole cycle.
    pub deadline_secs: Option<u64>,
}

impl Default for TaskWaitSettings {
    fn default() -> Self {
        Self {
            initial_interval_ms: 500,
            max_interval_ms: 5000,
            backoff: BackoffKind::Exponential,
            deadline_secs: None,
        }
    }
}

impl TaskWaitSettings {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` overrides it.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Description given to containers that declare none.
    pub default_description: String,
    pub metadata_scope: MetadataScope,
    /// Read the container back after detaching entities.
    pub verify_detach: bool,
    pub task_wait: TaskWaitSettings,
    pub logging: LoggingSettings,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            default_description: crate::DEFAULT_DESCRIPTION.to_string(),
            metadata_scope: MetadataScope::ChangedOnly,
            verify_detach: true,
            task_wait: TaskWaitSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl ReconcilerConfig {
    /// Load from the default XDG location, falling back to defaults when absent.
    pub async fn load_or_default() -> Result<Self> {
        let paths = ConfigPaths::new()?;
        Self::load_or_default_with_paths(&paths).await
    }

    pub async fn load_or_default_with_paths(paths: &ConfigPaths) -> Result<Self> {
        let file = paths.config_file();
        if file.exists() {
            Self::load(file).await
        } else {
            tracing::debug!(path = %file.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load and validate a config file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.display().to_string())
            } else {
                ConfigError::Io(e)
            }
        })?;
        let config = Self::from_toml(&content)?;
        tracing::info!(path = %path.display(), "Loaded reconciler configuration");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let wait = &self.task_wait;
        if wait.initial_interval_ms == 0 {
            return Err(ConfigError::validation(
                "task_wait.initial_interval_ms must be greater than zero",
            ));
        }
        if wait.max_interval_ms < wait.initial_interval_ms {
            return Err(ConfigError::validation(
                "task_wait.max_interval_ms must not be less than task_wait.initial_interval_ms",
            ));
        }
        if wait.deadline_secs == Some(0) {
            return Err(ConfigError::validation(
                "task_wait.deadline_secs must be greater than zero when set",
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::validation("logging.level must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ReconcilerConfig::default();
        assert_eq!(config.default_description, "Created by vapp-reconciler");
        assert_eq!(config.metadata_scope, MetadataScope::ChangedOnly);
        assert!(config.verify_detach);
        assert_eq!(config.task_wait.initial_interval(), Duration::from_millis(500));
        assert_eq!(config.task_wait.deadline(), None);
    }

    #[test]
    fn test_partial_toml() {
        let config = ReconcilerConfig::from_toml(
            r#"
            metadata_scope = "all-declared"

            [task_wait]
            backoff = "linear"
            deadline_secs = 600
            "#,
        )
        .unwrap();
        assert_eq!(config.metadata_scope, MetadataScope::AllDeclared);
        assert_eq!(config.task_wait.backoff, BackoffKind::Linear);
        assert_eq!(config.task_wait.max_interval_ms, 5000);
        assert_eq!(config.task_wait.deadline(), Some(Duration::from_secs(600)));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_intervals_rejected() {
        let err = ReconcilerConfig::from_toml(
            r#"
            [task_wait]
            initial_interval_ms = 1000
            max_interval_ms = 10
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let paths = ConfigPaths::with_base(temp.path());

        let fresh = ReconcilerConfig::load_or_default_with_paths(&paths).await.unwrap();
        assert_eq!(fresh, ReconcilerConfig::default());

        let mut config = ReconcilerConfig::default();
        config.verify_detach = false;
        config.logging.json = true;
        config.save(paths.config_file()).await.unwrap();

        let loaded = ReconcilerConfig::load_or_default_with_paths(&paths).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = ReconcilerConfig::load(temp.path().join("nope.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
