use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use vapp_shared_types::{EntityDescriptor, MoRef, Result, VAppError};

pub mod journal;

pub use journal::{
    AttachmentPhase, AttachmentRecord, DetachmentPhase, DetachmentRecord, JournalOperation,
    OperationJournal,
};

/// Errors specific to state store operations
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<StateStoreError> for VAppError {
    fn from(err: StateStoreError) -> Self {
        VAppError::State(err.to_string())
    }
}

/// The applied baseline of one container, written after every successful cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredVApp {
    /// Inventory path the container was created at.
    pub id: String,
    pub name: String,
    pub description: String,
    /// Datacenter named at creation; `None` means the inventory's only one.
    #[serde(default)]
    pub datacenter: Option<String>,
    #[serde(default)]
    pub reference: Option<MoRef>,
    #[serde(default)]
    pub instance_uuid: Option<String>,
    /// Entities with their computed fields; the next diff's `previous` list.
    pub entities: Vec<EntityDescriptor>,
    pub updated_at: DateTime<Utc>,
}

impl StoredVApp {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            datacenter: None,
            reference: None,
            instance_uuid: None,
            entities: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Core trait for persisting reconciler state
///
/// Holds two things per container id: the applied baseline, and the journal of
/// an in-flight cycle. Implementations can be in-memory (for testing) or
/// file-backed.
#[async_trait]
pub trait StateStore: Send + Sync {
    // ===== Initialization =====

    /// Prepare the backend (create directories, etc.)
    async fn initialize(&self) -> Result<()>;

    /// Check if the state store is usable
    async fn health_check(&self) -> Result<bool>;

    // ===== Baseline Operations =====

    /// Store or replace a container baseline
    async fn put_vapp(&self, state: StoredVApp) -> Result<()>;

    /// Get a container baseline by id
    async fn get_vapp(&self, id: &str) -> Result<Option<StoredVApp>>;

    /// List all stored baselines
    async fn list_vapps(&self) -> Result<Vec<StoredVApp>>;

    /// Delete a baseline; deleting a missing id is not an error
    async fn delete_vapp(&self, id: &str) -> Result<()>;

    // ===== Journal Operations =====

    async fn put_journal(&self, journal: OperationJournal) -> Result<()>;

    async fn get_journal(&self, id: &str) -> Result<Option<OperationJournal>>;

    async fn clear_journal(&self, id: &str) -> Result<()>;

    /// Store the new baseline and drop the journal of the cycle that produced it.
    async fn commit(&self, state: StoredVApp) -> Result<()> {
        let id = state.id.clone();
        self.put_vapp(state).await?;
        self.clear_journal(&id).await
    }
}

#[cfg(feature = "in-memory")]
pub mod in_memory;

#[cfg(feature = "file")]
pub mod file_store;

#[cfg(feature = "in-memory")]
pub use in_memory::InMemoryStateStore;

#[cfg(feature = "file")]
pub use file_store::FileStateStore;

/// Helper function to create the appropriate store for a config
pub fn create_state_store(config: StateStoreConfig) -> Result<Arc<dyn StateStore>> {
    match config {
        #[cfg(feature = "in-memory")]
        StateStoreConfig::InMemory => Ok(Arc::new(in_memory::InMemoryStateStore::new())),

        #[cfg(feature = "file")]
        StateStoreConfig::File { path } => Ok(Arc::new(file_store::FileStateStore::new(path))),

        #[allow(unreachable_patterns)]
        _ => Err(VAppError::Configuration(
            "State store configuration not supported with current features".to_string(),
        )),
    }
}

/// Configuration for state store backends
#[derive(Debug, Clone)]
pub enum StateStoreConfig {
    #[cfg(feature = "in-memory")]
    InMemory,

    /// One JSON document per container under `path`
    #[cfg(feature = "file")]
    File { path: std::path::PathBuf },
}
