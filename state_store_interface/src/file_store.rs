//! File-backed implementation of StateStore.
//!
//! Layout under the base directory:
//!
//! ```text
//! vapps/<encoded id>.json
//! journals/<encoded id>.json
//! ```
//!
//! Container ids are inventory paths, so they are percent-encoded into a single
//! file name. Writes go to a temporary file that is renamed into place.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use vapp_shared_types::Result;

use crate::{OperationJournal, StateStore, StateStoreError, StoredVApp};

const VAPPS_DIR: &str = "vapps";
const JOURNALS_DIR: &str = "journals";

#[derive(Debug, Clone)]
pub struct FileStateStore {
    base: PathBuf,
}

/// `apps/web 1` -> `apps%2Fweb%201`
fn encode_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for byte in id.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

impl FileStateStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    fn vapp_path(&self, id: &str) -> PathBuf {
        self.base.join(VAPPS_DIR).join(format!("{}.json", encode_id(id)))
    }

    fn journal_path(&self, id: &str) -> PathBuf {
        self.base
            .join(JOURNALS_DIR)
            .join(format!("{}.json", encode_id(id)))
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| StateStoreError::SerializationError(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StateStoreError::IoError(e.to_string()))?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .await
            .map_err(|e| StateStoreError::IoError(e.to_string()))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| StateStoreError::IoError(e.to_string()))?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| StateStoreError::SerializationError(e.to_string()).into()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StateStoreError::IoError(e.to_string()).into()),
        }
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateStoreError::IoError(e.to_string()).into()),
        }
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn initialize(&self) -> Result<()> {
        for dir in [VAPPS_DIR, JOURNALS_DIR] {
            fs::create_dir_all(self.base.join(dir))
                .await
                .map_err(|e| StateStoreError::IoError(e.to_string()))?;
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(fs::metadata(self.base.join(VAPPS_DIR))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false))
    }

    async fn put_vapp(&self, state: StoredVApp) -> Result<()> {
        let path = self.vapp_path(&state.id);
        self.write_json(&path, &state).await
    }

    async fn get_vapp(&self, id: &str) -> Result<Option<StoredVApp>> {
        self.read_json(&self.vapp_path(id)).await
    }

    async fn list_vapps(&self) -> Result<Vec<StoredVApp>> {
        let dir = self.base.join(VAPPS_DIR);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StateStoreError::IoError(e.to_string()).into()),
        };

        let mut all = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StateStoreError::IoError(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read_json::<StoredVApp>(&path).await {
                Ok(Some(state)) => all.push(state),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable state file {}: {}", path.display(), e),
            }
        }
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn delete_vapp(&self, id: &str) -> Result<()> {
        self.remove(&self.vapp_path(id)).await
    }

    async fn put_journal(&self, journal: OperationJournal) -> Result<()> {
        let path = self.journal_path(&journal.container_id);
        self.write_json(&path, &journal).await
    }

    async fn get_journal(&self, id: &str) -> Result<Option<OperationJournal>> {
        self.read_json(&self.journal_path(id)).await
    }

    async fn clear_journal(&self, id: &str) -> Result<()> {
        self.remove(&self.journal_path(id)).await
    }
}
