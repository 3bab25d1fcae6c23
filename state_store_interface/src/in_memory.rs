//! In-memory implementation of StateStore, for tests and dry runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use vapp_shared_types::Result;

use crate::{OperationJournal, StateStore, StoredVApp};

#[derive(Debug, Clone, Default)]
pub struct InMemoryStateStore {
    vapps: Arc<RwLock<HashMap<String, StoredVApp>>>,
    journals: Arc<RwLock<HashMap<String, OperationJournal>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn put_vapp(&self, state: StoredVApp) -> Result<()> {
        self.vapps.write().await.insert(state.id.clone(), state);
        Ok(())
    }

    async fn get_vapp(&self, id: &str) -> Result<Option<StoredVApp>> {
        Ok(self.vapps.read().await.get(id).cloned())
    }

    async fn list_vapps(&self) -> Result<Vec<StoredVApp>> {
        let mut all: Vec<StoredVApp> = self.vapps.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn delete_vapp(&self, id: &str) -> Result<()> {
        self.vapps.write().await.remove(id);
        Ok(())
    }

    async fn put_journal(&self, journal: OperationJournal) -> Result<()> {
        self.journals
            .write()
            .await
            .insert(journal.container_id.clone(), journal);
        Ok(())
    }

    async fn get_journal(&self, id: &str) -> Result<Option<OperationJournal>> {
        Ok(self.journals.read().await.get(id).cloned())
    }

    async fn clear_journal(&self, id: &str) -> Result<()> {
        self.journals.write().await.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JournalOperation;

    #[tokio::test]
    async fn test_in_memory_vapp_operations() {
        let store = InMemoryStateStore::new();
        assert!(store.get_vapp("web").await.unwrap().is_none());

        store.put_vapp(StoredVApp::new("web", "web")).await.unwrap();
        store.put_vapp(StoredVApp::new("apps/db", "db")).await.unwrap();

        let all = store.list_vapps().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "apps/db");

        store.delete_vapp("web").await.unwrap();
        store.delete_vapp("web").await.unwrap();
        assert!(store.get_vapp("web").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_clears_journal() {
        let store = InMemoryStateStore::new();
        store
            .put_journal(OperationJournal::new("web", JournalOperation::Create))
            .await
            .unwrap();
        assert!(store.get_journal("web").await.unwrap().is_some());

        store.commit(StoredVApp::new("web", "web")).await.unwrap();
        assert!(store.get_journal("web").await.unwrap().is_none());
        assert!(store.get_vapp("web").await.unwrap().is_some());
    }
}
