//! Per-cycle remote session.
//!
//! One `Session` is opened at the start of every reconcile cycle and passed to
//! each component. It carries the client, the resolved datacenter with its VM
//! folder, and the task polling policy.

use std::sync::Arc;

use inventory_client_interface::{DatacenterFolders, InventoryClient, TaskHandle};
use tracing::debug;
use vapp_shared_types::{MoKind, MoRef, ResolvedObject, Result};

use crate::task::{TaskOutcome, TaskWaiter, WaitPolicy};

pub struct Session {
    client: Arc<dyn InventoryClient>,
    datacenter: ResolvedObject,
    folders: DatacenterFolders,
    wait_policy: WaitPolicy,
}

impl Session {
    /// Resolve the datacenter (the only one when `datacenter` is `None`) and its folders.
    pub async fn open(
        client: Arc<dyn InventoryClient>,
        datacenter: Option<&str>,
        wait_policy: WaitPolicy,
    ) -> Result<Self> {
        let datacenter = client
            .find_datacenter(datacenter.filter(|name| !name.is_empty()))
            .await?;
        let folders = client.datacenter_folders(&datacenter.reference).await?;
        debug!(datacenter = %datacenter.inventory_path, "Session opened");
        Ok(Self {
            client,
            datacenter,
            folders,
            wait_policy,
        })
    }

    pub fn client(&self) -> &dyn InventoryClient {
        self.client.as_ref()
    }

    pub fn datacenter(&self) -> &ResolvedObject {
        &self.datacenter
    }

    /// The datacenter's default VM folder.
    pub fn vm_folder(&self) -> &ResolvedObject {
        &self.folders.vm_folder
    }

    /// Resolve `path` relative to the datacenter.
    pub async fn find(&self, kind: MoKind, path: &str) -> Result<ResolvedObject> {
        Ok(self
            .client
            .find(&self.datacenter.reference, kind, path)
            .await?)
    }

    pub fn waiter(&self) -> TaskWaiter<'_> {
        TaskWaiter::new(self.client.as_ref(), &self.wait_policy)
    }

    pub async fn wait(&self, task: &TaskHandle) -> Result<TaskOutcome> {
        self.waiter().wait(task).await
    }

    pub async fn wait_for_success(&self, operation: &str, task: &TaskHandle) -> Result<Option<MoRef>> {
        self.waiter().wait_for_success(operation, task).await
    }
}
