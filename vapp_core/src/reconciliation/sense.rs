//! Reconciliation Sense Module
//!
//! Read-only observation of a container as it exists remotely: where it is,
//! which members it holds with their ordering records, and its instance id.
//!
//! # Key Concepts
//!
//! - **Read-only**: sensing never mutates the inventory
//! - **Absence is a value**: a container that no longer exists is `None`, not an error

use inventory_client_interface::VAppConfigInfo;
use tracing::debug;
use vapp_shared_types::{MoRef, Result};

use crate::lifecycle::{ContainerHandle, LifecycleManager};
use crate::session::Session;

/// One observation of a remote container.
#[derive(Debug, Clone)]
pub struct ContainerObservation {
    pub handle: ContainerHandle,
    pub config: VAppConfigInfo,
}

impl ContainerObservation {
    /// References of the current members.
    pub fn members(&self) -> Vec<MoRef> {
        self.config
            .entity_config
            .iter()
            .map(|record| record.key.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.config.entity_config.is_empty()
    }
}

/// Observe the container, trying the recorded reference first and the
/// inventory path second.
pub async fn observe(
    session: &Session,
    id: &str,
    reference: Option<&MoRef>,
) -> Result<Option<ContainerObservation>> {
    let lifecycle = LifecycleManager::new(session);

    let handle = match reference {
        Some(reference) => match lifecycle.handle_for(reference).await? {
            Some(handle) => Some(handle),
            None => lifecycle.locate(id).await?,
        },
        None => lifecycle.locate(id).await?,
    };
    let Some(handle) = handle else {
        debug!(vapp = id, "Container not found");
        return Ok(None);
    };

    let config = session.client().vapp_config(&handle.reference).await?;
    debug!(
        vapp = %handle.inventory_path,
        members = config.entity_config.len(),
        "Observed container"
    );
    Ok(Some(ContainerObservation { handle, config }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::WaitPolicy;
    use inventory_client_interface::mock::MockInventory;
    use inventory_client_interface::InventoryClient;
    use std::sync::Arc;

    async fn setup() -> (MockInventory, Session, MoRef, MoRef) {
        let mock = MockInventory::new();
        mock.add_datacenter("dc1").await;
        let pool = mock.add_cluster("dc1", "c1").await;
        mock.add_folder("dc1", "apps").await;
        let vm = mock.add_vm("dc1", "", "db", &pool).await;
        let vapp = mock.add_vapp("dc1", "apps", "web", &pool, &[vm.clone()]).await;
        let session = Session::open(Arc::new(mock.clone()), None, WaitPolicy::default())
            .await
            .unwrap();
        (mock, session, vapp, vm)
    }

    #[tokio::test]
    async fn test_observe_by_path() {
        let (_mock, session, vapp, vm) = setup().await;
        let observed = observe(&session, "apps/web", None).await.unwrap().unwrap();
        assert_eq!(observed.handle.reference, vapp);
        assert_eq!(observed.handle.inventory_path, "/dc1/vm/apps/web");
        assert_eq!(observed.members(), vec![vm]);
        assert!(!observed.config.instance_uuid.is_empty());
    }

    #[tokio::test]
    async fn test_observe_prefers_recorded_reference() {
        let (mock, session, vapp, _vm) = setup().await;
        let folder = mock.add_folder("dc1", "moved").await;
        mock.move_into_folder(&folder, &[vapp.clone()]).await.unwrap();

        let observed = observe(&session, "apps/web", Some(&vapp))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(observed.handle.inventory_path, "/dc1/vm/moved/web");
    }

    #[tokio::test]
    async fn test_observe_missing_container_is_none() {
        let (_mock, session, _vapp, _vm) = setup().await;
        assert!(observe(&session, "apps/gone", None).await.unwrap().is_none());
    }
}
