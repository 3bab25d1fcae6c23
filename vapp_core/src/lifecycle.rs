//! Container lifecycle: create (plain or cloned), locate, destroy.

use inventory_client_interface::{
    CloneSpec, NetworkMappingPair, ResourceAllocation, ResourceConfigSpec, VAppConfigSpec,
};
use tracing::{debug, info};
use vapp_shared_types::{
    CloneTemplate, DeclaredContainer, MoKind, MoRef, Result, VAppError,
};

use crate::location::ResolvedLocation;
use crate::session::Session;

/// The remote container a cycle works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub reference: MoRef,
    pub inventory_path: String,
}

pub struct LifecycleManager<'a> {
    session: &'a Session,
}

impl<'a> LifecycleManager<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Create the container: cloned when a template is declared, otherwise empty with
    /// the default resource allocation. Nothing is left behind on failure.
    pub async fn create(
        &self,
        declared: &DeclaredContainer,
        location: &ResolvedLocation,
    ) -> Result<ContainerHandle> {
        match &declared.template {
            Some(template) => self.clone_from(declared, template, location).await,
            None => self.create_empty(declared, location).await,
        }
    }

    async fn create_empty(
        &self,
        declared: &DeclaredContainer,
        location: &ResolvedLocation,
    ) -> Result<ContainerHandle> {
        let resources = ResourceConfigSpec {
            cpu: ResourceAllocation::container_default(),
            memory: ResourceAllocation::container_default(),
        };
        let reference = self
            .session
            .client()
            .create_vapp(
                &location.resource_pool.reference,
                &declared.name,
                &resources,
                &VAppConfigSpec::default(),
                &location.folder.reference,
            )
            .await?;
        let inventory_path = self.session.client().element_path(&reference).await?;
        info!(vapp = %inventory_path, reference = %reference, "Created vApp");
        Ok(ContainerHandle {
            reference,
            inventory_path,
        })
    }

    async fn clone_from(
        &self,
        declared: &DeclaredContainer,
        template: &CloneTemplate,
        location: &ResolvedLocation,
    ) -> Result<ContainerHandle> {
        let source = self
            .session
            .find(MoKind::VirtualApp, &template.source_name)
            .await?;

        let mut network_mapping = Vec::with_capacity(template.network_mappings.len());
        for mapping in &template.network_mappings {
            let source_net = self
                .session
                .find(MoKind::Network, &mapping.source_label)
                .await?;
            let destination_net = self
                .session
                .find(MoKind::Network, &mapping.destination_label)
                .await?;
            network_mapping.push(NetworkMappingPair {
                source: source_net.reference,
                destination: destination_net.reference,
            });
        }

        let datastore = location.datastore.clone().ok_or_else(|| {
            VAppError::Internal("clone requested without a resolved datastore".to_string())
        })?;

        // A parent container places the clone implicitly.
        let has_parent = declared
            .placement
            .parent_vapp
            .as_deref()
            .map_or(false, |p| !p.is_empty());
        let spec = CloneSpec {
            location: datastore,
            provisioning: template.disk_provisioning,
            network_mapping,
            vm_folder: if has_parent {
                None
            } else {
                Some(location.folder.reference.clone())
            },
        };

        debug!(source = %source.inventory_path, name = %declared.name, "Cloning vApp");
        let task = self
            .session
            .client()
            .clone_vapp(
                &source.reference,
                &declared.name,
                &location.resource_pool.reference,
                &spec,
            )
            .await?;
        let result = self.session.wait_for_success("clone vApp", &task).await?;

        // The task result names the clone; the path lookup covers tasks without one.
        let cloned = match result {
            Some(reference) => self.handle_for(&reference).await?,
            None => None,
        };
        let handle = match cloned {
            Some(handle) => handle,
            None => {
                let id = declared.inventory_path();
                self.locate(&id)
                    .await?
                    .ok_or_else(|| VAppError::not_found(MoKind::VirtualApp, id))?
            }
        };
        info!(vapp = %handle.inventory_path, source = %source.inventory_path, "Cloned vApp");
        Ok(handle)
    }

    /// Find the container by its id (inventory path relative to the datacenter's VM
    /// folder). `Ok(None)` when it no longer exists.
    pub async fn locate(&self, id: &str) -> Result<Option<ContainerHandle>> {
        match self.session.find(MoKind::VirtualApp, id).await {
            Ok(found) => Ok(Some(ContainerHandle {
                reference: found.reference,
                inventory_path: found.inventory_path,
            })),
            Err(VAppError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Handle for a reference recorded earlier, if it still exists.
    pub async fn handle_for(&self, reference: &MoRef) -> Result<Option<ContainerHandle>> {
        match self.session.client().element_path(reference).await {
            Ok(inventory_path) => Ok(Some(ContainerHandle {
                reference: reference.clone(),
                inventory_path,
            })),
            Err(inventory_client_interface::InventoryError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn destroy(&self, container: &ContainerHandle) -> Result<()> {
        let task = self.session.client().destroy(&container.reference).await?;
        self.session.wait_for_success("destroy vApp", &task).await?;
        info!(vapp = %container.inventory_path, "Destroyed vApp");
        Ok(())
    }
}
