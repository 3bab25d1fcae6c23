//! Location resolution for a new container.
//!
//! Computes the resource pool, folder and (for clones) datastore a container is
//! created in. Resource pool precedence, first match wins:
//!
//! 1. the parent container, which acts as the pool of its children
//! 2. an explicit resource pool path
//! 3. the root pool of the named cluster
//! 4. the datacenter's default pool
//!
//! A datastore name that turns out to be a storage pool is resolved to a concrete
//! datastore with a placement query, which needs a representative entity of the
//! clone template. Plain creation cannot target a storage pool.

use inventory_client_interface::StoragePlacementSpec;
use tracing::{debug, info};
use vapp_shared_types::{
    CloneTemplate, DeclaredContainer, MoKind, MoRef, ResolvedObject, Result, VAppError,
};

use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub resource_pool: ResolvedObject,
    pub folder: ResolvedObject,
    /// Always set for clones; set for plain creation only when a datastore was named.
    pub datastore: Option<MoRef>,
}

pub struct LocationResolver<'a> {
    session: &'a Session,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl<'a> LocationResolver<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    pub async fn resolve(&self, declared: &DeclaredContainer) -> Result<ResolvedLocation> {
        let resource_pool = self.resolve_resource_pool(declared).await?;
        let folder = self.resolve_folder(declared).await?;
        let datastore = self
            .resolve_datastore(declared, &resource_pool, &folder)
            .await?;

        info!(
            pool = %resource_pool.inventory_path,
            folder = %folder.inventory_path,
            datastore = ?datastore.as_ref().map(|d| d.value.as_str()),
            "Resolved container location"
        );
        Ok(ResolvedLocation {
            resource_pool,
            folder,
            datastore,
        })
    }

    pub async fn resolve_resource_pool(&self, declared: &DeclaredContainer) -> Result<ResolvedObject> {
        let placement = &declared.placement;
        if let Some(parent) = non_empty(&placement.parent_vapp) {
            debug!(parent, "Using parent container as resource pool");
            return self.session.find(MoKind::VirtualApp, parent).await;
        }
        if let Some(pool) = non_empty(&placement.resource_pool) {
            return self.session.find(MoKind::ResourcePool, pool).await;
        }
        if let Some(cluster) = non_empty(&placement.cluster) {
            return self
                .session
                .find(MoKind::ResourcePool, &format!("*{}/Resources", cluster))
                .await;
        }
        Ok(self
            .session
            .client()
            .default_resource_pool(&self.session.datacenter().reference)
            .await?)
    }

    pub async fn resolve_folder(&self, declared: &DeclaredContainer) -> Result<ResolvedObject> {
        match non_empty(&declared.placement.folder) {
            Some(folder) => self.session.find(MoKind::Folder, folder).await,
            None => Ok(self.session.vm_folder().clone()),
        }
    }

    async fn resolve_datastore(
        &self,
        declared: &DeclaredContainer,
        pool: &ResolvedObject,
        folder: &ResolvedObject,
    ) -> Result<Option<MoRef>> {
        let name = match non_empty(&declared.placement.datastore) {
            Some(name) => name,
            None if declared.template.is_some() => {
                let datastore = self
                    .session
                    .client()
                    .default_datastore(&self.session.datacenter().reference)
                    .await?;
                return Ok(Some(datastore.reference));
            }
            None => return Ok(None),
        };

        let not_found = match self.session.find(MoKind::Datastore, name).await {
            Ok(datastore) => return Ok(Some(datastore.reference)),
            Err(err @ VAppError::NotFound { .. }) => err,
            Err(err) => return Err(err),
        };

        let pod = match self.session.find(MoKind::StoragePod, name).await {
            Ok(pod) => pod,
            Err(VAppError::NotFound { .. }) => return Err(not_found),
            Err(err) => return Err(err),
        };

        match &declared.template {
            None => Err(VAppError::Configuration(format!(
                "datastore '{}' is a storage pool; a vApp can only be placed on a storage pool when it is cloned",
                name
            ))),
            Some(template) => self
                .recommend_datastore(&pod.reference, template, pool, folder, &declared.name)
                .await
                .map(Some),
        }
    }

    /// Ask for a concrete datastore inside `pod`, using the template's last entity as the
    /// representative.
    async fn recommend_datastore(
        &self,
        pod: &MoRef,
        template: &CloneTemplate,
        pool: &ResolvedObject,
        folder: &ResolvedObject,
        clone_name: &str,
    ) -> Result<MoRef> {
        let source = self
            .session
            .find(MoKind::VirtualApp, &template.source_name)
            .await?;
        let config = self.session.client().vapp_config(&source.reference).await?;
        let representative = config.entity_config.last().ok_or_else(|| {
            VAppError::Configuration(format!(
                "template '{}' has no entities to place on a storage pool",
                template.source_name
            ))
        })?;

        let spec = StoragePlacementSpec {
            storage_pod: pod.clone(),
            vm: representative.key.clone(),
            pool: pool.reference.clone(),
            folder: folder.reference.clone(),
            clone_name: clone_name.to_string(),
        };
        let recommended = self.session.client().recommend_datastores(&spec).await?;
        let datastore = recommended.into_iter().next().ok_or_else(|| {
            VAppError::Configuration(format!("storage pool {} recommended no datastore", pod))
        })?;
        info!(pod = %pod, datastore = %datastore, "Storage pool placement");
        Ok(datastore)
    }
}
