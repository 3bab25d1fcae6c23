//! Mock inventory client for testing and development.
//!
//! This provides an in-memory implementation that simulates a datacenter
//! inventory (folders, pools, containers, VMs, datastores, storage pools and
//! networks) without talking to a remote endpoint. Tasks finish after a
//! configurable number of polls, faults can be injected per operation, and every
//! mutating call is recorded for assertions.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use vapp_shared_types::{FaultKind, MoKind, MoRef, ResolvedObject, TaskFault};

use crate::{
    CloneSpec, DatacenterFolders, EntityConfigRecord, InventoryClient, InventoryError,
    InventoryResult, ParentProperty, ResourceConfigSpec, StoragePlacementSpec, TaskHandle,
    TaskInfo, TaskState, VAppConfigInfo, VAppConfigSpec,
};

/// A mutating call the mock received.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    CreateVApp {
        pool: MoRef,
        name: String,
        resources: ResourceConfigSpec,
        folder: MoRef,
    },
    CloneVApp {
        source: MoRef,
        name: String,
        target_pool: MoRef,
        spec: CloneSpec,
    },
    UpdateVAppConfig {
        vapp: MoRef,
        spec: VAppConfigSpec,
    },
    MoveIntoResourcePool {
        pool: MoRef,
        entities: Vec<MoRef>,
    },
    MoveIntoFolder {
        folder: MoRef,
        entities: Vec<MoRef>,
    },
    PowerOn(MoRef),
    PowerOff {
        vapp: MoRef,
        force: bool,
    },
    Destroy(MoRef),
    RecommendDatastores(StoragePlacementSpec),
}

/// Operations a fault can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    CreateVApp,
    CloneVApp,
    UpdateVAppConfig,
    MoveIntoResourcePool,
    MoveIntoFolder,
    PowerOn,
    PowerOff,
    Destroy,
    /// Path lookups; an injected fault surfaces as a communication error.
    ElementPath,
}

#[derive(Debug, Clone)]
struct MockObject {
    reference: MoRef,
    name: String,
    path: String,
    /// Pool a VM, container or resource pool lives in.
    pool: Option<MoRef>,
}

#[derive(Debug, Clone)]
struct MockVApp {
    instance_uuid: String,
    annotation: String,
    entity_config: Vec<EntityConfigRecord>,
    powered_on: bool,
}

#[derive(Debug, Clone)]
struct MockTask {
    description: String,
    remaining_polls: u32,
    outcome: TaskState,
}

#[derive(Debug, Default)]
struct Inventory {
    objects: HashMap<String, MockObject>,
    by_path: BTreeMap<String, String>,
    vapps: HashMap<String, MockVApp>,
    datacenters: Vec<String>,
    default_pools: HashMap<String, String>,
    default_datastores: HashMap<String, String>,
    recommendations: HashMap<String, Vec<MoRef>>,
    tasks: HashMap<String, MockTask>,
    failures: HashMap<MockOperation, VecDeque<TaskFault>>,
    calls: Vec<MockCall>,
    /// Paths `find` does not see yet.
    unindexed: HashSet<String>,
    task_polls: u32,
    task_info_calls: usize,
    next_id: u64,
}

/// Mock inventory that simulates remote operations in-memory.
#[derive(Debug, Clone, Default)]
pub struct MockInventory {
    inner: Arc<RwLock<Inventory>>,
}

fn prefix_for(kind: MoKind) -> &'static str {
    match kind {
        MoKind::Datacenter => "datacenter",
        MoKind::Folder => "group-v",
        MoKind::ResourcePool => "resgroup",
        MoKind::VirtualApp => "resgroup-v",
        MoKind::VirtualMachine => "vm",
        MoKind::Datastore => "datastore",
        MoKind::StoragePod => "group-p",
        MoKind::Network => "network",
        MoKind::Task => "task",
    }
}

fn subtree_for(kind: MoKind) -> &'static str {
    match kind {
        MoKind::Folder | MoKind::VirtualMachine | MoKind::VirtualApp => "vm",
        MoKind::ResourcePool => "host",
        MoKind::Datastore | MoKind::StoragePod => "datastore",
        MoKind::Network => "network",
        MoKind::Datacenter | MoKind::Task => "",
    }
}

/// "/dc1/vm/apps/web" -> "/dc1"
fn datacenter_root(path: &str) -> String {
    let first = path.trim_start_matches('/').split('/').next().unwrap_or("");
    format!("/{}", first)
}

impl Inventory {
    fn next_ref(&mut self, kind: MoKind) -> MoRef {
        self.next_id += 1;
        MoRef::new(kind, format!("{}{}", prefix_for(kind), self.next_id))
    }

    fn insert(&mut self, kind: MoKind, name: &str, path: String, pool: Option<MoRef>) -> MoRef {
        let reference = self.next_ref(kind);
        self.by_path.insert(path.clone(), reference.value.clone());
        self.objects.insert(
            reference.value.clone(),
            MockObject {
                reference: reference.clone(),
                name: name.to_string(),
                path,
                pool,
            },
        );
        reference
    }

    fn object(&self, reference: &MoRef) -> InventoryResult<&MockObject> {
        self.objects
            .get(&reference.value)
            .filter(|o| o.reference.kind == reference.kind)
            .ok_or_else(|| InventoryError::NotFound {
                kind: reference.kind,
                path: reference.value.clone(),
            })
    }

    fn relocate(&mut self, moid: &str, new_path: String) {
        if let Some(object) = self.objects.get_mut(moid) {
            self.by_path.remove(&object.path);
            object.path = new_path.clone();
            self.by_path.insert(new_path, moid.to_string());
        }
    }

    fn take_failure(&mut self, operation: MockOperation) -> Option<TaskFault> {
        self.failures
            .get_mut(&operation)
            .and_then(|queue| queue.pop_front())
    }

    fn new_task(&mut self, description: &str, outcome: TaskState) -> TaskHandle {
        let reference = self.next_ref(MoKind::Task);
        self.tasks.insert(
            reference.value.clone(),
            MockTask {
                description: description.to_string(),
                remaining_polls: self.task_polls,
                outcome,
            },
        );
        TaskHandle(reference)
    }

    /// Where a new container named `name` lands: under its parent container when
    /// the target pool is one, else under the folder, else the datacenter VM folder.
    fn vapp_path(&self, target_pool: &MockObject, folder: Option<&MockObject>, name: &str) -> String {
        if target_pool.reference.kind == MoKind::VirtualApp {
            format!("{}/{}", target_pool.path, name)
        } else if let Some(folder) = folder {
            format!("{}/{}", folder.path, name)
        } else {
            format!("{}/vm/{}", datacenter_root(&target_pool.path), name)
        }
    }

    fn new_vapp(&mut self, name: &str, path: String, pool: MoRef, annotation: String) -> MoRef {
        let reference = self.insert(MoKind::VirtualApp, name, path, Some(pool));
        self.vapps.insert(
            reference.value.clone(),
            MockVApp {
                instance_uuid: Uuid::new_v4().to_string(),
                annotation,
                entity_config: Vec::new(),
                powered_on: false,
            },
        );
        reference
    }

    fn detach_from_current_vapp(&mut self, entity: &MoRef) {
        let current = self
            .objects
            .get(&entity.value)
            .and_then(|o| o.pool.clone());
        if let Some(pool) = current {
            if let Some(vapp) = self.vapps.get_mut(&pool.value) {
                vapp.entity_config.retain(|record| &record.key != entity);
            }
        }
    }

    fn move_into_pool(&mut self, pool: &MoRef, entities: &[MoRef]) -> InventoryResult<()> {
        let target = self.object(pool)?.clone();
        for entity in entities {
            self.object(entity)?;
        }
        for entity in entities {
            self.detach_from_current_vapp(entity);
            let name = self.object(entity)?.name.clone();
            if let Some(object) = self.objects.get_mut(&entity.value) {
                object.pool = Some(pool.clone());
            }
            if let Some(vapp) = self.vapps.get_mut(&pool.value) {
                vapp.entity_config
                    .push(EntityConfigRecord::with_defaults(entity.clone()));
            } else {
                continue;
            }
            self.relocate(&entity.value, format!("{}/{}", target.path, name));
        }
        Ok(())
    }

    fn remove_recursive(&mut self, moid: &str) {
        let children: Vec<String> = self
            .objects
            .values()
            .filter(|o| o.pool.as_ref().map(|p| p.value.as_str()) == Some(moid))
            .map(|o| o.reference.value.clone())
            .collect();
        for child in children {
            self.remove_recursive(&child);
        }
        if let Some(object) = self.objects.remove(moid) {
            self.by_path.remove(&object.path);
        }
        self.vapps.remove(moid);
    }
}

impl MockInventory {
    /// Create a new, empty mock inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of polls a task reports `Running` before it reaches its outcome.
    pub async fn set_task_polls(&self, polls: u32) {
        self.inner.write().await.task_polls = polls;
    }

    /// `find` misses the object at `path` until [`MockInventory::index_path`] is
    /// called, like a search index that lags behind completed tasks.
    pub async fn lag_search_index(&self, path: &str) {
        self.inner.write().await.unindexed.insert(path.to_string());
    }

    pub async fn index_path(&self, path: &str) {
        self.inner.write().await.unindexed.remove(path);
    }

    /// The next call of `operation` fails with `fault`.
    pub async fn fail_next(&self, operation: MockOperation, fault: TaskFault) {
        self.inner
            .write()
            .await
            .failures
            .entry(operation)
            .or_default()
            .push_back(fault);
    }

    pub async fn add_datacenter(&self, name: &str) -> MoRef {
        let mut inv = self.inner.write().await;
        let root = format!("/{}", name);
        let dc = inv.insert(MoKind::Datacenter, name, root.clone(), None);
        inv.insert(MoKind::Folder, "vm", format!("{}/vm", root), None);
        inv.datacenters.push(dc.value.clone());
        dc
    }

    /// Adds a VM folder at `relative` under the datacenter's VM folder.
    pub async fn add_folder(&self, datacenter: &str, relative: &str) -> MoRef {
        let mut inv = self.inner.write().await;
        let name = relative.rsplit('/').next().unwrap_or(relative).to_string();
        inv.insert(
            MoKind::Folder,
            &name,
            format!("/{}/vm/{}", datacenter, relative),
            None,
        )
    }

    /// Adds a cluster's root pool; the first one becomes the datacenter default.
    pub async fn add_cluster(&self, datacenter: &str, cluster: &str) -> MoRef {
        let mut inv = self.inner.write().await;
        let pool = inv.insert(
            MoKind::ResourcePool,
            "Resources",
            format!("/{}/host/{}/Resources", datacenter, cluster),
            None,
        );
        if let Some(dc) = inv.by_path.get(&format!("/{}", datacenter)).cloned() {
            inv.default_pools.entry(dc).or_insert(pool.value.clone());
        }
        pool
    }

    /// Adds a resource pool at `relative` under the datacenter's host folder.
    pub async fn add_resource_pool(&self, datacenter: &str, relative: &str) -> MoRef {
        let mut inv = self.inner.write().await;
        let name = relative.rsplit('/').next().unwrap_or(relative).to_string();
        inv.insert(
            MoKind::ResourcePool,
            &name,
            format!("/{}/host/{}", datacenter, relative),
            None,
        )
    }

    /// Adds a datastore; the first one becomes the datacenter default.
    pub async fn add_datastore(&self, datacenter: &str, name: &str) -> MoRef {
        let mut inv = self.inner.write().await;
        let ds = inv.insert(
            MoKind::Datastore,
            name,
            format!("/{}/datastore/{}", datacenter, name),
            None,
        );
        if let Some(dc) = inv.by_path.get(&format!("/{}", datacenter)).cloned() {
            inv.default_datastores.entry(dc).or_insert(ds.value.clone());
        }
        ds
    }

    /// Adds a storage pool whose placement query recommends `recommended`.
    pub async fn add_storage_pod(&self, datacenter: &str, name: &str, recommended: &[MoRef]) -> MoRef {
        let mut inv = self.inner.write().await;
        let pod = inv.insert(
            MoKind::StoragePod,
            name,
            format!("/{}/datastore/{}", datacenter, name),
            None,
        );
        inv.recommendations
            .insert(pod.value.clone(), recommended.to_vec());
        pod
    }

    pub async fn add_network(&self, datacenter: &str, name: &str) -> MoRef {
        let mut inv = self.inner.write().await;
        inv.insert(
            MoKind::Network,
            name,
            format!("/{}/network/{}", datacenter, name),
            None,
        )
    }

    /// Adds a VM under `folder` (relative to the VM folder, may be empty) living in `pool`.
    pub async fn add_vm(&self, datacenter: &str, folder: &str, name: &str, pool: &MoRef) -> MoRef {
        let mut inv = self.inner.write().await;
        let parent = if folder.is_empty() {
            format!("/{}/vm", datacenter)
        } else {
            format!("/{}/vm/{}", datacenter, folder)
        };
        inv.insert(
            MoKind::VirtualMachine,
            name,
            format!("{}/{}", parent, name),
            Some(pool.clone()),
        )
    }

    /// Adds an existing container holding `members`.
    pub async fn add_vapp(
        &self,
        datacenter: &str,
        folder: &str,
        name: &str,
        pool: &MoRef,
        members: &[MoRef],
    ) -> MoRef {
        let mut inv = self.inner.write().await;
        let parent = if folder.is_empty() {
            format!("/{}/vm", datacenter)
        } else {
            format!("/{}/vm/{}", datacenter, folder)
        };
        let vapp = inv.new_vapp(name, format!("{}/{}", parent, name), pool.clone(), String::new());
        // Membership setup is not a recorded call.
        let _ = inv.move_into_pool(&vapp, members);
        vapp
    }

    /// Recorded mutating calls, oldest first.
    pub async fn calls(&self) -> Vec<MockCall> {
        self.inner.read().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.inner.write().await.calls.clear();
    }

    pub async fn task_info_calls(&self) -> usize {
        self.inner.read().await.task_info_calls
    }

    pub async fn lookup(&self, path: &str) -> Option<MoRef> {
        let inv = self.inner.read().await;
        inv.by_path
            .get(path)
            .and_then(|moid| inv.objects.get(moid))
            .map(|o| o.reference.clone())
    }

    pub async fn path_of(&self, reference: &MoRef) -> Option<String> {
        let inv = self.inner.read().await;
        inv.objects.get(&reference.value).map(|o| o.path.clone())
    }

    pub async fn pool_of(&self, reference: &MoRef) -> Option<MoRef> {
        let inv = self.inner.read().await;
        inv.objects.get(&reference.value).and_then(|o| o.pool.clone())
    }

    pub async fn is_powered_on(&self, vapp: &MoRef) -> bool {
        let inv = self.inner.read().await;
        inv.vapps.get(&vapp.value).map(|v| v.powered_on).unwrap_or(false)
    }

    pub async fn set_powered_on(&self, vapp: &MoRef, on: bool) {
        if let Some(state) = self.inner.write().await.vapps.get_mut(&vapp.value) {
            state.powered_on = on;
        }
    }

    pub async fn entity_config(&self, vapp: &MoRef) -> Vec<EntityConfigRecord> {
        let inv = self.inner.read().await;
        inv.vapps
            .get(&vapp.value)
            .map(|v| v.entity_config.clone())
            .unwrap_or_default()
    }

    pub async fn annotation(&self, vapp: &MoRef) -> Option<String> {
        let inv = self.inner.read().await;
        inv.vapps.get(&vapp.value).map(|v| v.annotation.clone())
    }
}

#[async_trait]
impl InventoryClient for MockInventory {
    async fn find_datacenter(&self, name: Option<&str>) -> InventoryResult<ResolvedObject> {
        let inv = self.inner.read().await;
        let matches: Vec<&MockObject> = inv
            .datacenters
            .iter()
            .filter_map(|moid| inv.objects.get(moid))
            .filter(|o| name.map_or(true, |n| o.name == n))
            .collect();
        match matches.as_slice() {
            [only] => Ok(ResolvedObject::new(only.reference.clone(), only.path.clone())),
            [] => Err(InventoryError::NotFound {
                kind: MoKind::Datacenter,
                path: name.unwrap_or("<default>").to_string(),
            }),
            _ => Err(InventoryError::Ambiguous {
                kind: MoKind::Datacenter,
                path: name.unwrap_or("<default>").to_string(),
            }),
        }
    }

    async fn datacenter_folders(&self, datacenter: &MoRef) -> InventoryResult<DatacenterFolders> {
        let inv = self.inner.read().await;
        let root = inv.object(datacenter)?.path.clone();
        let vm_root = format!("{}/vm", root);
        let moid = inv
            .by_path
            .get(&vm_root)
            .ok_or_else(|| InventoryError::NotFound {
                kind: MoKind::Folder,
                path: vm_root.clone(),
            })?;
        let folder = &inv.objects[moid];
        Ok(DatacenterFolders {
            vm_folder: ResolvedObject::new(folder.reference.clone(), folder.path.clone()),
        })
    }

    async fn find(
        &self,
        datacenter: &MoRef,
        kind: MoKind,
        path: &str,
    ) -> InventoryResult<ResolvedObject> {
        let inv = self.inner.read().await;
        let root = inv.object(datacenter)?.path.clone();
        let base = format!("{}/{}/", root, subtree_for(kind));

        let matches: Vec<&MockObject> = if let Some(suffix) = path.strip_prefix('*') {
            inv.objects
                .values()
                .filter(|o| o.reference.kind == kind)
                .filter(|o| o.path.starts_with(&base) && o.path.ends_with(suffix))
                .filter(|o| !inv.unindexed.contains(&o.path))
                .collect()
        } else {
            let absolute = if path.starts_with('/') {
                path.to_string()
            } else {
                format!("{}{}", base, path)
            };
            inv.by_path
                .get(&absolute)
                .and_then(|moid| inv.objects.get(moid))
                .filter(|o| o.reference.kind == kind)
                .filter(|o| !inv.unindexed.contains(&o.path))
                .into_iter()
                .collect()
        };

        debug!("MockInventory: find {} {} -> {} match(es)", kind, path, matches.len());
        match matches.as_slice() {
            [only] => Ok(ResolvedObject::new(only.reference.clone(), only.path.clone())),
            [] => Err(InventoryError::NotFound {
                kind,
                path: path.to_string(),
            }),
            _ => Err(InventoryError::Ambiguous {
                kind,
                path: path.to_string(),
            }),
        }
    }

    async fn find_by_inventory_path(&self, path: &str) -> InventoryResult<Option<ResolvedObject>> {
        let inv = self.inner.read().await;
        Ok(inv
            .by_path
            .get(path)
            .and_then(|moid| inv.objects.get(moid))
            .map(|o| ResolvedObject::new(o.reference.clone(), o.path.clone())))
    }

    async fn default_resource_pool(&self, datacenter: &MoRef) -> InventoryResult<ResolvedObject> {
        let inv = self.inner.read().await;
        inv.default_pools
            .get(&datacenter.value)
            .and_then(|moid| inv.objects.get(moid))
            .map(|o| ResolvedObject::new(o.reference.clone(), o.path.clone()))
            .ok_or_else(|| InventoryError::NotFound {
                kind: MoKind::ResourcePool,
                path: "<default>".to_string(),
            })
    }

    async fn default_datastore(&self, datacenter: &MoRef) -> InventoryResult<ResolvedObject> {
        let inv = self.inner.read().await;
        inv.default_datastores
            .get(&datacenter.value)
            .and_then(|moid| inv.objects.get(moid))
            .map(|o| ResolvedObject::new(o.reference.clone(), o.path.clone()))
            .ok_or_else(|| InventoryError::NotFound {
                kind: MoKind::Datastore,
                path: "<default>".to_string(),
            })
    }

    async fn element_path(&self, reference: &MoRef) -> InventoryResult<String> {
        let mut inv = self.inner.write().await;
        if let Some(fault) = inv.take_failure(MockOperation::ElementPath) {
            return Err(InventoryError::Communication(fault.message));
        }
        Ok(inv.object(reference)?.path.clone())
    }

    async fn parent_of(&self, entity: &MoRef, _property: ParentProperty) -> InventoryResult<MoRef> {
        let inv = self.inner.read().await;
        inv.object(entity)?
            .pool
            .clone()
            .ok_or_else(|| InventoryError::NotFound {
                kind: MoKind::ResourcePool,
                path: format!("parent of {}", entity),
            })
    }

    async fn vapp_config(&self, vapp: &MoRef) -> InventoryResult<VAppConfigInfo> {
        let inv = self.inner.read().await;
        let state = inv
            .vapps
            .get(&vapp.value)
            .ok_or_else(|| InventoryError::NotFound {
                kind: MoKind::VirtualApp,
                path: vapp.value.clone(),
            })?;
        Ok(VAppConfigInfo {
            instance_uuid: state.instance_uuid.clone(),
            annotation: state.annotation.clone(),
            entity_config: state.entity_config.clone(),
        })
    }

    async fn recommend_datastores(&self, spec: &StoragePlacementSpec) -> InventoryResult<Vec<MoRef>> {
        let mut inv = self.inner.write().await;
        inv.calls.push(MockCall::RecommendDatastores(spec.clone()));
        inv.object(&spec.storage_pod)?;
        Ok(inv
            .recommendations
            .get(&spec.storage_pod.value)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_vapp(
        &self,
        pool: &MoRef,
        name: &str,
        resources: &ResourceConfigSpec,
        config: &VAppConfigSpec,
        folder: &MoRef,
    ) -> InventoryResult<MoRef> {
        let mut inv = self.inner.write().await;
        inv.calls.push(MockCall::CreateVApp {
            pool: pool.clone(),
            name: name.to_string(),
            resources: resources.clone(),
            folder: folder.clone(),
        });
        if let Some(fault) = inv.take_failure(MockOperation::CreateVApp) {
            return Err(InventoryError::Fault(fault));
        }

        let target = inv.object(pool)?.clone();
        let folder_obj = inv.object(folder)?.clone();
        let path = inv.vapp_path(&target, Some(&folder_obj), name);
        if inv.by_path.contains_key(&path) {
            return Err(InventoryError::Fault(TaskFault::new(
                FaultKind::DuplicateName,
                format!("{} already exists", path),
            )));
        }
        let annotation = config.annotation.clone().unwrap_or_default();
        let vapp = inv.new_vapp(name, path, pool.clone(), annotation);
        info!("MockInventory: Created container {} ({})", name, vapp);
        Ok(vapp)
    }

    async fn clone_vapp(
        &self,
        source: &MoRef,
        name: &str,
        target_pool: &MoRef,
        spec: &CloneSpec,
    ) -> InventoryResult<TaskHandle> {
        let mut inv = self.inner.write().await;
        inv.calls.push(MockCall::CloneVApp {
            source: source.clone(),
            name: name.to_string(),
            target_pool: target_pool.clone(),
            spec: spec.clone(),
        });
        if let Some(fault) = inv.take_failure(MockOperation::CloneVApp) {
            return Ok(inv.new_task("CloneVApp_Task", TaskState::Error(fault)));
        }

        inv.object(source)?;
        inv.object(&spec.location)?;
        let target = inv.object(target_pool)?.clone();
        let folder = match &spec.vm_folder {
            Some(folder) => Some(inv.object(folder)?.clone()),
            None => None,
        };
        let path = inv.vapp_path(&target, folder.as_ref(), name);
        if inv.by_path.contains_key(&path) {
            let fault = TaskFault::new(FaultKind::DuplicateName, format!("{} already exists", path));
            return Ok(inv.new_task("CloneVApp_Task", TaskState::Error(fault)));
        }

        let source_state = inv.vapps.get(&source.value).cloned().ok_or_else(|| {
            InventoryError::NotFound {
                kind: MoKind::VirtualApp,
                path: source.value.clone(),
            }
        })?;
        let clone = inv.new_vapp(name, path.clone(), target_pool.clone(), source_state.annotation);

        // Members are copied with their ordering.
        let mut copied = Vec::new();
        for record in &source_state.entity_config {
            let member_name = inv.object(&record.key)?.name.clone();
            let member = inv.insert(
                record.key.kind,
                &member_name,
                format!("{}/{}", path, member_name),
                Some(clone.clone()),
            );
            copied.push(EntityConfigRecord {
                key: member,
                ..record.clone()
            });
        }
        if let Some(state) = inv.vapps.get_mut(&clone.value) {
            state.entity_config = copied;
        }

        info!("MockInventory: Cloned {} into {} ({})", source, name, clone);
        Ok(inv.new_task("CloneVApp_Task", TaskState::Success { result: Some(clone) }))
    }

    async fn update_vapp_config(&self, vapp: &MoRef, spec: &VAppConfigSpec) -> InventoryResult<()> {
        let mut inv = self.inner.write().await;
        inv.calls.push(MockCall::UpdateVAppConfig {
            vapp: vapp.clone(),
            spec: spec.clone(),
        });
        if let Some(fault) = inv.take_failure(MockOperation::UpdateVAppConfig) {
            return Err(InventoryError::Fault(fault));
        }

        let state = inv
            .vapps
            .get_mut(&vapp.value)
            .ok_or_else(|| InventoryError::NotFound {
                kind: MoKind::VirtualApp,
                path: vapp.value.clone(),
            })?;
        if let Some(annotation) = &spec.annotation {
            state.annotation = annotation.clone();
        }
        if let Some(records) = &spec.entity_config {
            if let Some(stranger) = records
                .iter()
                .find(|r| !state.entity_config.iter().any(|m| m.key == r.key))
            {
                return Err(InventoryError::Fault(TaskFault::new(
                    FaultKind::InvalidState,
                    format!("{} is not a member of {}", stranger.key, vapp),
                )));
            }
            // Whole-list replacement: members missing from the list lose their ordering.
            for member in state.entity_config.iter_mut() {
                *member = records
                    .iter()
                    .find(|r| r.key == member.key)
                    .cloned()
                    .unwrap_or_else(|| EntityConfigRecord::with_defaults(member.key.clone()));
            }
        }
        Ok(())
    }

    async fn move_into_resource_pool(&self, pool: &MoRef, entities: &[MoRef]) -> InventoryResult<()> {
        let mut inv = self.inner.write().await;
        inv.calls.push(MockCall::MoveIntoResourcePool {
            pool: pool.clone(),
            entities: entities.to_vec(),
        });
        if let Some(fault) = inv.take_failure(MockOperation::MoveIntoResourcePool) {
            return Err(InventoryError::Fault(fault));
        }
        inv.move_into_pool(pool, entities)
    }

    async fn move_into_folder(&self, folder: &MoRef, entities: &[MoRef]) -> InventoryResult<TaskHandle> {
        let mut inv = self.inner.write().await;
        inv.calls.push(MockCall::MoveIntoFolder {
            folder: folder.clone(),
            entities: entities.to_vec(),
        });
        if let Some(fault) = inv.take_failure(MockOperation::MoveIntoFolder) {
            return Ok(inv.new_task("MoveIntoFolder_Task", TaskState::Error(fault)));
        }

        let folder_path = inv.object(folder)?.path.clone();
        for entity in entities {
            let name = inv.object(entity)?.name.clone();
            inv.relocate(&entity.value, format!("{}/{}", folder_path, name));
        }
        Ok(inv.new_task("MoveIntoFolder_Task", TaskState::Success { result: None }))
    }

    async fn power_on_vapp(&self, vapp: &MoRef) -> InventoryResult<TaskHandle> {
        let mut inv = self.inner.write().await;
        inv.calls.push(MockCall::PowerOn(vapp.clone()));
        if let Some(fault) = inv.take_failure(MockOperation::PowerOn) {
            return Ok(inv.new_task("PowerOnVApp_Task", TaskState::Error(fault)));
        }

        let state = inv
            .vapps
            .get_mut(&vapp.value)
            .ok_or_else(|| InventoryError::NotFound {
                kind: MoKind::VirtualApp,
                path: vapp.value.clone(),
            })?;
        let outcome = if state.powered_on {
            TaskState::Error(TaskFault::new(
                FaultKind::InvalidPowerState,
                "already in requested power state",
            ))
        } else if state.entity_config.is_empty() {
            TaskState::Error(TaskFault::new(
                FaultKind::InvalidState,
                "vApp has no entities to power on",
            ))
        } else {
            state.powered_on = true;
            TaskState::Success { result: None }
        };
        Ok(inv.new_task("PowerOnVApp_Task", outcome))
    }

    async fn power_off_vapp(&self, vapp: &MoRef, force: bool) -> InventoryResult<TaskHandle> {
        let mut inv = self.inner.write().await;
        inv.calls.push(MockCall::PowerOff {
            vapp: vapp.clone(),
            force,
        });
        if let Some(fault) = inv.take_failure(MockOperation::PowerOff) {
            return Ok(inv.new_task("PowerOffVApp_Task", TaskState::Error(fault)));
        }

        let state = inv
            .vapps
            .get_mut(&vapp.value)
            .ok_or_else(|| InventoryError::NotFound {
                kind: MoKind::VirtualApp,
                path: vapp.value.clone(),
            })?;
        let outcome = if state.powered_on {
            state.powered_on = false;
            TaskState::Success { result: None }
        } else {
            TaskState::Error(TaskFault::new(
                FaultKind::InvalidPowerState,
                "already in requested power state",
            ))
        };
        Ok(inv.new_task("PowerOffVApp_Task", outcome))
    }

    async fn destroy(&self, object: &MoRef) -> InventoryResult<TaskHandle> {
        let mut inv = self.inner.write().await;
        inv.calls.push(MockCall::Destroy(object.clone()));
        if let Some(fault) = inv.take_failure(MockOperation::Destroy) {
            return Ok(inv.new_task("Destroy_Task", TaskState::Error(fault)));
        }

        inv.object(object)?;
        if inv.vapps.get(&object.value).map(|v| v.powered_on).unwrap_or(false) {
            let fault = TaskFault::new(FaultKind::InvalidPowerState, "cannot destroy a powered-on vApp");
            return Ok(inv.new_task("Destroy_Task", TaskState::Error(fault)));
        }
        inv.remove_recursive(&object.value);
        info!("MockInventory: Destroyed {}", object);
        Ok(inv.new_task("Destroy_Task", TaskState::Success { result: None }))
    }

    async fn task_info(&self, task: &TaskHandle) -> InventoryResult<TaskInfo> {
        let mut inv = self.inner.write().await;
        inv.task_info_calls += 1;
        let entry = inv
            .tasks
            .get_mut(&task.0.value)
            .ok_or_else(|| InventoryError::NotFound {
                kind: MoKind::Task,
                path: task.0.value.clone(),
            })?;
        let state = if entry.remaining_polls > 0 {
            entry.remaining_polls -= 1;
            TaskState::Running
        } else {
            entry.outcome.clone()
        };
        Ok(TaskInfo {
            handle: task.clone(),
            state,
            description: entry.description.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn inventory() -> (MockInventory, MoRef, MoRef) {
        let mock = MockInventory::new();
        let dc = mock.add_datacenter("dc1").await;
        let pool = mock.add_cluster("dc1", "c1").await;
        (mock, dc, pool)
    }

    #[tokio::test]
    async fn test_find_relative_and_wildcard_paths() {
        let (mock, dc, pool) = inventory().await;
        let vm = mock.add_vm("dc1", "tier", "db", &pool).await;

        let found = mock.find(&dc, MoKind::VirtualMachine, "tier/db").await.unwrap();
        assert_eq!(found.reference, vm);
        assert_eq!(found.inventory_path, "/dc1/vm/tier/db");

        let cluster = mock.find(&dc, MoKind::ResourcePool, "*c1/Resources").await.unwrap();
        assert_eq!(cluster.reference, pool);

        let missing = mock.find(&dc, MoKind::VirtualMachine, "db").await;
        assert!(matches!(missing, Err(InventoryError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_default_datacenter_ambiguous_with_two() {
        let (mock, _, _) = inventory().await;
        assert!(mock.find_datacenter(None).await.is_ok());
        mock.add_datacenter("dc2").await;
        assert!(matches!(
            mock.find_datacenter(None).await,
            Err(InventoryError::Ambiguous { .. })
        ));
        assert!(mock.find_datacenter(Some("dc2")).await.is_ok());
    }

    #[tokio::test]
    async fn test_move_into_vapp_registers_member() {
        let (mock, _, pool) = inventory().await;
        let folder = mock.add_folder("dc1", "apps").await;
        let vm = mock.add_vm("dc1", "", "db", &pool).await;
        let vapp = mock
            .create_vapp(
                &pool,
                "web",
                &ResourceConfigSpec {
                    cpu: crate::ResourceAllocation::container_default(),
                    memory: crate::ResourceAllocation::container_default(),
                },
                &VAppConfigSpec::default(),
                &folder,
            )
            .await
            .unwrap();
        assert_eq!(mock.path_of(&vapp).await.unwrap(), "/dc1/vm/apps/web");

        mock.move_into_resource_pool(&vapp, &[vm.clone()]).await.unwrap();
        assert_eq!(mock.entity_config(&vapp).await.len(), 1);
        assert_eq!(mock.path_of(&vm).await.unwrap(), "/dc1/vm/apps/web/db");

        mock.move_into_resource_pool(&pool, &[vm.clone()]).await.unwrap();
        assert!(mock.entity_config(&vapp).await.is_empty());
    }

    #[tokio::test]
    async fn test_tasks_run_for_configured_polls() {
        let (mock, _, pool) = inventory().await;
        let vm = mock.add_vm("dc1", "", "db", &pool).await;
        let vapp = mock.add_vapp("dc1", "", "web", &pool, &[vm]).await;
        mock.set_task_polls(2).await;

        let task = mock.power_on_vapp(&vapp).await.unwrap();
        assert_eq!(mock.task_info(&task).await.unwrap().state, TaskState::Running);
        assert_eq!(mock.task_info(&task).await.unwrap().state, TaskState::Running);
        assert_eq!(
            mock.task_info(&task).await.unwrap().state,
            TaskState::Success { result: None }
        );
        assert!(mock.is_powered_on(&vapp).await);
    }

    #[tokio::test]
    async fn test_injected_fault_applies_once() {
        let (mock, _, pool) = inventory().await;
        let vm = mock.add_vm("dc1", "", "db", &pool).await;
        let vapp = mock.add_vapp("dc1", "", "web", &pool, &[vm]).await;
        mock.fail_next(
            MockOperation::PowerOn,
            TaskFault::new(FaultKind::Other, "host unreachable"),
        )
        .await;

        let task = mock.power_on_vapp(&vapp).await.unwrap();
        assert!(matches!(mock.task_info(&task).await.unwrap().state, TaskState::Error(_)));
        let task = mock.power_on_vapp(&vapp).await.unwrap();
        assert_eq!(
            mock.task_info(&task).await.unwrap().state,
            TaskState::Success { result: None }
        );
    }
}
