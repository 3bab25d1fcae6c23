use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vapp_shared_types::{
    DiskProvisioning, MoKind, MoRef, ResolvedObject, StartAction, StopAction, TaskFault, VAppError,
};

#[cfg(feature = "mock")]
pub mod mock;

/// Handle to a long-running remote operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle(pub MoRef);

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Queued,
    Running,
    Success { result: Option<MoRef> },
    Error(TaskFault),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success { .. } | TaskState::Error(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub handle: TaskHandle,
    pub state: TaskState,
    pub description: String, // e.g. "PowerOnVApp_Task"
}

/// The default VM folder of a datacenter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatacenterFolders {
    pub vm_folder: ResolvedObject,
}

/// Which property of an entity names the pool it currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParentProperty {
    /// `resourcePool` of a virtual machine.
    ResourcePool,
    /// `parent` of a nested container.
    Parent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SharesLevel {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAllocation {
    pub reservation: i64,
    pub limit: i64, // -1 is unlimited
    pub shares: SharesLevel,
    pub expandable_reservation: bool,
}

impl ResourceAllocation {
    /// Reservation 1, unlimited, normal shares, expandable.
    pub fn container_default() -> Self {
        Self {
            reservation: 1,
            limit: -1,
            shares: SharesLevel::Normal,
            expandable_reservation: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfigSpec {
    pub cpu: ResourceAllocation,
    pub memory: ResourceAllocation,
}

/// Ordering/timing record for one member of a container, keyed by its reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityConfigRecord {
    pub key: MoRef,
    pub start_order: i32,
    pub start_delay: i32,
    pub start_action: Option<StartAction>,
    pub stop_delay: i32,
    pub stop_action: Option<StopAction>,
    pub waiting_for_guest: Option<bool>,
    pub destroy_with_parent: Option<bool>,
}

impl EntityConfigRecord {
    /// The record the remote side assigns to a freshly moved-in entity.
    pub fn with_defaults(key: MoRef) -> Self {
        Self {
            key,
            start_order: 0,
            start_delay: 0,
            start_action: None,
            stop_delay: 0,
            stop_action: None,
            waiting_for_guest: None,
            destroy_with_parent: None,
        }
    }
}

/// Reconfiguration of a container. Fields left `None` are not touched;
/// `entity_config` replaces the whole list when present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VAppConfigSpec {
    pub annotation: Option<String>,
    pub entity_config: Option<Vec<EntityConfigRecord>>,
}

impl VAppConfigSpec {
    pub fn is_empty(&self) -> bool {
        self.annotation.is_none() && self.entity_config.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VAppConfigInfo {
    pub instance_uuid: String,
    pub annotation: String,
    pub entity_config: Vec<EntityConfigRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkMappingPair {
    pub source: MoRef,
    pub destination: MoRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneSpec {
    pub location: MoRef, // target datastore
    pub provisioning: DiskProvisioning,
    pub network_mapping: Vec<NetworkMappingPair>,
    pub vm_folder: Option<MoRef>, // omitted when cloning into a parent container
}

/// Storage-pool placement query for a clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoragePlacementSpec {
    pub storage_pod: MoRef,
    pub vm: MoRef, // representative entity of the source container
    pub pool: MoRef,
    pub folder: MoRef,
    pub clone_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("{kind} not found: {path}")]
    NotFound { kind: MoKind, path: String },
    #[error("{kind} path {path} matches more than one object")]
    Ambiguous { kind: MoKind, path: String },
    #[error("Remote fault: {0}")]
    Fault(TaskFault),
    #[error("Remote communication error: {0}")]
    Communication(String),
}

impl From<InventoryError> for VAppError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::NotFound { kind, path } => VAppError::NotFound { kind, name: path },
            InventoryError::Ambiguous { kind, path } => VAppError::Ambiguous { kind, name: path },
            InventoryError::Fault(fault) => VAppError::RemoteTaskFault {
                operation: "remote call".to_string(),
                fault,
            },
            InventoryError::Communication(msg) => VAppError::Communication(msg),
        }
    }
}

pub type InventoryResult<T> = std::result::Result<T, InventoryError>;

/// Trait for talking to the remote virtualization inventory.
///
/// Paths passed to `find` are relative to the datacenter, the way a finder
/// scoped to that datacenter takes them; a leading `*` matches any prefix.
/// `find_by_inventory_path` takes absolute inventory paths.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Resolves a datacenter by name, or the only datacenter when `name` is `None`.
    async fn find_datacenter(&self, name: Option<&str>) -> InventoryResult<ResolvedObject>;

    async fn datacenter_folders(&self, datacenter: &MoRef) -> InventoryResult<DatacenterFolders>;

    async fn find(
        &self,
        datacenter: &MoRef,
        kind: MoKind,
        path: &str,
    ) -> InventoryResult<ResolvedObject>;

    /// Absolute lookup. `Ok(None)` when nothing lives at `path`.
    async fn find_by_inventory_path(&self, path: &str) -> InventoryResult<Option<ResolvedObject>>;

    async fn default_resource_pool(&self, datacenter: &MoRef) -> InventoryResult<ResolvedObject>;

    async fn default_datastore(&self, datacenter: &MoRef) -> InventoryResult<ResolvedObject>;

    /// Inventory path of an arbitrary reference.
    async fn element_path(&self, reference: &MoRef) -> InventoryResult<String>;

    /// Reads the pool an entity currently lives in.
    async fn parent_of(&self, entity: &MoRef, property: ParentProperty) -> InventoryResult<MoRef>;

    async fn vapp_config(&self, vapp: &MoRef) -> InventoryResult<VAppConfigInfo>;

    async fn recommend_datastores(&self, spec: &StoragePlacementSpec) -> InventoryResult<Vec<MoRef>>;

    async fn create_vapp(
        &self,
        pool: &MoRef,
        name: &str,
        resources: &ResourceConfigSpec,
        config: &VAppConfigSpec,
        folder: &MoRef,
    ) -> InventoryResult<MoRef>;

    async fn clone_vapp(
        &self,
        source: &MoRef,
        name: &str,
        target_pool: &MoRef,
        spec: &CloneSpec,
    ) -> InventoryResult<TaskHandle>;

    async fn update_vapp_config(&self, vapp: &MoRef, spec: &VAppConfigSpec) -> InventoryResult<()>;

    /// Moves every entity in `entities` into `pool` as one batch.
    async fn move_into_resource_pool(&self, pool: &MoRef, entities: &[MoRef]) -> InventoryResult<()>;

    async fn move_into_folder(&self, folder: &MoRef, entities: &[MoRef]) -> InventoryResult<TaskHandle>;

    async fn power_on_vapp(&self, vapp: &MoRef) -> InventoryResult<TaskHandle>;

    async fn power_off_vapp(&self, vapp: &MoRef, force: bool) -> InventoryResult<TaskHandle>;

    async fn destroy(&self, object: &MoRef) -> InventoryResult<TaskHandle>;

    async fn task_info(&self, task: &TaskHandle) -> InventoryResult<TaskInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use vapp_shared_types::FaultKind;

    #[test]
    fn test_container_default_allocation() {
        let allocation = ResourceAllocation::container_default();
        assert_eq!(allocation.reservation, 1);
        assert_eq!(allocation.limit, -1);
        assert_eq!(allocation.shares, SharesLevel::Normal);
        assert!(allocation.expandable_reservation);
    }

    #[test]
    fn test_inventory_error_converts_to_vapp_error() {
        let err: VAppError = InventoryError::NotFound {
            kind: MoKind::Network,
            path: "VM Network".to_string(),
        }
        .into();
        assert!(matches!(err, VAppError::NotFound { kind: MoKind::Network, .. }));

        let err: VAppError =
            InventoryError::Fault(TaskFault::new(FaultKind::InvalidState, "busy")).into();
        assert!(matches!(err, VAppError::RemoteTaskFault { .. }));
    }

    #[test]
    fn test_task_state_terminality() {
        assert!(!TaskState::Queued.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Success { result: None }.is_terminal());
        assert!(TaskState::Error(TaskFault::new(FaultKind::Other, "x")).is_terminal());
    }

    #[test]
    fn test_empty_config_spec() {
        assert!(VAppConfigSpec::default().is_empty());
        let spec = VAppConfigSpec {
            annotation: Some("web tier".to_string()),
            ..Default::default()
        };
        assert!(!spec.is_empty());
    }
}
