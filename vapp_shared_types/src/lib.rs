use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Type of a managed object in the remote inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoKind {
    Datacenter,
    Folder,
    ResourcePool,
    VirtualApp,
    VirtualMachine,
    Datastore,
    StoragePod,
    Network,
    Task,
}

impl MoKind {
    /// Name of the type as the remote API spells it.
    pub fn type_name(&self) -> &'static str {
        match self {
            MoKind::Datacenter => "Datacenter",
            MoKind::Folder => "Folder",
            MoKind::ResourcePool => "ResourcePool",
            MoKind::VirtualApp => "VirtualApp",
            MoKind::VirtualMachine => "VirtualMachine",
            MoKind::Datastore => "Datastore",
            MoKind::StoragePod => "StoragePod",
            MoKind::Network => "Network",
            MoKind::Task => "Task",
        }
    }
}

impl fmt::Display for MoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Stable reference to a remote object, e.g. `VirtualMachine:vm-123`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoRef {
    pub kind: MoKind,
    pub value: String, // the moid
}

impl MoRef {
    pub fn new(kind: MoKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

impl fmt::Display for MoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// A reference together with the inventory path it was found at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedObject {
    pub reference: MoRef,
    pub inventory_path: String, // e.g. "/dc1/vm/apps/web-01"
}

impl ResolvedObject {
    pub fn new(reference: MoRef, inventory_path: impl Into<String>) -> Self {
        Self {
            reference,
            inventory_path: inventory_path.into(),
        }
    }
}

/// Joins a parent path and a name the way inventory paths are built: an empty
/// parent yields the bare name.
pub fn join_inventory_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

// ================================================================================================
// ENTITIES
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    VirtualMachine,
    VirtualApp,
}

impl EntityKind {
    /// Parses the short form used in declarations ("vm" / "vapp").
    pub fn from_input(value: &str) -> Option<Self> {
        match value {
            "vm" => Some(EntityKind::VirtualMachine),
            "vapp" => Some(EntityKind::VirtualApp),
            _ => None,
        }
    }

    pub fn input_name(&self) -> &'static str {
        match self {
            EntityKind::VirtualMachine => "vm",
            EntityKind::VirtualApp => "vapp",
        }
    }

    pub fn mo_kind(&self) -> MoKind {
        match self {
            EntityKind::VirtualMachine => MoKind::VirtualMachine,
            EntityKind::VirtualApp => MoKind::VirtualApp,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.input_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StartAction {
    None,
    PowerOn,
}

impl StartAction {
    pub const ALL: [StartAction; 2] = [StartAction::None, StartAction::PowerOn];

    pub fn as_str(&self) -> &'static str {
        match self {
            StartAction::None => "none",
            StartAction::PowerOn => "powerOn",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopAction {
    None,
    PowerOff,
    GuestShutdown,
    Suspend,
}

impl StopAction {
    pub const ALL: [StopAction; 4] = [
        StopAction::None,
        StopAction::PowerOff,
        StopAction::GuestShutdown,
        StopAction::Suspend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StopAction::None => "none",
            StopAction::PowerOff => "powerOff",
            StopAction::GuestShutdown => "guestShutdown",
            StopAction::Suspend => "suspend",
        }
    }
}

/// Start/stop ordering of one entity inside its container.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityOrdering {
    pub start_order: i32,
    pub start_delay: i32, // seconds
    pub start_action: Option<StartAction>,
    pub stop_delay: i32, // seconds
    pub stop_action: Option<StopAction>,
    pub waiting_for_guest: Option<bool>,
    pub destroy_with_parent: Option<bool>,
}

/// Where an entity lived before it was attached, plus its remote id. Only
/// present once the entity has been attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityProvenance {
    pub moid: String,
    pub folder_path: String,
    pub resource_pool_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityIdentity {
    pub name: String,
    pub kind: EntityKind,
}

impl fmt::Display for EntityIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// One child entity of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>, // sub-folder the entity is looked up under
    #[serde(flatten)]
    pub ordering: EntityOrdering,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed: Option<EntityProvenance>,
}

impl EntityDescriptor {
    pub fn new(name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            kind,
            folder: None,
            ordering: EntityOrdering::default(),
            computed: None,
        }
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn with_ordering(mut self, ordering: EntityOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_computed(mut self, computed: EntityProvenance) -> Self {
        self.computed = Some(computed);
        self
    }

    pub fn identity(&self) -> EntityIdentity {
        EntityIdentity {
            name: self.name.clone(),
            kind: self.kind,
        }
    }

    /// Path the entity is resolved by, relative to the datacenter.
    pub fn lookup_path(&self) -> String {
        join_inventory_path(self.folder.as_deref().unwrap_or(""), &self.name)
    }

    /// Remote reference, known only after the entity has been attached.
    pub fn reference(&self) -> Option<MoRef> {
        self.computed
            .as_ref()
            .map(|c| MoRef::new(self.kind.mo_kind(), c.moid.clone()))
    }

    pub fn is_attached(&self) -> bool {
        self.computed.is_some()
    }
}

// ================================================================================================
// CONTAINER
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiskProvisioning {
    #[default]
    SameAsSource,
    Thin,
    Thick,
}

impl DiskProvisioning {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskProvisioning::SameAsSource => "sameAsSource",
            DiskProvisioning::Thin => "thin",
            DiskProvisioning::Thick => "thick",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkMapping {
    pub source_label: String,
    pub destination_label: String,
}

/// Source container a new container is cloned from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneTemplate {
    pub source_name: String,
    #[serde(default)]
    pub disk_provisioning: DiskProvisioning,
    #[serde(default)]
    pub network_mappings: Vec<NetworkMapping>,
}

/// Placement hints. All optional; precedence is decided by the location resolver.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Placement {
    pub datacenter: Option<String>,
    pub datastore: Option<String>, // a datastore or a storage pool name
    pub cluster: Option<String>,
    pub resource_pool: Option<String>,
    pub folder: Option<String>,
    pub parent_vapp: Option<String>,
}

/// The declared intent for one container, rebuilt every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredContainer {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub placement: Placement,
    #[serde(default)]
    pub template: Option<CloneTemplate>,
    #[serde(default)]
    pub entities: Vec<EntityDescriptor>,
}

impl DeclaredContainer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            placement: Placement::default(),
            template: None,
            entities: Vec::new(),
        }
    }

    /// The container's identity: `parent/name`, else `folder/name`, else `name`.
    pub fn inventory_path(&self) -> String {
        let parent = non_empty(&self.placement.parent_vapp)
            .or_else(|| non_empty(&self.placement.folder))
            .unwrap_or("");
        join_inventory_path(parent, &self.name)
    }

    /// Checks that `(name, kind)` is unique across the entity list.
    pub fn validate_entities(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entity in &self.entities {
            if !seen.insert(entity.identity()) {
                return Err(VAppError::Configuration(format!(
                    "entity {} is declared more than once",
                    entity.identity()
                )));
            }
        }
        Ok(())
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Which entities the post-attach reconfiguration carries. The remote call
/// replaces the whole ordering list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataScope {
    /// Added and modified entities only.
    #[default]
    ChangedOnly,
    /// Added, modified, and every unchanged entity that is already attached.
    AllDeclared,
}

// ================================================================================================
// ERRORS
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    InvalidPowerState,
    InvalidState,
    NotFound,
    DuplicateName,
    Other,
}

/// Terminal fault reported by a remote task or call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFault {
    pub kind: FaultKind,
    pub message: String,
}

impl TaskFault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// "Already in the requested power state".
    pub fn is_invalid_power_state(&self) -> bool {
        self.kind == FaultKind::InvalidPowerState
    }
}

impl fmt::Display for TaskFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Error)]
pub enum VAppError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: MoKind, name: String },
    #[error("{kind} is ambiguous: {name} matches more than one object")]
    Ambiguous { kind: MoKind, name: String },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Remote task fault during {operation}: {fault}")]
    RemoteTaskFault { operation: String, fault: TaskFault },
    #[error("{operation} failed after {completed}: {source}")]
    PartialApplication {
        operation: String,
        completed: String,
        #[source]
        source: Box<VAppError>,
    },
    #[error("Remote communication error: {0}")]
    Communication(String),
    #[error("State persistence error: {0}")]
    State(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VAppError {
    pub fn not_found(kind: MoKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn partial(
        operation: impl Into<String>,
        completed: impl Into<String>,
        source: VAppError,
    ) -> Self {
        Self::PartialApplication {
            operation: operation.into(),
            completed: completed.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, VAppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_path_prefers_parent_vapp() {
        let mut declared = DeclaredContainer::new("web");
        assert_eq!(declared.inventory_path(), "web");

        declared.placement.folder = Some("apps".to_string());
        assert_eq!(declared.inventory_path(), "apps/web");

        declared.placement.parent_vapp = Some("outer".to_string());
        assert_eq!(declared.inventory_path(), "outer/web");
    }

    #[test]
    fn test_empty_placement_strings_are_ignored() {
        let mut declared = DeclaredContainer::new("web");
        declared.placement.parent_vapp = Some(String::new());
        declared.placement.folder = Some("apps".to_string());
        assert_eq!(declared.inventory_path(), "apps/web");
    }

    #[test]
    fn test_duplicate_entity_identity_rejected() {
        let mut declared = DeclaredContainer::new("web");
        declared.entities = vec![
            EntityDescriptor::new("db", EntityKind::VirtualMachine),
            EntityDescriptor::new("db", EntityKind::VirtualApp),
        ];
        assert!(declared.validate_entities().is_ok());

        declared
            .entities
            .push(EntityDescriptor::new("db", EntityKind::VirtualMachine));
        let err = declared.validate_entities().unwrap_err();
        assert!(matches!(err, VAppError::Configuration(_)));
        assert!(err.to_string().contains("vm/db"));
    }

    #[test]
    fn test_entity_reference_requires_computed_fields() {
        let entity = EntityDescriptor::new("db", EntityKind::VirtualMachine).with_folder("tier");
        assert_eq!(entity.lookup_path(), "tier/db");
        assert!(entity.reference().is_none());

        let entity = entity.with_computed(EntityProvenance {
            moid: "vm-42".to_string(),
            folder_path: "/dc1/vm/tier".to_string(),
            resource_pool_path: "/dc1/host/c1/Resources".to_string(),
        });
        assert_eq!(
            entity.reference(),
            Some(MoRef::new(MoKind::VirtualMachine, "vm-42"))
        );
    }

    #[test]
    fn test_entity_descriptor_flattens_ordering() {
        let entity = EntityDescriptor::new("db", EntityKind::VirtualMachine).with_ordering(
            EntityOrdering {
                start_order: 2,
                stop_action: Some(StopAction::GuestShutdown),
                ..Default::default()
            },
        );
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["start_order"], 2);
        assert_eq!(json["stop_action"], "guestShutdown");
        assert!(json.get("computed").is_none());
    }

    #[test]
    fn test_partial_application_message_names_steps() {
        let err = VAppError::partial(
            "attach entities",
            "move into resource pool",
            VAppError::Communication("connection reset".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "attach entities failed after move into resource pool: Remote communication error: connection reset"
        );
    }
}
