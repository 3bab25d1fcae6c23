//! Declaration parsing.
//!
//! Turns a TOML declaration into a typed [`DeclaredContainer`]. Kind and action
//! strings are checked here and nowhere else; the engine only ever sees the
//! typed values.
//!
//! ```toml
//! name = "web"
//! description = "web tier"
//!
//! [placement]
//! datacenter = "dc1"
//! cluster = "c1"
//! folder = "apps"
//!
//! [template]
//! source = "golden"
//! disk_provisioning = "thin"
//!
//! [[template.network_mapping]]
//! source = "VM Network"
//! destination = "prod"
//!
//! [[entity]]
//! name = "db"
//! type = "vm"
//! start_order = 1
//! start_action = "powerOn"
//! ```

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use vapp_shared_types::{
    CloneTemplate, DeclaredContainer, DiskProvisioning, EntityDescriptor, EntityKind,
    EntityOrdering, NetworkMapping, Placement, StartAction, StopAction,
};

use crate::error::{ConfigError, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDeclaration {
    name: String,
    description: Option<String>,
    #[serde(default)]
    placement: RawPlacement,
    template: Option<RawTemplate>,
    #[serde(default, rename = "entity")]
    entities: Vec<RawEntity>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPlacement {
    datacenter: Option<String>,
    datastore: Option<String>,
    cluster: Option<String>,
    resource_pool: Option<String>,
    folder: Option<String>,
    parent_vapp: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTemplate {
    source: String,
    disk_provisioning: Option<String>,
    #[serde(default)]
    network_mapping: Vec<RawNetworkMapping>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNetworkMapping {
    source: String,
    destination: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntity {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    folder: Option<String>,
    start_order: Option<i64>,
    start_delay: Option<i64>,
    start_action: Option<String>,
    stop_delay: Option<i64>,
    stop_action: Option<String>,
    waiting_for_guest: Option<bool>,
    destroy_with_parent: Option<bool>,
}

/// Read and validate a declaration file.
pub async fn load_declaration(
    path: impl AsRef<Path>,
    default_description: &str,
) -> Result<DeclaredContainer> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound(path.display().to_string())
        } else {
            ConfigError::Io(e)
        }
    })?;
    parse_declaration(&content, default_description)
}

/// Parse and validate a declaration.
pub fn parse_declaration(content: &str, default_description: &str) -> Result<DeclaredContainer> {
    let raw: RawDeclaration = toml::from_str(content)?;
    if raw.name.trim().is_empty() {
        return Err(ConfigError::validation("name must not be empty"));
    }

    let template = raw.template.map(convert_template).transpose()?;

    let mut seen = HashSet::new();
    let mut entities = Vec::with_capacity(raw.entities.len());
    for (index, entity) in raw.entities.into_iter().enumerate() {
        let entity = convert_entity(index, entity)?;
        if !seen.insert(entity.identity()) {
            return Err(ConfigError::validation(format!(
                "entity[{}]: {} is declared more than once",
                index,
                entity.identity()
            )));
        }
        entities.push(entity);
    }

    let placement = raw.placement;
    Ok(DeclaredContainer {
        name: raw.name,
        description: raw
            .description
            .unwrap_or_else(|| default_description.to_string()),
        placement: Placement {
            datacenter: placement.datacenter,
            datastore: placement.datastore,
            cluster: placement.cluster,
            resource_pool: placement.resource_pool,
            folder: placement.folder,
            parent_vapp: placement.parent_vapp,
        },
        template,
        entities,
    })
}

fn convert_template(raw: RawTemplate) -> Result<CloneTemplate> {
    if raw.source.trim().is_empty() {
        return Err(ConfigError::validation("template.source must not be empty"));
    }
    let disk_provisioning = match raw.disk_provisioning.as_deref() {
        None | Some("sameAsSource") => DiskProvisioning::SameAsSource,
        Some("thin") => DiskProvisioning::Thin,
        Some("thick") => DiskProvisioning::Thick,
        Some(other) => {
            return Err(ConfigError::validation(format!(
                "template.disk_provisioning: unknown mode '{}' (expected sameAsSource, thin or thick)",
                other
            )))
        }
    };
    Ok(CloneTemplate {
        source_name: raw.source,
        disk_provisioning,
        network_mappings: raw
            .network_mapping
            .into_iter()
            .map(|m| NetworkMapping {
                source_label: m.source,
                destination_label: m.destination,
            })
            .collect(),
    })
}

fn convert_entity(index: usize, raw: RawEntity) -> Result<EntityDescriptor> {
    let field = |name: &str| format!("entity[{}].{}", index, name);

    if raw.name.trim().is_empty() {
        return Err(ConfigError::validation(format!("{} must not be empty", field("name"))));
    }
    let kind = EntityKind::from_input(&raw.kind).ok_or_else(|| {
        ConfigError::validation(format!(
            "{}: unknown entity type '{}' (expected vm or vapp)",
            field("type"),
            raw.kind
        ))
    })?;

    let start_order = match raw.start_order {
        None => 0,
        Some(v) if (0..=i32::MAX as i64).contains(&v) => v as i32,
        Some(v) => {
            return Err(ConfigError::validation(format!(
                "{}: {} is outside 0..={}",
                field("start_order"),
                v,
                i32::MAX
            )))
        }
    };

    let start_action = match raw.start_action.as_deref() {
        None | Some("") => None,
        Some(value) => Some(
            StartAction::ALL
                .iter()
                .copied()
                .find(|a| a.as_str() == value)
                .ok_or_else(|| {
                    ConfigError::validation(format!(
                        "{}: unknown action '{}'",
                        field("start_action"),
                        value
                    ))
                })?,
        ),
    };
    let stop_action = match raw.stop_action.as_deref() {
        None | Some("") => None,
        Some(value) => Some(
            StopAction::ALL
                .iter()
                .copied()
                .find(|a| a.as_str() == value)
                .ok_or_else(|| {
                    ConfigError::validation(format!(
                        "{}: unknown action '{}'",
                        field("stop_action"),
                        value
                    ))
                })?,
        ),
    };

    let ordering = EntityOrdering {
        start_order,
        start_delay: delay(raw.start_delay, &field("start_delay"))?,
        start_action,
        stop_delay: delay(raw.stop_delay, &field("stop_delay"))?,
        stop_action,
        waiting_for_guest: raw.waiting_for_guest,
        destroy_with_parent: raw.destroy_with_parent,
    };

    let mut entity = EntityDescriptor::new(raw.name, kind).with_ordering(ordering);
    if let Some(folder) = raw.folder.filter(|f| !f.is_empty()) {
        entity = entity.with_folder(folder);
    }
    Ok(entity)
}

fn delay(value: Option<i64>, field: &str) -> Result<i32> {
    match value {
        None => Ok(0),
        Some(v) => i32::try_from(v)
            .map_err(|_| ConfigError::validation(format!("{}: {} does not fit in 32 bits", field, v))),
    }
}
