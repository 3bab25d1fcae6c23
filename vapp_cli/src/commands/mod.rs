//! CLI command implementations.

pub mod diff;
pub mod show;
pub mod validate;

use std::path::PathBuf;

use reconciler_config::{ConfigPaths, ReconcilerConfig};
use serde::Serialize;
use state_store_interface::FileStateStore;
use tabled::Tabled;
use vapp_shared_types::EntityDescriptor;

use crate::error::Result;
use crate::OutputFormat;

/// Settings shared by every command.
pub struct Context {
    pub config: ReconcilerConfig,
    pub state_dir: PathBuf,
    pub format: OutputFormat,
}

impl Context {
    pub fn new(
        config: ReconcilerConfig,
        state_dir: Option<PathBuf>,
        format: OutputFormat,
    ) -> Result<Self> {
        let state_dir = match state_dir {
            Some(dir) => dir,
            None => ConfigPaths::new()?.state_dir(),
        };
        Ok(Self {
            config,
            state_dir,
            format,
        })
    }

    pub fn store(&self) -> FileStateStore {
        FileStateStore::new(&self.state_dir)
    }
}

/// Display-friendly entity for table output.
#[derive(Debug, Serialize, Tabled)]
pub struct EntityRow {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Folder")]
    pub folder: String,
    #[tabled(rename = "Start")]
    pub start: String,
    #[tabled(rename = "Stop")]
    pub stop: String,
    #[tabled(rename = "Reference")]
    pub reference: String,
}

impl From<&EntityDescriptor> for EntityRow {
    fn from(entity: &EntityDescriptor) -> Self {
        let ordering = &entity.ordering;
        EntityRow {
            name: entity.name.clone(),
            kind: entity.kind.input_name().to_string(),
            folder: entity.folder.clone().unwrap_or_default(),
            start: format!(
                "#{} {} +{}s",
                ordering.start_order,
                ordering.start_action.map_or("none", |a| a.as_str()),
                ordering.start_delay
            ),
            stop: format!(
                "{} +{}s",
                ordering.stop_action.map_or("none", |a| a.as_str()),
                ordering.stop_delay
            ),
            reference: entity
                .computed
                .as_ref()
                .map(|c| c.moid.clone())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

pub fn entity_rows(entities: &[EntityDescriptor]) -> Vec<EntityRow> {
    entities.iter().map(EntityRow::from).collect()
}
