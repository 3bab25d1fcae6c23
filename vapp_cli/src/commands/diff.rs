//! Diff command - preview the entity changes the next update would apply.

use std::path::PathBuf;

use clap::Args;
use reconciler_config::load_declaration;
use serde::Serialize;
use state_store_interface::StateStore;
use tabled::Tabled;
use vapp_core::reconciliation::metadata_targets;
use vapp_shared_types::{DeclaredContainer, EntityDescriptor, MetadataScope};

use super::Context;
use crate::error::Result;
use crate::output::{self, print_data, section};
use crate::OutputFormat;

/// Arguments for the diff command.
#[derive(Args)]
pub struct DiffArgs {
    /// Declaration file (TOML)
    pub declaration: PathBuf,

    /// Stored id to compare against; defaults to the declaration's inventory path
    #[arg(long)]
    pub id: Option<String>,
}

/// What an update of `id` would do.
#[derive(Debug, Serialize)]
pub struct DiffReport {
    pub id: String,
    pub managed: bool,
    pub description_changed: bool,
    pub added: Vec<EntityDescriptor>,
    pub removed: Vec<EntityDescriptor>,
    pub modified: Vec<EntityDescriptor>,
    /// Entities whose ordering the reconfiguration would carry.
    pub metadata: Vec<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct ChangeRow {
    #[tabled(rename = "Change")]
    change: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Start Order")]
    start_order: i32,
    #[tabled(rename = "Reference")]
    reference: String,
}

impl ChangeRow {
    fn new(change: &str, entity: &EntityDescriptor) -> Self {
        ChangeRow {
            change: change.to_string(),
            name: entity.name.clone(),
            kind: entity.kind.input_name().to_string(),
            start_order: entity.ordering.start_order,
            reference: entity
                .computed
                .as_ref()
                .map(|c| c.moid.clone())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

pub async fn build_report(
    store: &dyn StateStore,
    id: &str,
    declared: &DeclaredContainer,
    scope: MetadataScope,
) -> Result<DiffReport> {
    let baseline = store.get_vapp(id).await?;
    let (previous, description_changed) = match &baseline {
        Some(stored) => (stored.entities.as_slice(), stored.description != declared.description),
        None => (&[][..], false),
    };

    let delta = vapp_core::diff(previous, &declared.entities);
    // Entities added by the update are attached first, so they carry ordering too.
    let metadata = delta
        .added
        .iter()
        .map(|e| e.name.clone())
        .chain(
            metadata_targets(scope, &[], &delta.modified, &delta.unchanged)
                .into_iter()
                .map(|e| e.name),
        )
        .collect();

    Ok(DiffReport {
        id: id.to_string(),
        managed: baseline.is_some(),
        description_changed,
        added: delta.added,
        removed: delta.removed,
        modified: delta.modified,
        metadata,
    })
}

pub async fn execute(args: DiffArgs, context: &Context) -> Result<()> {
    let declared =
        load_declaration(&args.declaration, &context.config.default_description).await?;
    let id = args.id.unwrap_or_else(|| declared.inventory_path());
    let store = context.store();
    let report = build_report(&store, &id, &declared, context.config.metadata_scope).await?;

    if let OutputFormat::Json = context.format {
        return output::print_json(&report);
    }

    if !report.managed {
        output::warn(&format!("{} has no stored state; a create would attach every entity", id));
    }
    if report.description_changed {
        output::info("description changes");
    }

    let rows: Vec<ChangeRow> = report
        .added
        .iter()
        .map(|e| ChangeRow::new("added", e))
        .chain(report.removed.iter().map(|e| ChangeRow::new("removed", e)))
        .chain(report.modified.iter().map(|e| ChangeRow::new("modified", e)))
        .collect();
    if rows.is_empty() && !report.description_changed {
        output::success(&format!("{} is up to date", id));
        return Ok(());
    }

    section(&format!("Changes to {}", id));
    print_data(&rows, context.format)?;
    if !report.metadata.is_empty() {
        output::info(&format!("ordering pushed for: {}", report.metadata.join(", ")));
    }
    Ok(())
}
