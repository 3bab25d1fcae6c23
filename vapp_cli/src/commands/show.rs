//! Show command - print stored baselines.

use clap::Args;
use serde::Serialize;
use state_store_interface::{StateStore, StoredVApp};
use tabled::Tabled;
use tracing::debug;

use super::{entity_rows, Context};
use crate::error::{CliError, Result};
use crate::output::{self, print_data, section};
use crate::OutputFormat;

/// Arguments for the show command.
#[derive(Args)]
pub struct ShowArgs {
    /// Stored id (inventory path, e.g. `apps/web`); lists every stored vApp when omitted
    pub id: Option<String>,
}

/// Display-friendly stored vApp for table output.
#[derive(Debug, Serialize, Tabled)]
struct VAppRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Reference")]
    reference: String,
    #[tabled(rename = "Entities")]
    entities: usize,
    #[tabled(rename = "Attached")]
    attached: usize,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl From<&StoredVApp> for VAppRow {
    fn from(v: &StoredVApp) -> Self {
        VAppRow {
            id: v.id.clone(),
            reference: v
                .reference
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string()),
            entities: v.entities.len(),
            attached: v.entities.iter().filter(|e| e.is_attached()).count(),
            updated: v.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

pub async fn execute(args: ShowArgs, context: &Context) -> Result<()> {
    let store = context.store();
    debug!(state_dir = %context.state_dir.display(), "reading stored baselines");

    let Some(id) = args.id else {
        let mut all = store.list_vapps().await?;
        all.sort_by(|a, b| a.id.cmp(&b.id));
        return match context.format {
            OutputFormat::Json => output::print_json(&all),
            OutputFormat::Table => {
                let rows: Vec<VAppRow> = all.iter().map(VAppRow::from).collect();
                print_data(&rows, context.format)
            }
        };
    };

    let stored = store
        .get_vapp(&id)
        .await?
        .ok_or_else(|| CliError::NotManaged(id.clone()))?;
    if let Some(journal) = store.get_journal(&id).await? {
        output::warn(&format!(
            "an interrupted {:?} started at {} has not finished",
            journal.operation, journal.started_at
        ));
    }

    match context.format {
        OutputFormat::Json => output::print_json(&stored),
        OutputFormat::Table => {
            print_data(&[VAppRow::from(&stored)], context.format)?;
            if !stored.description.is_empty() {
                output::info(&format!("description: {}", stored.description));
            }
            if let Some(uuid) = &stored.instance_uuid {
                output::info(&format!("instance uuid: {}", uuid));
            }
            section("Entities");
            print_data(&entity_rows(&stored.entities), context.format)
        }
    }
}
