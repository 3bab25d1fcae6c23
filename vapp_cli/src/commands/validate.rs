//! Validate command - parse a declaration and print what it declares.

use std::path::PathBuf;

use clap::Args;
use reconciler_config::load_declaration;
use vapp_shared_types::DeclaredContainer;

use super::{entity_rows, Context};
use crate::error::Result;
use crate::output::{self, print_data, section};
use crate::OutputFormat;

/// Arguments for the validate command.
#[derive(Args)]
pub struct ValidateArgs {
    /// Declaration file (TOML)
    pub declaration: PathBuf,
}

pub async fn execute(args: ValidateArgs, context: &Context) -> Result<()> {
    let declared =
        load_declaration(&args.declaration, &context.config.default_description).await?;

    match context.format {
        OutputFormat::Json => output::print_json(&declared),
        OutputFormat::Table => {
            output::success(&format!(
                "{} is valid ({} entities)",
                args.declaration.display(),
                declared.entities.len()
            ));
            print_summary(&declared);
            section("Entities");
            print_data(&entity_rows(&declared.entities), context.format)
        }
    }
}

fn print_summary(declared: &DeclaredContainer) {
    output::info(&format!("id: {}", declared.inventory_path()));
    output::info(&format!("description: {}", declared.description));
    let placement = &declared.placement;
    let hints = [
        ("datacenter", &placement.datacenter),
        ("cluster", &placement.cluster),
        ("resource pool", &placement.resource_pool),
        ("folder", &placement.folder),
        ("parent vApp", &placement.parent_vapp),
        ("datastore", &placement.datastore),
    ];
    for (label, value) in hints {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            output::info(&format!("{}: {}", label, value));
        }
    }
    if let Some(template) = &declared.template {
        output::info(&format!(
            "clone of {} ({}, {} network mappings)",
            template.source_name,
            template.disk_provisioning.as_str(),
            template.network_mappings.len()
        ));
    }
}
