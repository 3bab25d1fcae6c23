//! vApp reconciler operator CLI
//!
//! Offline tooling around declarations and the stored baselines: validate a
//! declaration, preview what the next update would change, inspect stored state.

mod commands;
mod error;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use observability::{init_tracing, TracingConfig};
use reconciler_config::ReconcilerConfig;

use crate::commands::{diff, show, validate, Context};

/// vApp reconciler operator CLI
#[derive(Parser)]
#[command(name = "vappctl")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Engine configuration file
    #[arg(short, long, global = true, env = "VAPP_CONFIG")]
    config: Option<PathBuf>,

    /// State directory of the file-backed store
    #[arg(long, global = true, env = "VAPP_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a declaration
    Validate(validate::ValidateArgs),

    /// Preview the entity changes the next update would apply
    Diff(diff::DiffArgs),

    /// Show stored baselines
    Show(show::ShowArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ReconcilerConfig::load(path).await?,
        None => ReconcilerConfig::load_or_default().await?,
    };

    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    init_tracing(
        TracingConfig::new("vappctl")
            .with_filter(filter)
            .with_json(config.logging.json)
            .with_location(cli.verbose)
            .with_span_events(cli.verbose),
    )
    .ok();

    let context = Context::new(config, cli.state_dir, cli.format)?;
    let result = match cli.command {
        Commands::Validate(args) => validate::execute(args, &context).await,
        Commands::Diff(args) => diff::execute(args, &context).await,
        Commands::Show(args) => show::execute(args, &context).await,
    };

    if let Err(e) = result {
        output::error(&e.to_string());
        std::process::exit(1);
    }

    Ok(())
}
