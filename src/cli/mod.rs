//! Command-line interface.

pub mod commands;
pub mod context;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::errors::DomainError;

/// Top-level command line.
#[derive(Parser, Debug)]
#[command(name = "dossier-flow")]
#[command(about = "Dossier workflow engine with cross-domain transfers", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file to use instead of the project layers
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize configuration, database, domains and templates
    Init(commands::init::InitArgs),
    /// Workflow template management
    Template(commands::template::TemplateArgs),
    /// Dossier management
    Dossier(commands::dossier::DossierArgs),
    /// Step progress: start, complete, skip, rollback, block, assign
    Step(commands::step::StepArgs),
    /// Cross-domain dossier transfers
    Transfer(commands::transfer::TransferArgs),
}

/// Machine-readable kind of a command failure.
pub fn error_kind(err: &anyhow::Error) -> &'static str {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<DomainError>())
        .map_or("internal", DomainError::kind)
}

/// Report a command failure and exit with a non-zero status.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({
            "error": format!("{err:#}"),
            "kind": error_kind(&err),
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}
