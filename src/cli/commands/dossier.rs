//! Dossier CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::info;

use crate::cli::context::{parse_id, parse_optional_id, AppContext};
use crate::cli::output::{list_table, output, render_list, short_id, truncate, CommandOutput};
use crate::domain::errors::DomainError;
use crate::domain::models::{ClientInfo, Config, Dossier};
use crate::domain::ports::DossierRepository;
use crate::services::{AvailableStep, WorkflowState};

/// Dossier management
#[derive(Args, Debug)]
pub struct DossierArgs {
    /// Dossier subcommand to run
    #[command(subcommand)]
    pub command: DossierCommands,
}

/// Subcommands of `dossier`.
#[derive(Subcommand, Debug)]
pub enum DossierCommands {
    /// Create a dossier in a business domain
    Create {
        /// Business domain code (e.g. JDE)
        domain: String,
        /// Dossier title
        title: String,
        /// External reference
        #[arg(short, long)]
        reference: Option<String>,
        /// Owner user ID
        #[arg(short, long)]
        owner: Option<String>,
        /// Tags (repeatable)
        #[arg(short, long)]
        tag: Vec<String>,
    },
    /// Show dossier details
    Show {
        /// Dossier ID
        id: String,
    },
    /// List dossiers of a domain
    List {
        /// Business domain code
        domain: String,
    },
    /// Show workflow progress and the steps available right now
    State {
        /// Dossier ID
        id: String,
    },
    /// Show or replace the client information of a dossier
    ClientInfo {
        /// Dossier ID
        id: String,
        /// New client information as a JSON object
        #[arg(long)]
        set: Option<String>,
    },
}

/// One dossier as printed by `dossier` commands.
#[derive(Debug, serde::Serialize)]
pub struct DossierOutput {
    /// Dossier ID
    pub id: String,
    /// Business domain code
    pub domain: String,
    /// Dossier title
    pub title: String,
    /// External reference, if any
    pub reference: Option<String>,
    /// Free-form dossier status
    pub status: String,
    /// Tags attached to the dossier
    pub tags: Vec<String>,
    /// Owning user, if any
    pub owner_id: Option<String>,
    /// Source dossier when this one came from a transfer
    pub transferred_from: Option<String>,
    /// Creation time, RFC 3339
    pub created_at: String,
}

impl From<&Dossier> for DossierOutput {
    fn from(dossier: &Dossier) -> Self {
        Self {
            id: dossier.id.to_string(),
            domain: dossier.domain_code.clone(),
            title: dossier.title.clone(),
            reference: dossier.reference.clone(),
            status: dossier.status.clone(),
            tags: dossier.tags.clone(),
            owner_id: dossier.owner_id.map(|id| id.to_string()),
            transferred_from: dossier.transferred_from.map(|id| id.to_string()),
            created_at: dossier.created_at.to_rfc3339(),
        }
    }
}

impl CommandOutput for DossierOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Dossier: {}", self.title),
            format!("ID: {}", self.id),
            format!("Domain: {}", self.domain),
            format!("Status: {}", self.status),
        ];
        if let Some(ref reference) = self.reference {
            lines.push(format!("Reference: {reference}"));
        }
        if let Some(ref owner) = self.owner_id {
            lines.push(format!("Owner: {owner}"));
        }
        if !self.tags.is_empty() {
            lines.push(format!("Tags: {}", self.tags.join(", ")));
        }
        if let Some(ref source) = self.transferred_from {
            lines.push(format!("Transferred from: {source}"));
        }
        lines.push(format!("Created: {}", self.created_at));
        lines.join("\n")
    }
}

/// Dossiers of one domain.
#[derive(Debug, serde::Serialize)]
pub struct DossierListOutput {
    /// Listed dossiers, newest first
    pub dossiers: Vec<DossierOutput>,
    /// Number of dossiers listed
    pub total: usize,
}

impl CommandOutput for DossierListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "title", "status", "reference"]);
        for d in &self.dossiers {
            table.add_row(vec![
                d.id[..8].to_string(),
                truncate(&d.title, 40),
                d.status.clone(),
                d.reference.clone().unwrap_or_default(),
            ]);
        }
        render_list("dossier", &table, self.total)
    }
}

/// Workflow position of a dossier.
#[derive(Debug, serde::Serialize)]
pub struct StateOutput {
    /// Snapshot from the workflow engine
    #[serde(flatten)]
    pub state: WorkflowState,
}

/// Table of available steps shared by `dossier state` and `step` outputs.
pub fn available_steps_table(steps: &[AvailableStep]) -> String {
    let mut table = list_table(&["#", "step id", "name", "status", "flags", "assignee"]);
    for step in steps {
        let mut flags = Vec::new();
        if step.blocked {
            flags.push("blocked".to_string());
        }
        if step.is_optional {
            flags.push("optional".to_string());
        }
        if step.requires_decision {
            flags.push("decision".to_string());
        }
        table.add_row(vec![
            step.sequence_number.to_string(),
            step.step_id.to_string(),
            truncate(&step.name, 40),
            step.status.as_str().to_string(),
            flags.join(","),
            step.assignee_id.as_ref().map(short_id).unwrap_or_default(),
        ]);
    }
    render_list("available step", &table, steps.len())
}

impl CommandOutput for StateOutput {
    fn to_human(&self) -> String {
        let state = &self.state;
        format!(
            "Dossier {} on template v{}\nProgress: {}% ({} completed, {} skipped of {})\n\n{}",
            state.dossier_id,
            state.template_version,
            state.completion_percent,
            state.completed,
            state.skipped,
            state.total,
            available_steps_table(&state.available_steps)
        )
    }
}

/// Client info attached to a dossier.
#[derive(Debug, serde::Serialize)]
pub struct ClientInfoOutput {
    /// Dossier the info belongs to
    pub dossier_id: String,
    /// Stored client info, `null` when none
    pub data: Option<serde_json::Value>,
}

impl CommandOutput for ClientInfoOutput {
    fn to_human(&self) -> String {
        match self.data {
            Some(ref data) => format!(
                "Client info for {}:\n{}",
                self.dossier_id,
                serde_json::to_string_pretty(data).unwrap_or_default()
            ),
            None => format!("Dossier {} has no client info.", self.dossier_id),
        }
    }
}

/// Run a `dossier` subcommand.
pub async fn execute(args: DossierArgs, config: Config, json_mode: bool) -> Result<()> {
    let ctx = AppContext::open(config).await?;

    match args.command {
        DossierCommands::Create {
            domain,
            title,
            reference,
            owner,
            tag,
        } => {
            let domain = ctx
                .dossiers
                .get_domain(&domain)
                .await?
                .ok_or_else(|| DomainError::ValidationFailed(format!("unknown domain {domain}")))?;
            let mut dossier = Dossier::new(&domain, title).with_tags(tag);
            if let Some(reference) = reference {
                dossier = dossier.with_reference(reference);
            }
            if let Some(owner) = parse_optional_id(owner.as_deref(), "owner")? {
                dossier = dossier.with_owner(owner);
            }
            ctx.dossiers.create(&dossier).await?;
            info!(dossier_id = %dossier.id, domain = %dossier.domain_code, "Dossier created");
            output(&DossierOutput::from(&dossier), json_mode);
        }
        DossierCommands::Show { id } => {
            let id = parse_id(&id, "dossier")?;
            let dossier = ctx
                .dossiers
                .get(id)
                .await?
                .ok_or(DomainError::DossierNotFound(id))?;
            output(&DossierOutput::from(&dossier), json_mode);
        }
        DossierCommands::List { domain } => {
            let dossiers = ctx.dossiers.list_by_domain(&domain).await?;
            let out = DossierListOutput {
                total: dossiers.len(),
                dossiers: dossiers.iter().map(DossierOutput::from).collect(),
            };
            output(&out, json_mode);
        }
        DossierCommands::State { id } => {
            let id = parse_id(&id, "dossier")?;
            let state = ctx.engine.workflow_state(id).await?;
            output(&StateOutput { state }, json_mode);
        }
        DossierCommands::ClientInfo { id, set } => {
            let id = parse_id(&id, "dossier")?;
            if ctx.dossiers.get(id).await?.is_none() {
                return Err(DomainError::DossierNotFound(id).into());
            }
            let data = match set {
                Some(raw) => {
                    let data: serde_json::Value =
                        serde_json::from_str(&raw).context("Client info must be valid JSON")?;
                    ctx.dossiers.save_client_info(&ClientInfo::new(id, data.clone())).await?;
                    Some(data)
                }
                None => ctx.dossiers.get_client_info(id).await?.map(|info| info.data),
            };
            output(
                &ClientInfoOutput {
                    dossier_id: id.to_string(),
                    data,
                },
                json_mode,
            );
        }
    }

    Ok(())
}
