//! Cross-domain transfer CLI commands.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::cli::context::{parse_id, AppContext};
use crate::cli::output::{list_table, output, render_list, short_id, CommandOutput};
use crate::domain::models::{Config, DossierTransfer};

/// Cross-domain dossier transfers
#[derive(Args, Debug)]
pub struct TransferArgs {
    /// Transfer subcommand to run
    #[command(subcommand)]
    pub command: TransferCommands,
}

/// Subcommands of `transfer`.
#[derive(Subcommand, Debug)]
pub enum TransferCommands {
    /// Duplicate a dossier into another business domain
    Run {
        /// Source dossier ID
        dossier: String,
        /// Target domain code
        target: String,
        /// Acting user ID
        #[arg(short, long)]
        actor: String,
    },
    /// List transfers a dossier took part in
    History {
        /// Dossier ID
        dossier: String,
    },
    /// Show one transfer
    Show {
        /// Transfer ID
        id: String,
    },
    /// Mark transfers stuck in progress as failed
    Reconcile {
        /// Age in minutes after which an in-progress transfer is stale
        #[arg(long, default_value = "30")]
        older_than_minutes: i64,
    },
}

/// One ledger row.
#[derive(Debug, serde::Serialize)]
pub struct TransferOutput {
    /// Ledger row
    #[serde(flatten)]
    pub transfer: DossierTransfer,
}

impl CommandOutput for TransferOutput {
    fn to_human(&self) -> String {
        let t = &self.transfer;
        let mut lines = vec![
            format!("Transfer {}", t.id),
            format!("{} -> {} ({})", t.source_domain, t.target_domain, t.status),
            format!("Source dossier: {}", t.source_dossier_id),
        ];
        if let Some(target) = t.target_dossier_id {
            lines.push(format!("Target dossier: {target}"));
        }
        if let Some(ref error) = t.error_message {
            lines.push(format!("Error: {error}"));
        }
        lines.join("\n")
    }
}

/// Result of a completed transfer.
#[derive(Debug, serde::Serialize)]
pub struct TransferRunOutput {
    /// Ledger row, now `completed`
    pub transfer: DossierTransfer,
    /// Dossier created in the target domain
    pub target_dossier_id: String,
    /// Whether client info was copied
    pub client_info_copied: bool,
}

impl CommandOutput for TransferRunOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Dossier transferred to {} as {}",
            self.transfer.target_domain, self.target_dossier_id
        )];
        if !self.client_info_copied && self.transfer.metadata.had_client_info {
            lines.push("Client info could not be copied; see logs.".to_string());
        }
        lines.join("\n")
    }
}

/// Transfer history of a dossier.
#[derive(Debug, serde::Serialize)]
pub struct TransferListOutput {
    /// Ledger rows, oldest first
    pub transfers: Vec<DossierTransfer>,
    /// Number of rows
    pub total: usize,
}

impl CommandOutput for TransferListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "from", "to", "status", "target dossier", "created"]);
        for t in &self.transfers {
            table.add_row(vec![
                short_id(&t.id),
                t.source_domain.clone(),
                t.target_domain.clone(),
                t.status.to_string(),
                t.target_dossier_id.as_ref().map(short_id).unwrap_or_default(),
                t.created_at.format("%Y-%m-%d %H:%M").to_string(),
            ]);
        }
        render_list("transfer", &table, self.total)
    }
}

/// Run a `transfer` subcommand.
pub async fn execute(args: TransferArgs, config: Config, json_mode: bool) -> Result<()> {
    let ctx = AppContext::open(config).await?;

    match args.command {
        TransferCommands::Run {
            dossier,
            target,
            actor,
        } => {
            let outcome = ctx
                .coordinator
                .transfer(parse_id(&dossier, "dossier")?, &target, parse_id(&actor, "actor")?)
                .await?;
            let out = TransferRunOutput {
                target_dossier_id: outcome.target_dossier.id.to_string(),
                client_info_copied: outcome.client_info_copied,
                transfer: outcome.transfer,
            };
            output(&out, json_mode);
        }
        TransferCommands::History { dossier } => {
            let transfers = ctx.coordinator.history(parse_id(&dossier, "dossier")?).await?;
            let out = TransferListOutput {
                total: transfers.len(),
                transfers,
            };
            output(&out, json_mode);
        }
        TransferCommands::Show { id } => {
            let transfer = ctx.coordinator.get(parse_id(&id, "transfer")?).await?;
            output(&TransferOutput { transfer }, json_mode);
        }
        TransferCommands::Reconcile { older_than_minutes } => {
            let failed = ctx
                .coordinator
                .reconcile_stale(chrono::Duration::minutes(older_than_minutes.max(0)))
                .await?;
            let out = TransferListOutput {
                total: failed.len(),
                transfers: failed,
            };
            output(&out, json_mode);
        }
    }

    Ok(())
}
