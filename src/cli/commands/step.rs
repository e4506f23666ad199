//! Step progress CLI commands.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};

use crate::cli::commands::dossier::available_steps_table;
use crate::cli::context::{parse_id, parse_optional_id, AppContext};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, FormData, Progress};
use crate::services::{StepForm, StepOutcome, StepSubmission};

/// Step progress: start, complete, skip, rollback, block, assign
#[derive(Args, Debug)]
pub struct StepArgs {
    /// Step subcommand to run
    #[command(subcommand)]
    pub command: StepCommands,
}

/// Subcommands of `step`.
#[derive(Subcommand, Debug)]
pub enum StepCommands {
    /// Start working on a step
    Start {
        /// Dossier ID
        dossier: String,
        /// Step ID
        step: String,
    },
    /// Complete a step and advance the workflow
    Complete {
        /// Dossier ID
        dossier: String,
        /// Step ID
        step: String,
        /// Form data as a JSON object
        #[arg(short, long)]
        data: Option<String>,
        /// Decision outcome for decision steps (yes or no)
        #[arg(long, value_parser = parse_decision)]
        decision: Option<bool>,
        /// Acting user ID
        #[arg(short, long)]
        actor: Option<String>,
    },
    /// Skip an optional step
    Skip {
        /// Dossier ID
        dossier: String,
        /// Step ID
        step: String,
        /// Acting user ID
        #[arg(short, long)]
        actor: Option<String>,
    },
    /// Undo the last completion of a step
    Rollback {
        /// Dossier ID
        dossier: String,
        /// Step ID
        step: String,
        /// Why the completion is undone
        #[arg(short, long)]
        reason: String,
        /// Acting user ID
        #[arg(short, long)]
        actor: String,
    },
    /// Block a step
    Block {
        /// Dossier ID
        dossier: String,
        /// Step ID
        step: String,
        /// Why the step is blocked
        #[arg(short, long)]
        reason: String,
    },
    /// Clear the blocked flag of a step
    Unblock {
        /// Dossier ID
        dossier: String,
        /// Step ID
        step: String,
    },
    /// Assign a step to a user and set its due date
    Assign {
        /// Dossier ID
        dossier: String,
        /// Step ID
        step: String,
        /// Assignee user ID
        #[arg(long)]
        to: Option<String>,
        /// Due date (RFC 3339)
        #[arg(long, value_parser = parse_due_date)]
        due: Option<DateTime<Utc>>,
    },
    /// Show the form of a step with the fields visible for its current data
    Form {
        /// Dossier ID
        dossier: String,
        /// Step ID
        step: String,
    },
}

fn parse_decision(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" => Ok(true),
        "no" | "n" | "false" => Ok(false),
        other => Err(format!("expected yes or no, got {other}")),
    }
}

fn parse_due_date(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 date: {e}"))
}

fn parse_form_data(raw: Option<&str>) -> Result<FormData> {
    let Some(raw) = raw else {
        return Ok(FormData::new());
    };
    match serde_json::from_str(raw).context("Form data must be valid JSON")? {
        serde_json::Value::Object(map) => Ok(map),
        _ => bail!("Form data must be a JSON object"),
    }
}

/// One progress row after a change.
#[derive(Debug, serde::Serialize)]
pub struct ProgressOutput {
    /// Row as persisted
    #[serde(flatten)]
    pub progress: Progress,
}

impl CommandOutput for ProgressOutput {
    fn to_human(&self) -> String {
        let p = &self.progress;
        let mut lines = vec![
            format!("Step {} on dossier {}", p.step_id, p.dossier_id),
            format!("Status: {}", p.status.as_str()),
        ];
        if p.blocked {
            lines.push(format!(
                "Blocked: {}",
                p.blocked_reason.as_deref().unwrap_or("no reason given")
            ));
        }
        if let Some(assignee) = p.assignee_id {
            lines.push(format!("Assignee: {assignee}"));
        }
        if let Some(due) = p.due_date {
            lines.push(format!("Due: {}", due.to_rfc3339()));
        }
        if let Some(ref reason) = p.rollback_reason {
            lines.push(format!("Last rollback: {reason} (count {})", p.rollback_count));
        }
        lines.join("\n")
    }
}

/// Result of completing or skipping a step.
#[derive(Debug, serde::Serialize)]
pub struct OutcomeOutput {
    /// Engine outcome, including the next step
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

impl CommandOutput for OutcomeOutput {
    fn to_human(&self) -> String {
        let o = &self.outcome;
        let next = o
            .next_step_id
            .map_or_else(|| "none".to_string(), |id| id.to_string());
        format!(
            "Step {} is now {}\nNext step: {}\nProgress: {}%\n\n{}",
            o.progress.step_id,
            o.progress.status.as_str(),
            next,
            o.state.completion_percent,
            available_steps_table(&o.state.available_steps)
        )
    }
}

/// A step form with its visible fields.
#[derive(Debug, serde::Serialize)]
pub struct FormOutput {
    /// Form as filtered for the current payload
    #[serde(flatten)]
    pub form: StepForm,
}

impl CommandOutput for FormOutput {
    fn to_human(&self) -> String {
        let f = &self.form;
        let mut lines = vec![format!("Form of step {} ({})", f.name, f.step_id)];
        if f.requires_decision {
            lines.push("A yes/no decision is required.".to_string());
        }
        for field in &f.fields {
            let value = f
                .data
                .get(&field.name)
                .map(ToString::to_string)
                .unwrap_or_default();
            lines.push(format!(
                "  {}{}: {}",
                field.label,
                if field.required { " *" } else { "" },
                value
            ));
        }
        lines.join("\n")
    }
}

/// Run a `step` subcommand.
pub async fn execute(args: StepArgs, config: Config, json_mode: bool) -> Result<()> {
    let ctx = AppContext::open(config).await?;
    let engine = &ctx.engine;

    match args.command {
        StepCommands::Start { dossier, step } => {
            let progress = engine
                .start_step(parse_id(&dossier, "dossier")?, parse_id(&step, "step")?)
                .await?;
            output(&ProgressOutput { progress }, json_mode);
        }
        StepCommands::Complete {
            dossier,
            step,
            data,
            decision,
            actor,
        } => {
            let mut submission = StepSubmission::new(parse_form_data(data.as_deref())?);
            if let Some(decision) = decision {
                submission = submission.with_decision(decision);
            }
            if let Some(actor) = parse_optional_id(actor.as_deref(), "actor")? {
                submission = submission.by(actor);
            }
            let outcome = engine
                .complete_step(parse_id(&dossier, "dossier")?, parse_id(&step, "step")?, submission)
                .await?;
            output(&OutcomeOutput { outcome }, json_mode);
        }
        StepCommands::Skip {
            dossier,
            step,
            actor,
        } => {
            let outcome = engine
                .skip_step(
                    parse_id(&dossier, "dossier")?,
                    parse_id(&step, "step")?,
                    parse_optional_id(actor.as_deref(), "actor")?,
                )
                .await?;
            output(&OutcomeOutput { outcome }, json_mode);
        }
        StepCommands::Rollback {
            dossier,
            step,
            reason,
            actor,
        } => {
            let progress = engine
                .rollback_step(
                    parse_id(&dossier, "dossier")?,
                    parse_id(&step, "step")?,
                    &reason,
                    parse_id(&actor, "actor")?,
                )
                .await?;
            output(&ProgressOutput { progress }, json_mode);
        }
        StepCommands::Block {
            dossier,
            step,
            reason,
        } => {
            let progress = engine
                .block_step(parse_id(&dossier, "dossier")?, parse_id(&step, "step")?, &reason)
                .await?;
            output(&ProgressOutput { progress }, json_mode);
        }
        StepCommands::Unblock { dossier, step } => {
            let progress = engine
                .unblock_step(parse_id(&dossier, "dossier")?, parse_id(&step, "step")?)
                .await?;
            output(&ProgressOutput { progress }, json_mode);
        }
        StepCommands::Assign {
            dossier,
            step,
            to,
            due,
        } => {
            let progress = engine
                .assign_step(
                    parse_id(&dossier, "dossier")?,
                    parse_id(&step, "step")?,
                    parse_optional_id(to.as_deref(), "assignee")?,
                    due,
                )
                .await?;
            output(&ProgressOutput { progress }, json_mode);
        }
        StepCommands::Form { dossier, step } => {
            let form = engine
                .step_form(parse_id(&dossier, "dossier")?, parse_id(&step, "step")?)
                .await?;
            output(&FormOutput { form }, json_mode);
        }
    }

    Ok(())
}
