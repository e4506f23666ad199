//! Workflow template CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::cli::context::{parse_id, AppContext};
use crate::cli::output::{list_table, output, render_list, truncate, CommandOutput};
use crate::domain::errors::DomainError;
use crate::domain::models::{Config, Step, WorkflowTemplate};
use crate::domain::ports::TemplateRepository;
use crate::infrastructure::templates::{LoadedTemplate, TemplateLoader};

/// Workflow template management
#[derive(Args, Debug)]
pub struct TemplateArgs {
    /// Template subcommand to run
    #[command(subcommand)]
    pub command: TemplateCommands,
}

/// Subcommands of `template`.
#[derive(Subcommand, Debug)]
pub enum TemplateCommands {
    /// Import a YAML template as a new version
    Import {
        /// Path to the YAML file
        file: PathBuf,
        /// Make the imported version the domain's active template
        #[arg(long)]
        activate: bool,
    },
    /// List template versions of a domain
    List {
        /// Business domain code (e.g. JDE)
        domain: String,
    },
    /// Show a template and its step graph
    Show {
        /// Template ID
        id: String,
    },
    /// Validate a YAML template without importing it
    Validate {
        /// Path to the YAML file
        file: PathBuf,
    },
    /// Make a template version the active one for its domain
    Activate {
        /// Template ID
        id: String,
    },
}

/// Summary of one template version.
#[derive(Debug, serde::Serialize)]
pub struct TemplateOutput {
    /// Template ID
    pub id: String,
    /// Business domain code
    pub domain: String,
    /// Template name
    pub name: String,
    /// Template version
    pub version: u32,
    /// Whether this version is the domain's active one
    pub active: bool,
    /// Number of steps
    pub steps: usize,
}

impl From<&WorkflowTemplate> for TemplateOutput {
    fn from(template: &WorkflowTemplate) -> Self {
        Self {
            id: template.id.to_string(),
            domain: template.domain_code.clone(),
            name: template.name.clone(),
            version: template.version,
            active: template.active,
            steps: template.steps().len(),
        }
    }
}

impl CommandOutput for TemplateOutput {
    fn to_human(&self) -> String {
        format!(
            "Template {} v{} ({}) for {}\nID: {}\nSteps: {}",
            self.name,
            self.version,
            if self.active { "active" } else { "inactive" },
            self.domain,
            self.id,
            self.steps
        )
    }
}

/// Template versions of a domain.
#[derive(Debug, serde::Serialize)]
pub struct TemplateListOutput {
    /// Listed templates, newest version first
    pub templates: Vec<TemplateOutput>,
    /// Number of templates listed
    pub total: usize,
}

impl CommandOutput for TemplateListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "version", "name", "active", "steps"]);
        for t in &self.templates {
            table.add_row(vec![
                t.id[..8].to_string(),
                t.version.to_string(),
                truncate(&t.name, 40),
                if t.active { "yes" } else { "" }.to_string(),
                t.steps.to_string(),
            ]);
        }
        render_list("template", &table, self.total)
    }
}

/// One step in `template show`.
#[derive(Debug, serde::Serialize)]
pub struct StepRowOutput {
    /// Step ID
    pub id: String,
    /// Sequence number
    pub sequence: u32,
    /// Step name
    pub name: String,
    /// Step kind
    pub step_type: String,
    /// Sequence numbers the step can route to
    pub routes_to: Vec<u32>,
    /// Whether the step may be skipped
    pub optional: bool,
    /// Whether routing may return to an earlier step
    pub can_loop_back: bool,
    /// Whether the step ends the workflow
    pub is_final: bool,
    /// Auto action types run on completion
    pub actions: Vec<String>,
}

/// A template with its steps.
#[derive(Debug, serde::Serialize)]
pub struct TemplateDetailOutput {
    /// Template summary
    pub template: TemplateOutput,
    /// Steps in sequence order
    pub steps: Vec<StepRowOutput>,
}

impl TemplateDetailOutput {
    fn new(template: &WorkflowTemplate) -> Self {
        let sequence_of = |id| template.step(id).map(|s: &Step| s.sequence_number);
        let steps = template
            .steps()
            .iter()
            .map(|step| StepRowOutput {
                id: step.id.to_string(),
                sequence: step.sequence_number,
                name: step.name.clone(),
                step_type: step.step_type.as_str().to_string(),
                routes_to: step.successors().into_iter().filter_map(sequence_of).collect(),
                optional: step.is_optional,
                can_loop_back: step.can_loop_back,
                is_final: step.is_final,
                actions: step
                    .auto_actions
                    .iter()
                    .map(|a| a.action_type().to_string())
                    .collect(),
            })
            .collect();
        Self {
            template: TemplateOutput::from(template),
            steps,
        }
    }
}

impl CommandOutput for TemplateDetailOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["#", "name", "type", "next", "flags", "actions"]);
        for step in &self.steps {
            let mut flags = Vec::new();
            if step.optional {
                flags.push("optional");
            }
            if step.can_loop_back {
                flags.push("loop");
            }
            if step.is_final {
                flags.push("final");
            }
            let next: Vec<String> = step.routes_to.iter().map(ToString::to_string).collect();
            table.add_row(vec![
                step.sequence.to_string(),
                truncate(&step.name, 40),
                step.step_type.clone(),
                next.join(","),
                flags.join(","),
                step.actions.join(","),
            ]);
        }
        format!("{}\n\n{table}", self.template.to_human())
    }
}

/// Result of checking a YAML template without importing it.
#[derive(Debug, serde::Serialize)]
pub struct ValidationOutput {
    /// Business domain code
    pub domain: String,
    /// Template name
    pub name: String,
    /// Template version
    pub version: u32,
    /// Number of steps
    pub steps: usize,
    /// Graph warnings, one line each
    pub warnings: Vec<String>,
}

impl From<&LoadedTemplate> for ValidationOutput {
    fn from(loaded: &LoadedTemplate) -> Self {
        Self {
            domain: loaded.template.domain_code.clone(),
            name: loaded.template.name.clone(),
            version: loaded.template.version,
            steps: loaded.template.steps().len(),
            warnings: loaded.warnings.iter().map(ToString::to_string).collect(),
        }
    }
}

impl CommandOutput for ValidationOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "{} v{} for {}: {} step(s)",
            self.name, self.version, self.domain, self.steps
        )];
        if self.warnings.is_empty() {
            lines.push("No warnings.".to_string());
        } else {
            lines.push(format!("{} warning(s):", self.warnings.len()));
            lines.extend(self.warnings.iter().map(|w| format!("  - {w}")));
        }
        lines.join("\n")
    }
}

/// An imported template and its graph warnings.
#[derive(Debug, serde::Serialize)]
pub struct ImportOutput {
    /// Template as stored
    pub template: TemplateOutput,
    /// Graph warnings, one line each
    pub warnings: Vec<String>,
}

impl CommandOutput for ImportOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Imported {} v{} for {} ({})",
            self.template.name, self.template.version, self.template.domain, short_id_str(&self.template.id)
        )];
        if self.template.active {
            lines.push("Template is now active.".to_string());
        }
        lines.extend(self.warnings.iter().map(|w| format!("warning: {w}")));
        lines.join("\n")
    }
}

fn short_id_str(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Persist a loaded template, optionally making it the domain's active version.
pub async fn import_template(
    ctx: &AppContext,
    loaded: LoadedTemplate,
    activate: bool,
) -> Result<ImportOutput> {
    let LoadedTemplate { template, warnings } = loaded;
    ctx.templates
        .save(&template)
        .await
        .with_context(|| format!("Failed to save template {}", template.name))?;

    let template = if activate {
        ctx.templates.activate(template.id).await?
    } else {
        template
    };
    info!(
        template_id = %template.id,
        domain = %template.domain_code,
        version = template.version,
        "Template imported"
    );

    Ok(ImportOutput {
        template: TemplateOutput::from(&template),
        warnings: warnings.iter().map(ToString::to_string).collect(),
    })
}

fn load_file(file: &Path) -> Result<LoadedTemplate> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read template file: {}", file.display()))?;
    TemplateLoader::new(".")
        .load_from_yaml(&content)
        .with_context(|| format!("Invalid template file: {}", file.display()))
}

/// Run a `template` subcommand.
pub async fn execute(args: TemplateArgs, config: Config, json_mode: bool) -> Result<()> {
    match args.command {
        TemplateCommands::Validate { file } => {
            let loaded = load_file(&file)?;
            output(&ValidationOutput::from(&loaded), json_mode);
            Ok(())
        }
        command => {
            let ctx = AppContext::open(config).await?;
            run(&ctx, command, json_mode).await
        }
    }
}

async fn run(ctx: &AppContext, command: TemplateCommands, json_mode: bool) -> Result<()> {
    match command {
        TemplateCommands::Import { file, activate } => {
            let loaded = load_file(&file)?;
            let out = import_template(ctx, loaded, activate).await?;
            output(&out, json_mode);
        }
        TemplateCommands::List { domain } => {
            let templates = ctx.templates.list_by_domain(&domain).await?;
            let out = TemplateListOutput {
                total: templates.len(),
                templates: templates.iter().map(TemplateOutput::from).collect(),
            };
            output(&out, json_mode);
        }
        TemplateCommands::Show { id } => {
            let id = parse_id(&id, "template")?;
            let template = ctx
                .templates
                .get(id)
                .await?
                .ok_or(DomainError::TemplateNotFound(id))?;
            output(&TemplateDetailOutput::new(&template), json_mode);
        }
        TemplateCommands::Activate { id } => {
            let id = parse_id(&id, "template")?;
            let template = ctx.templates.activate(id).await?;
            info!(template_id = %template.id, "Template activated");
            output(&TemplateOutput::from(&template), json_mode);
        }
        TemplateCommands::Validate { file } => {
            let loaded = load_file(&file)?;
            output(&ValidationOutput::from(&loaded), json_mode);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::StepType;
    use uuid::Uuid;

    #[test]
    fn test_detail_lists_successor_sequences() {
        let template_id = Uuid::new_v4();
        let s3 = Step::new(template_id, 3, "Report");
        let s2 = Step::new(template_id, 2, "Visit").with_next(s3.id);
        let s1 = Step::new(template_id, 1, "Intake")
            .with_type(StepType::Decision)
            .with_decision(Some(s2.id), Some(s3.id));
        let template = WorkflowTemplate::new("JDE", "Expertise", 1).with_steps(vec![s1, s2, s3]);

        let detail = TemplateDetailOutput::new(&template);
        assert_eq!(detail.steps[0].routes_to, vec![2, 3]);
        assert_eq!(detail.steps[1].routes_to, vec![3]);
        assert!(detail.steps[2].routes_to.is_empty());
        assert!(detail.to_human().contains("Intake"));
    }
}
