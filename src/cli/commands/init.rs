//! Implementation of the `dossier-flow init` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::cli::commands::template::import_template;
use crate::cli::context::AppContext;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::domain::ports::{DossierRepository, TemplateRepository};
use crate::infrastructure::config::PROJECT_DIR;
use crate::infrastructure::templates::TemplateLoader;

/// Initialize configuration, database, domains and templates
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing project configuration file
    #[arg(long, short)]
    pub force: bool,

    /// Do not import templates from the templates directory
    #[arg(long)]
    pub no_templates: bool,
}

/// What `init` set up.
#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    /// Summary line
    pub message: String,
    /// Project configuration file
    pub config_path: PathBuf,
    /// Whether the file was (re)written
    pub config_written: bool,
    /// Database that was opened and migrated
    pub database_path: String,
    /// Business domain codes registered
    pub domains: Vec<String>,
    /// Templates imported and activated
    pub templates_imported: Vec<String>,
    /// Templates left out because a version already existed
    pub templates_skipped: Vec<String>,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if self.config_written {
            lines.push(format!("\nWrote {}", self.config_path.display()));
        }
        lines.push(format!("Database ready at {}", self.database_path));
        lines.push(format!("Domains: {}", self.domains.join(", ")));
        if !self.templates_imported.is_empty() {
            lines.push("\nImported templates:".to_string());
            lines.extend(self.templates_imported.iter().map(|t| format!("  - {t}")));
        }
        if !self.templates_skipped.is_empty() {
            lines.push("\nAlready present:".to_string());
            lines.extend(self.templates_skipped.iter().map(|t| format!("  - {t}")));
        }
        lines.join("\n")
    }
}

/// Run `init`.
pub async fn execute(args: InitArgs, config: Config, json_mode: bool) -> Result<()> {
    let project_dir = Path::new(PROJECT_DIR);
    fs::create_dir_all(project_dir)
        .await
        .with_context(|| format!("Failed to create {PROJECT_DIR}"))?;

    let config_path = project_dir.join("config.yaml");
    let config_written = if !config_path.exists() || args.force {
        let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
        fs::write(&config_path, yaml)
            .await
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        true
    } else {
        false
    };

    let ctx = AppContext::open(config).await?;

    let mut domains = Vec::new();
    for domain in &ctx.config.domains {
        ctx.dossiers.upsert_domain(domain).await?;
        domains.push(domain.code.clone());
    }

    let mut templates_imported = Vec::new();
    let mut templates_skipped = Vec::new();
    let templates_dir = Path::new(&ctx.config.templates_dir);
    if args.no_templates {
        info!("Template import disabled");
    } else if templates_dir.is_dir() {
        for loaded in TemplateLoader::new(templates_dir).load_all()? {
            let label = format!(
                "{} v{} ({})",
                loaded.template.name, loaded.template.version, loaded.template.domain_code
            );
            let existing = ctx.templates.list_by_domain(&loaded.template.domain_code).await?;
            if existing.iter().any(|t| t.version == loaded.template.version) {
                templates_skipped.push(label);
                continue;
            }
            let activate = !existing.iter().any(|t| t.active);
            import_template(&ctx, loaded, activate).await?;
            templates_imported.push(label);
        }
    } else {
        warn!(dir = %templates_dir.display(), "Templates directory not found, nothing imported");
    }

    let out = InitOutput {
        message: "Project initialized successfully.".to_string(),
        config_path,
        config_written,
        database_path: ctx.config.database.path.clone(),
        domains,
        templates_imported,
        templates_skipped,
    };
    output(&out, json_mode);
    Ok(())
}
