//! Workflow template loader from YAML files
//!
//! Authored templates reference other steps by sequence number. The loader
//! assigns ids, resolves the references and validates the resulting graph.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::models::{
    AutoAction, FormField, GraphWarning, Step, StepType, WorkflowTemplate,
};

/// Template structure for loading workflows from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDefinition {
    /// Business domain code the template belongs to
    pub domain: String,
    /// Template display name
    pub name: String,
    /// Template version, 1 when omitted
    #[serde(default = "default_version")]
    pub version: u32,
    /// Steps in any order; `sequence` ties them together
    pub steps: Vec<StepDefinition>,
}

fn default_version() -> u32 {
    1
}

/// Template for one workflow step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Sequence number, unique within the template
    pub sequence: u32,
    /// Step display name
    pub name: String,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Step kind such as `action` or `decision`; inferred when omitted
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub step_type: Option<String>,
    /// Whether completing needs a yes/no answer
    #[serde(default)]
    pub requires_decision: bool,
    /// Whether the step may be skipped
    #[serde(default)]
    pub optional: bool,
    /// Whether routing may return to an earlier step
    #[serde(default)]
    pub can_loop_back: bool,
    /// Whether reaching this step ends the workflow
    #[serde(rename = "final", default)]
    pub is_final: bool,
    /// Sequence number of the next step (linear steps).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<u32>,
    /// Sequence number taken on a "yes" decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yes: Option<u32>,
    /// Sequence number taken on a "no" decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no: Option<u32>,
    /// Form fields shown for the step
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub form: Vec<FormField>,
    /// Auto actions run after completion
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<AutoAction>,
}

/// A converted template and the non-fatal problems found in its graph.
#[derive(Debug, Clone)]
pub struct LoadedTemplate {
    /// Template ready to persist
    pub template: WorkflowTemplate,
    /// Graph problems that do not stop loading
    pub warnings: Vec<GraphWarning>,
}

/// Loader for workflow templates
pub struct TemplateLoader {
    template_dir: PathBuf,
}

impl TemplateLoader {
    /// Loader reading YAML templates from `template_dir`.
    pub fn new<P: AsRef<Path>>(template_dir: P) -> Self {
        Self {
            template_dir: template_dir.as_ref().to_path_buf(),
        }
    }

    /// Load a template from a file, relative to the template directory.
    pub fn load_from_file<P: AsRef<Path>>(&self, filename: P) -> Result<LoadedTemplate> {
        let path = self.template_dir.join(filename);
        debug!("Loading workflow template from: {}", path.display());

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read template file: {}", path.display()))?;

        self.load_from_yaml(&content)
            .with_context(|| format!("Invalid template file: {}", path.display()))
    }

    /// Load every `.yaml`/`.yml` file of the template directory, sorted by name.
    pub fn load_all(&self) -> Result<Vec<LoadedTemplate>> {
        let entries = std::fs::read_dir(&self.template_dir).with_context(|| {
            format!("Failed to read template directory: {}", self.template_dir.display())
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext == "yaml" || ext == "yml")
            })
            .filter_map(|path| path.file_name().map(PathBuf::from))
            .collect();
        files.sort();

        files.iter().map(|name| self.load_from_file(name)).collect()
    }

    /// Load a template from a YAML string
    pub fn load_from_yaml(&self, yaml: &str) -> Result<LoadedTemplate> {
        let definition: TemplateDefinition =
            serde_yaml::from_str(yaml).context("Failed to parse YAML template")?;

        info!(
            domain = %definition.domain,
            version = definition.version,
            "Loading workflow template: {}",
            definition.name
        );

        let template = Self::definition_to_template(definition)?;
        let warnings = template.validate()?;
        for warning in &warnings {
            warn!(template = %template.name, "{warning}");
        }

        Ok(LoadedTemplate { template, warnings })
    }

    /// Convert a definition into a template with generated step ids.
    pub fn definition_to_template(definition: TemplateDefinition) -> Result<WorkflowTemplate> {
        if definition.steps.is_empty() {
            bail!("template {} declares no steps", definition.name);
        }

        let mut template = WorkflowTemplate::new(definition.domain, definition.name, definition.version);

        let mut ids: HashMap<u32, Uuid> = HashMap::new();
        for step in &definition.steps {
            if ids.insert(step.sequence, Uuid::new_v4()).is_some() {
                bail!("duplicate sequence number {} in template {}", step.sequence, template.name);
            }
        }
        let resolve = |from: u32, target: Option<u32>| -> Result<Option<Uuid>> {
            target
                .map(|seq| {
                    ids.get(&seq)
                        .copied()
                        .with_context(|| format!("step {from} points to unknown step {seq}"))
                })
                .transpose()
        };

        let mut steps = Vec::with_capacity(definition.steps.len());
        for def in definition.steps {
            let step_type = match def.step_type.as_deref() {
                Some(raw) => StepType::from_str(raw)
                    .with_context(|| format!("step {} has unknown type {raw}", def.sequence))?,
                None if def.requires_decision => StepType::Decision,
                None => StepType::default(),
            };

            steps.push(Step {
                id: ids[&def.sequence],
                template_id: template.id,
                sequence_number: def.sequence,
                name: def.name,
                description: def.description,
                step_type,
                requires_decision: def.requires_decision,
                is_optional: def.optional,
                can_loop_back: def.can_loop_back,
                is_final: def.is_final,
                form_schema: def.form,
                auto_actions: def.actions,
                next_step: resolve(def.sequence, def.next)?,
                decision_yes_next_step: resolve(def.sequence, def.yes)?,
                decision_no_next_step: resolve(def.sequence, def.no)?,
            });
        }

        template.set_steps(steps);
        Ok(template)
    }
}
