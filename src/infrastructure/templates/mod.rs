//! YAML workflow template authoring.

pub mod template_loader;

pub use template_loader::{LoadedTemplate, StepDefinition, TemplateDefinition, TemplateLoader};
