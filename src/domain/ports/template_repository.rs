//! Workflow template repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Step, WorkflowTemplate};

/// Repository interface for workflow templates and their steps.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Persist a template together with its whole step arena.
    async fn save(&self, template: &WorkflowTemplate) -> DomainResult<()>;

    /// Get a template (with steps) by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<WorkflowTemplate>>;

    /// Get the single active template of a domain.
    async fn get_active(&self, domain_code: &str) -> DomainResult<Option<WorkflowTemplate>>;

    /// List templates of a domain, newest version first. Steps are loaded.
    async fn list_by_domain(&self, domain_code: &str) -> DomainResult<Vec<WorkflowTemplate>>;

    /// Make a template the active one of its domain, deactivating the others.
    async fn activate(&self, id: Uuid) -> DomainResult<WorkflowTemplate>;

    /// Look a step up in any template.
    async fn find_step(&self, step_id: Uuid) -> DomainResult<Option<Step>>;
}
