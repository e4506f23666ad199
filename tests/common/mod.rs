//! Common test utilities for integration tests
//!
//! Provides a fully wired engine over an in-memory database, template
//! builders and recording action dispatchers.

#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use dossier_flow::adapters::sqlite::{
    create_migrated_test_pool, SqliteDossierRepository, SqliteProgressRepository,
    SqliteTemplateRepository, SqliteTransferRepository,
};
use dossier_flow::domain::models::{
    AutoAction, BusinessDomain, Config, Dossier, Step, StepType, TransferMatrix, WorkflowTemplate,
};
use dossier_flow::domain::ports::{
    ActionContext, ActionError, AutoActionDispatcher, DossierRepository, TemplateRepository,
};
use dossier_flow::infrastructure::templates::TemplateLoader;
use dossier_flow::services::{ActionRouter, TransferCoordinator, WorkflowEngine};

pub type Engine =
    WorkflowEngine<SqliteTemplateRepository, SqliteProgressRepository, SqliteDossierRepository>;
pub type Coordinator = TransferCoordinator<SqliteDossierRepository, SqliteTransferRepository>;

/// Dispatcher that remembers every action forwarded to it.
#[derive(Default)]
pub struct RecordingDispatcher {
    seen: Mutex<Vec<(u32, String)>>,
}

impl RecordingDispatcher {
    /// `(step sequence, action type)` pairs in dispatch order.
    pub fn seen(&self) -> Vec<(u32, String)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl AutoActionDispatcher for RecordingDispatcher {
    async fn dispatch(&self, ctx: &ActionContext, action: &AutoAction) -> Result<(), ActionError> {
        self.seen
            .lock()
            .unwrap()
            .push((ctx.step_sequence, action.action_type().to_string()));
        Ok(())
    }
}

/// Dispatcher whose collaborators are all down.
pub struct FailingDispatcher;

#[async_trait]
impl AutoActionDispatcher for FailingDispatcher {
    async fn dispatch(&self, _ctx: &ActionContext, action: &AutoAction) -> Result<(), ActionError> {
        Err(ActionError::Failed {
            action_type: action.action_type().to_string(),
            message: "collaborator unavailable".to_string(),
        })
    }
}

pub struct Harness {
    pub pool: SqlitePool,
    pub templates: Arc<SqliteTemplateRepository>,
    pub progress: Arc<SqliteProgressRepository>,
    pub dossiers: Arc<SqliteDossierRepository>,
    pub transfers: Arc<SqliteTransferRepository>,
    pub coordinator: Arc<Coordinator>,
    pub engine: Engine,
    pub recorder: Arc<RecordingDispatcher>,
}

/// Engine wired with the default domains and transfer matrix; forwarded
/// actions land in `recorder`.
pub async fn setup() -> Harness {
    let recorder = Arc::new(RecordingDispatcher::default());
    setup_with(recorder.clone(), recorder).await
}

/// Engine whose forwarded actions all fail.
pub async fn setup_failing() -> Harness {
    setup_with(Arc::new(FailingDispatcher), Arc::new(RecordingDispatcher::default())).await
}

async fn setup_with(inner: Arc<dyn AutoActionDispatcher>, recorder: Arc<RecordingDispatcher>) -> Harness {
    let pool = create_migrated_test_pool().await.unwrap();
    let templates = Arc::new(SqliteTemplateRepository::new(pool.clone()));
    let progress = Arc::new(SqliteProgressRepository::new(pool.clone()));
    let dossiers = Arc::new(SqliteDossierRepository::new(pool.clone()));
    let transfers = Arc::new(SqliteTransferRepository::new(pool.clone()));

    for domain in Config::default().domains {
        dossiers.upsert_domain(&domain).await.unwrap();
    }

    let coordinator = Arc::new(TransferCoordinator::new(
        dossiers.clone(),
        transfers.clone(),
        TransferMatrix::default(),
    ));
    let router = ActionRouter::new(dossiers.clone(), coordinator.clone(), inner);
    let engine = WorkflowEngine::new(
        templates.clone(),
        progress.clone(),
        dossiers.clone(),
        Arc::new(router),
    );

    Harness {
        pool,
        templates,
        progress,
        dossiers,
        transfers,
        coordinator,
        engine,
        recorder,
    }
}

impl Harness {
    /// Save a template and make it the active one of its domain.
    pub async fn install(&self, template: WorkflowTemplate) -> WorkflowTemplate {
        self.templates.save(&template).await.unwrap();
        self.templates.activate(template.id).await.unwrap()
    }

    /// Install one of the YAML templates shipped in `templates/`.
    pub async fn install_shipped(&self, file: &str) -> WorkflowTemplate {
        let loaded = TemplateLoader::new(concat!(env!("CARGO_MANIFEST_DIR"), "/templates"))
            .load_from_file(file)
            .unwrap();
        self.install(loaded.template).await
    }

    pub async fn domain(&self, code: &str) -> BusinessDomain {
        self.dossiers.get_domain(code).await.unwrap().unwrap()
    }

    /// Owned dossier in `code`, persisted.
    pub async fn dossier(&self, code: &str, title: &str) -> Dossier {
        let dossier = Dossier::new(&self.domain(code).await, title).with_owner(Uuid::new_v4());
        self.dossiers.create(&dossier).await.unwrap();
        dossier
    }
}

/// Id of the step with the given sequence number.
pub fn step_id(template: &WorkflowTemplate, sequence: u32) -> Uuid {
    template.step_by_sequence(sequence).unwrap().id
}

/// `1 -> 2 -> ... -> n`, with step `n` final.
pub fn linear_template(domain: &str, n: u32) -> WorkflowTemplate {
    let template_id = Uuid::new_v4();
    let mut steps: Vec<Step> = Vec::new();
    for seq in (1..=n).rev() {
        let mut step = Step::new(template_id, seq, format!("Step {seq}"));
        match steps.last() {
            Some(next) => step = step.with_next(next.id),
            None => step = step.final_step(),
        }
        steps.push(step);
    }
    WorkflowTemplate::new(domain, format!("{domain} linear"), 1).with_steps(steps)
}

/// `1 -> D(2)`, yes to `A(3) -> E(5)`, no to `B(4) -> E(5)`, `E` final.
pub fn decision_template(domain: &str) -> WorkflowTemplate {
    let template_id = Uuid::new_v4();
    let end = Step::new(template_id, 5, "End").final_step();
    let no = Step::new(template_id, 4, "No branch").with_next(end.id);
    let yes = Step::new(template_id, 3, "Yes branch").with_next(end.id);
    let decision = Step::new(template_id, 2, "Decide")
        .with_type(StepType::Decision)
        .with_decision(Some(yes.id), Some(no.id));
    let entry = Step::new(template_id, 1, "Start").with_next(decision.id);
    WorkflowTemplate::new(domain, format!("{domain} decision"), 1)
        .with_steps(vec![entry, decision, yes, no, end])
}
