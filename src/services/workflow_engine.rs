//! Workflow engine.
//!
//! Computes the available steps of a dossier and moves its progress through
//! the step graph of the domain's active template: completion with decision
//! branching and loop-back, skip, rollback, blocking and assignment.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult, RollbackDenial, UnavailableReason};
use crate::domain::models::{
    Dossier, FormData, FormField, Progress, ProgressStatus, Step, StepType, WorkflowTemplate,
};
use crate::domain::ports::{
    ActionContext, AutoActionDispatcher, DossierRepository, ProgressRepository,
    ProgressTransition, ProgressWrite, TemplateRepository,
};
use crate::services::progress_tracker::ProgressTracker;

/// Form payload and routing input for completing a step.
#[derive(Debug, Clone, Default)]
pub struct StepSubmission {
    /// Form payload to store on the row
    pub data: FormData,
    /// Yes/no answer for decision steps
    pub decision: Option<bool>,
    /// User completing the step
    pub actor_id: Option<Uuid>,
}

impl StepSubmission {
    /// Submission carrying `data` and nothing else.
    pub fn new(data: FormData) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Attach a yes/no answer.
    pub fn with_decision(mut self, decision: bool) -> Self {
        self.decision = Some(decision);
        self
    }

    /// Record who submitted.
    pub fn by(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }
}

/// One step a user can work on right now.
#[derive(Debug, Clone, Serialize)]
pub struct AvailableStep {
    /// Step identifier
    pub step_id: Uuid,
    /// Position in the template
    pub sequence_number: u32,
    /// Display name
    pub name: String,
    /// Kind of step
    pub step_type: StepType,
    /// `pending` when the step has no progress row yet.
    pub status: ProgressStatus,
    /// Whether the row is flagged blocked
    pub blocked: bool,
    /// Why it is blocked
    pub blocked_reason: Option<String>,
    /// Whether the step may be skipped
    pub is_optional: bool,
    /// Whether completing it needs a yes/no answer
    pub requires_decision: bool,
    /// User the step is assigned to
    pub assignee_id: Option<Uuid>,
    /// Deadline, if any
    pub due_date: Option<DateTime<Utc>>,
}

impl AvailableStep {
    fn new(step: &Step, progress: Option<&Progress>) -> Self {
        Self {
            step_id: step.id,
            sequence_number: step.sequence_number,
            name: step.name.clone(),
            step_type: step.step_type,
            status: progress.map_or(ProgressStatus::Pending, |p| p.status),
            blocked: progress.is_some_and(|p| p.blocked),
            blocked_reason: progress.and_then(|p| p.blocked_reason.clone()),
            is_optional: step.is_optional,
            requires_decision: step.requires_decision,
            assignee_id: progress.and_then(|p| p.assignee_id),
            due_date: progress.and_then(|p| p.due_date),
        }
    }
}

/// Snapshot of a dossier's position in its workflow.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    /// Dossier the snapshot describes
    pub dossier_id: Uuid,
    /// Active template of its domain
    pub template_id: Uuid,
    /// Version of that template
    pub template_version: u32,
    /// Steps a user may work on now, in sequence order
    pub available_steps: Vec<AvailableStep>,
    /// Steps completed
    pub completed: usize,
    /// Steps skipped
    pub skipped: usize,
    /// Steps in the template
    pub total: usize,
    /// Share of steps completed or skipped, rounded down.
    pub completion_percent: u8,
}

/// Result of completing or skipping a step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    /// Row of the step that was acted on
    pub progress: Progress,
    /// Step routing chose next, if any
    pub next_step_id: Option<Uuid>,
    /// Successor row as persisted, when the transition created or reopened it.
    pub next_progress: Option<Progress>,
    /// Workflow snapshot after the transition
    pub state: WorkflowState,
}

/// The form of a step with fields filtered by the current payload.
#[derive(Debug, Clone, Serialize)]
pub struct StepForm {
    /// Step identifier
    pub step_id: Uuid,
    /// Display name
    pub name: String,
    /// Whether completing it needs a yes/no answer
    pub requires_decision: bool,
    /// Fields visible for the current payload
    pub fields: Vec<FormField>,
    /// Payload stored on the row so far
    pub data: FormData,
}

fn is_listed(template: &WorkflowTemplate, step: &Step, progress: Option<&Progress>) -> bool {
    match progress {
        None => template.is_entry(step.id),
        Some(p) => match p.status {
            ProgressStatus::Completed => false,
            ProgressStatus::Skipped => !step.is_optional,
            ProgressStatus::Pending | ProgressStatus::InProgress => true,
        },
    }
}

fn ensure_actionable(
    template: &WorkflowTemplate,
    step: &Step,
    progress: Option<&Progress>,
) -> DomainResult<()> {
    let unavailable = |reason| DomainError::StepNotAvailable {
        step_id: step.id,
        reason,
    };
    match progress {
        None if !template.is_entry(step.id) => Err(unavailable(UnavailableReason::NotReached)),
        None => Ok(()),
        Some(p) => match p.status {
            ProgressStatus::Completed => Err(unavailable(UnavailableReason::AlreadyCompleted)),
            ProgressStatus::Skipped => Err(unavailable(UnavailableReason::Skipped)),
            _ if p.blocked => Err(unavailable(UnavailableReason::Blocked)),
            _ => Ok(()),
        },
    }
}

/// Drives dossiers through the active template of their domain.
///
///  Every mutating call runs one atomic progress transition, then hands the
///  completed step's auto actions to the dispatcher.
pub struct WorkflowEngine<T, P, D>
where
    T: TemplateRepository,
    P: ProgressRepository,
    D: DossierRepository,
{
    templates: Arc<T>,
    tracker: ProgressTracker<P>,
    dossiers: Arc<D>,
    dispatcher: Arc<dyn AutoActionDispatcher>,
}

impl<T, P, D> WorkflowEngine<T, P, D>
where
    T: TemplateRepository,
    P: ProgressRepository,
    D: DossierRepository,
{
    /// Engine over the given repositories and action sink.
    pub fn new(
        templates: Arc<T>,
        progress: Arc<P>,
        dossiers: Arc<D>,
        dispatcher: Arc<dyn AutoActionDispatcher>,
    ) -> Self {
        Self {
            templates,
            tracker: ProgressTracker::new(progress),
            dossiers,
            dispatcher,
        }
    }

    /// The progress tracker behind this engine.
    pub fn tracker(&self) -> &ProgressTracker<P> {
        &self.tracker
    }

    /// Steps of the active template a user may work on, in sequence order.
    pub async fn get_available_steps(&self, dossier_id: Uuid) -> DomainResult<Vec<AvailableStep>> {
        Ok(self.workflow_state(dossier_id).await?.available_steps)
    }

    /// Available steps and completion counters for a dossier.
    pub async fn workflow_state(&self, dossier_id: Uuid) -> DomainResult<WorkflowState> {
        let (_, template) = self.load(dossier_id).await?;
        let progress = self.progress_by_step(dossier_id).await?;
        Ok(Self::state_of(dossier_id, &template, &progress))
    }

    /// Move a reachable step to `in_progress`.
    pub async fn start_step(&self, dossier_id: Uuid, step_id: Uuid) -> DomainResult<Progress> {
        let (_, template) = self.load(dossier_id).await?;
        let step = self.resolve_step(&template, step_id).await?;
        let current = self.tracker.find(dossier_id, step.id).await?;
        ensure_actionable(&template, step, current.as_ref())?;

        let progress = match current {
            Some(progress) => progress,
            None => self.tracker.get_or_create(dossier_id, step.id).await?,
        };
        let started = self.tracker.start(&progress).await?;
        info!(dossier_id = %dossier_id, step_id = %step.id, "Step started");
        Ok(started)
    }

    /// Complete a step and advance the dossier along the taken edge.
    ///
    /// The completed row and its successor are written in one transaction;
    /// auto actions run only after that commit.
    pub async fn complete_step(
        &self,
        dossier_id: Uuid,
        step_id: Uuid,
        submission: StepSubmission,
    ) -> DomainResult<StepOutcome> {
        let (dossier, template) = self.load(dossier_id).await?;
        let step = self.resolve_step(&template, step_id).await?;
        let current = self.tracker.find(dossier_id, step.id).await?;
        ensure_actionable(&template, step, current.as_ref())?;

        let mut progress = current
            .clone()
            .unwrap_or_else(|| Progress::new(dossier_id, step.id));
        progress.complete(
            step,
            submission.data,
            submission.decision,
            submission.actor_id,
        )?;

        let next_step_id = step.next_for(submission.decision);
        let successor = match next_step_id {
            // A self-loop reopens the row it just completed.
            Some(next) if next == step.id => {
                progress.reopen()?;
                None
            }
            Some(next) => {
                self.advance_to(&template, dossier_id, &progress, next)
                    .await?
            }
            None => None,
        };

        let primary = match &current {
            Some(read) => ProgressWrite::update(progress, read.revision),
            None => ProgressWrite::Insert(progress),
        };
        let mut transition = ProgressTransition::single(primary);
        if let Some(write) = successor {
            transition = transition.with_successor(write);
        }

        let mut persisted = self.tracker.commit(&transition).await?.into_iter();
        let progress = persisted
            .next()
            .ok_or_else(|| DomainError::DatabaseError("transition returned no rows".to_string()))?;
        let next_progress = persisted.next();

        info!(
            dossier_id = %dossier_id,
            step_id = %step.id,
            sequence = step.sequence_number,
            decision = ?submission.decision,
            next_step_id = ?next_step_id,
            "Step completed"
        );

        self.dispatch_actions(&dossier, step, submission.actor_id)
            .await;

        let state = self.workflow_state(dossier_id).await?;
        Ok(StepOutcome {
            progress,
            next_step_id,
            next_progress,
            state,
        })
    }

    /// Skip an optional step. A linear step advances to its `next_step`.
    pub async fn skip_step(
        &self,
        dossier_id: Uuid,
        step_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> DomainResult<StepOutcome> {
        let (_, template) = self.load(dossier_id).await?;
        let step = self.resolve_step(&template, step_id).await?;
        let current = self.tracker.find(dossier_id, step.id).await?;
        ensure_actionable(&template, step, current.as_ref())?;

        let mut progress = current
            .clone()
            .unwrap_or_else(|| Progress::new(dossier_id, step.id));
        progress.skip(step)?;

        // Decision steps have no route without an outcome.
        let next_step_id = if step.requires_decision {
            None
        } else {
            step.next_step.filter(|next| *next != step.id)
        };
        let successor = match next_step_id {
            Some(next) => {
                self.advance_to(&template, dossier_id, &progress, next)
                    .await?
            }
            None => None,
        };

        let primary = match &current {
            Some(read) => ProgressWrite::update(progress, read.revision),
            None => ProgressWrite::Insert(progress),
        };
        let mut transition = ProgressTransition::single(primary);
        if let Some(write) = successor {
            transition = transition.with_successor(write);
        }

        let mut persisted = self.tracker.commit(&transition).await?.into_iter();
        let progress = persisted
            .next()
            .ok_or_else(|| DomainError::DatabaseError("transition returned no rows".to_string()))?;
        let next_progress = persisted.next();

        info!(
            dossier_id = %dossier_id,
            step_id = %step.id,
            actor_id = ?actor_id,
            "Step skipped"
        );

        let state = self.workflow_state(dossier_id).await?;
        Ok(StepOutcome {
            progress,
            next_step_id,
            next_progress,
            state,
        })
    }

    /// Undo the most recent completion of a step.
    pub async fn rollback_step(
        &self,
        dossier_id: Uuid,
        step_id: Uuid,
        reason: &str,
        actor_id: Uuid,
    ) -> DomainResult<Progress> {
        let (_, template) = self.load(dossier_id).await?;
        let step = self.resolve_step(&template, step_id).await?;

        let Some(current) = self.tracker.find(dossier_id, step.id).await? else {
            let denial = if step.is_final {
                RollbackDenial::FinalStep
            } else {
                RollbackDenial::NotCompleted
            };
            return Err(DomainError::RollbackNotAllowed {
                step_id: step.id,
                reason: denial,
            });
        };

        let rolled_back = self
            .tracker
            .rollback(&current, step, reason, actor_id)
            .await?;
        info!(
            dossier_id = %dossier_id,
            step_id = %step.id,
            actor_id = %actor_id,
            rollback_count = rolled_back.rollback_count,
            reason,
            "Step rolled back"
        );
        Ok(rolled_back)
    }

    /// Flag a step as blocked with a reason.
    pub async fn block_step(&self, dossier_id: Uuid, step_id: Uuid, reason: &str) -> DomainResult<Progress> {
        let progress = self.tracked(dossier_id, step_id).await?;
        let blocked = self.tracker.block(&progress, reason).await?;
        info!(dossier_id = %dossier_id, step_id = %step_id, reason, "Step blocked");
        Ok(blocked)
    }

    /// Clear the blocked flag of a step.
    pub async fn unblock_step(&self, dossier_id: Uuid, step_id: Uuid) -> DomainResult<Progress> {
        let progress = self.tracked(dossier_id, step_id).await?;
        let unblocked = self.tracker.unblock(&progress).await?;
        info!(dossier_id = %dossier_id, step_id = %step_id, "Step unblocked");
        Ok(unblocked)
    }

    /// Set or clear the assignee and deadline of a step.
    pub async fn assign_step(
        &self,
        dossier_id: Uuid,
        step_id: Uuid,
        assignee_id: Option<Uuid>,
        due_date: Option<DateTime<Utc>>,
    ) -> DomainResult<Progress> {
        let progress = self.tracked(dossier_id, step_id).await?;
        self.tracker.assign(&progress, assignee_id, due_date).await
    }

    /// The step's form with the fields visible for its current payload.
    pub async fn step_form(&self, dossier_id: Uuid, step_id: Uuid) -> DomainResult<StepForm> {
        let (_, template) = self.load(dossier_id).await?;
        let step = self.resolve_step(&template, step_id).await?;
        let data = self
            .tracker
            .find(dossier_id, step.id)
            .await?
            .map(|p| p.data)
            .unwrap_or_default();

        Ok(StepForm {
            step_id: step.id,
            name: step.name.clone(),
            requires_decision: step.requires_decision,
            fields: step.visible_fields(&data).cloned().collect(),
            data,
        })
    }

    // ------------------------------------------------------------------------

    async fn load(&self, dossier_id: Uuid) -> DomainResult<(Dossier, WorkflowTemplate)> {
        let dossier = self
            .dossiers
            .get(dossier_id)
            .await?
            .ok_or(DomainError::DossierNotFound(dossier_id))?;
        let template = self
            .templates
            .get_active(&dossier.domain_code)
            .await?
            .ok_or_else(|| DomainError::NoActiveTemplate(dossier.domain_code.clone()))?;
        Ok((dossier, template))
    }

    async fn resolve_step<'a>(&self, template: &'a WorkflowTemplate, step_id: Uuid) -> DomainResult<&'a Step> {
        if let Some(step) = template.step(step_id) {
            return Ok(step);
        }
        match self.templates.find_step(step_id).await? {
            Some(_) => Err(DomainError::StepNotAvailable {
                step_id,
                reason: UnavailableReason::NotInActiveTemplate,
            }),
            None => Err(DomainError::StepNotFound(step_id.to_string())),
        }
    }

    async fn tracked(&self, dossier_id: Uuid, step_id: Uuid) -> DomainResult<Progress> {
        let (_, template) = self.load(dossier_id).await?;
        let step = self.resolve_step(&template, step_id).await?;
        self.tracker.get_or_create(dossier_id, step.id).await
    }

    async fn progress_by_step(&self, dossier_id: Uuid) -> DomainResult<HashMap<Uuid, Progress>> {
        Ok(self
            .tracker
            .list(dossier_id)
            .await?
            .into_iter()
            .map(|p| (p.step_id, p))
            .collect())
    }

    /// Successor write for the edge from `source`'s step to `next`, if the
    /// edge changes anything.
    async fn advance_to(
        &self,
        template: &WorkflowTemplate,
        dossier_id: Uuid,
        source: &Progress,
        next: Uuid,
    ) -> DomainResult<Option<ProgressWrite>> {
        let from = source.step_id;
        if !template.contains(next) {
            return Err(DomainError::StepNotFound(next.to_string()));
        }

        match self.tracker.find(dossier_id, next).await? {
            None => Ok(Some(ProgressWrite::Insert(Progress::new(dossier_id, next)))),
            // A closed target is re-entered when the edge loops back, or when a
            // loop pass carries on along a cycle it closed on the earlier pass.
            // A source re-run after a rollback leaves later rows alone.
            Some(existing)
                if !existing.status.is_open()
                    && (template.is_loop_back_edge(from, next)
                        || (source.is_loop_pass() && template.edge_in_cycle(from, next))) =>
            {
                let read_at = existing.revision;
                let mut reopened = existing;
                reopened.reopen()?;
                debug!(dossier_id = %dossier_id, step_id = %next, "Loop re-entered step");
                Ok(Some(ProgressWrite::update(reopened, read_at)))
            }
            Some(_) => Ok(None),
        }
    }

    async fn dispatch_actions(&self, dossier: &Dossier, step: &Step, actor_id: Option<Uuid>) {
        if step.auto_actions.is_empty() {
            return;
        }
        let ctx = ActionContext {
            dossier_id: dossier.id,
            domain_code: dossier.domain_code.clone(),
            step_id: step.id,
            step_sequence: step.sequence_number,
            actor_id,
        };

        for action in &step.auto_actions {
            match self.dispatcher.dispatch(&ctx, action).await {
                Ok(()) => debug!(
                    dossier_id = %dossier.id,
                    step_id = %step.id,
                    action_type = action.action_type(),
                    "Auto action dispatched"
                ),
                Err(e) => warn!(
                    dossier_id = %dossier.id,
                    step_id = %step.id,
                    action_type = action.action_type(),
                    error = %e,
                    "Auto action failed"
                ),
            }
        }
    }

    fn state_of(
        dossier_id: Uuid,
        template: &WorkflowTemplate,
        progress: &HashMap<Uuid, Progress>,
    ) -> WorkflowState {
        let mut available_steps = Vec::new();
        let mut completed = 0;
        let mut skipped = 0;

        for step in template.steps() {
            let row = progress.get(&step.id);
            match row.map(|p| p.status) {
                Some(ProgressStatus::Completed) => completed += 1,
                Some(ProgressStatus::Skipped) => skipped += 1,
                _ => {}
            }
            if is_listed(template, step, row) {
                available_steps.push(AvailableStep::new(step, row));
            }
        }

        let total = template.steps().len();
        let completion_percent = if total == 0 {
            0
        } else {
            u8::try_from((completed + skipped) * 100 / total).unwrap_or(100)
        };

        WorkflowState {
            dossier_id,
            template_id: template.id,
            template_version: template.version,
            available_steps,
            completed,
            skipped,
            total,
            completion_percent,
        }
    }
}
