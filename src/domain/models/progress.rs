//! Per-dossier step progress and its state machine.
//!
//! Status moves `pending -> in_progress -> completed`, with the side exits
//! `pending|in_progress -> skipped` for optional steps and
//! `completed -> pending` through rollback or a loop-back reopen. `blocked`
//! is a flag beside the status, never a status of its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::step::{FormData, Step};
use crate::domain::errors::{DomainError, DomainResult, RollbackDenial};

/// Execution status of one step for one dossier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    /// Reached but not started, or sent back by rollback or a loop.
    Pending,
    /// Started and not yet finished.
    InProgress,
    /// Finished; the form payload and decision are recorded.
    Completed,
    /// Passed over; only optional steps get here.
    Skipped,
}

impl Default for ProgressStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl ProgressStatus {
    /// Stored name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
        }
    }

    /// Parse a stored status name.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" | "complete" => Some(Self::Completed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Whether work can still be recorded against the step.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    /// Valid forward transitions. Rollback and reopen are handled separately.
    pub fn valid_transitions(&self) -> Vec<ProgressStatus> {
        match self {
            Self::Pending => vec![Self::InProgress, Self::Completed, Self::Skipped],
            Self::InProgress => vec![Self::Completed, Self::Skipped],
            Self::Completed | Self::Skipped => vec![],
        }
    }

    /// Whether `new_status` is a valid forward move from this status.
    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one step within one dossier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Unique identifier.
    pub id: Uuid,
    /// Dossier the row belongs to.
    pub dossier_id: Uuid,
    /// Step the row tracks.
    pub step_id: Uuid,
    /// Current execution status.
    pub status: ProgressStatus,
    /// Work is on hold; the step is listed but cannot be acted on.
    pub blocked: bool,
    /// Why the step is on hold.
    pub blocked_reason: Option<String>,
    /// User responsible for the step.
    pub assignee_id: Option<Uuid>,
    /// When the step should be finished.
    pub due_date: Option<DateTime<Utc>>,
    /// First time the step was started or completed.
    pub started_at: Option<DateTime<Utc>>,
    /// Set exactly while the status is `completed`.
    pub completed_at: Option<DateTime<Utc>>,
    /// Actor of the latest completion.
    pub completed_by: Option<Uuid>,
    /// Form payload of the latest completion.
    pub data: FormData,
    /// Outcome of the latest completion of a decision step.
    pub decision: Option<bool>,
    /// Reason given for the latest rollback.
    pub rollback_reason: Option<String>,
    /// Time of the latest rollback; cleared by the next completion.
    pub rolled_back_at: Option<DateTime<Utc>>,
    /// Actor of the latest rollback.
    pub rolled_back_by: Option<Uuid>,
    /// Number of rollbacks over the row's lifetime.
    pub rollback_count: u32,
    /// Set when a loop pass sent the row back to `pending`; cleared by rollback.
    pub reopened_at: Option<DateTime<Utc>>,
    /// Bumped by every persisted write; guards against lost updates.
    pub revision: u32,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Progress {
    /// A fresh `pending` row.
    pub fn new(dossier_id: Uuid, step_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            dossier_id,
            step_id,
            status: ProgressStatus::Pending,
            blocked: false,
            blocked_reason: None,
            assignee_id: None,
            due_date: None,
            started_at: None,
            completed_at: None,
            completed_by: None,
            data: FormData::new(),
            decision: None,
            rollback_reason: None,
            rolled_back_at: None,
            rolled_back_by: None,
            rollback_count: 0,
            reopened_at: None,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn invalid(&self, to: ProgressStatus, reason: impl Into<String>) -> DomainError {
        DomainError::InvalidStateTransition {
            from: self.status.to_string(),
            to: to.to_string(),
            reason: reason.into(),
        }
    }

    fn ensure_step(&self, step: &Step) -> DomainResult<()> {
        if step.id == self.step_id {
            Ok(())
        } else {
            Err(DomainError::ValidationFailed(format!(
                "progress {} tracks step {}, not {}",
                self.id, self.step_id, step.id
            )))
        }
    }

    /// pending -> in_progress.
    pub fn start(&mut self) -> DomainResult<()> {
        if self.status != ProgressStatus::Pending {
            return Err(self.invalid(ProgressStatus::InProgress, "only pending steps can start"));
        }
        self.status = ProgressStatus::InProgress;
        let now = Utc::now();
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.updated_at = now;
        Ok(())
    }

    /// pending|in_progress -> completed.
    ///
    /// The decision is mandatory on a decision step and forbidden elsewhere.
    pub fn complete(
        &mut self,
        step: &Step,
        data: FormData,
        decision: Option<bool>,
        actor_id: Option<Uuid>,
    ) -> DomainResult<()> {
        self.ensure_step(step)?;
        match (step.requires_decision, decision) {
            (true, None) => return Err(DomainError::DecisionRequired(step.id)),
            (false, Some(_)) => return Err(DomainError::DecisionNotAllowed(step.id)),
            _ => {}
        }
        if !self.status.can_transition_to(ProgressStatus::Completed) {
            return Err(self.invalid(ProgressStatus::Completed, "step is not open"));
        }

        let now = Utc::now();
        self.status = ProgressStatus::Completed;
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.completed_at = Some(now);
        self.completed_by = actor_id;
        self.data = data;
        self.decision = decision;
        self.rolled_back_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// pending|in_progress -> skipped, optional steps only.
    pub fn skip(&mut self, step: &Step) -> DomainResult<()> {
        self.ensure_step(step)?;
        if !step.is_optional {
            return Err(DomainError::SkipNotAllowed(step.id));
        }
        if !self.status.can_transition_to(ProgressStatus::Skipped) {
            return Err(self.invalid(ProgressStatus::Skipped, "step is not open"));
        }
        self.status = ProgressStatus::Skipped;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Put the step on hold. The status is left alone.
    pub fn block(&mut self, reason: impl Into<String>) {
        self.blocked = true;
        self.blocked_reason = Some(reason.into());
        self.updated_at = Utc::now();
    }

    /// Release a hold.
    pub fn unblock(&mut self) {
        self.blocked = false;
        self.blocked_reason = None;
        self.updated_at = Utc::now();
    }

    /// Set or clear the assignee and due date.
    pub fn assign(&mut self, assignee_id: Option<Uuid>, due_date: Option<DateTime<Utc>>) {
        self.assignee_id = assignee_id;
        self.due_date = due_date;
        self.updated_at = Utc::now();
    }

    /// Undo the most recent completion: completed -> pending.
    ///
    /// Final steps are refused whatever their status.
    pub fn rollback(
        &mut self,
        step: &Step,
        reason: impl Into<String>,
        actor_id: Uuid,
    ) -> DomainResult<()> {
        self.ensure_step(step)?;
        let deny = |reason| DomainError::RollbackNotAllowed {
            step_id: step.id,
            reason,
        };
        if step.is_final {
            return Err(deny(RollbackDenial::FinalStep));
        }
        if self.rolled_back_at.is_some() {
            return Err(deny(RollbackDenial::AlreadyRolledBack));
        }
        if self.status != ProgressStatus::Completed {
            return Err(deny(RollbackDenial::NotCompleted));
        }

        let now = Utc::now();
        self.status = ProgressStatus::Pending;
        self.completed_at = None;
        self.completed_by = None;
        self.decision = None;
        self.rollback_reason = Some(reason.into());
        self.rolled_back_at = Some(now);
        self.rolled_back_by = Some(actor_id);
        self.reopened_at = None;
        self.rollback_count += 1;
        self.updated_at = now;
        Ok(())
    }

    /// Reopen a finished row for re-execution after a loop-back edge.
    ///
    /// Submitted data is kept so the form can be prefilled.
    pub fn reopen(&mut self) -> DomainResult<()> {
        if self.status.is_open() {
            return Err(self.invalid(ProgressStatus::Pending, "step is already open"));
        }
        self.status = ProgressStatus::Pending;
        self.completed_at = None;
        self.completed_by = None;
        self.decision = None;
        let now = Utc::now();
        self.reopened_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Whether the row is being worked through again because a loop routed
    /// back to it, as opposed to a rollback.
    pub fn is_loop_pass(&self) -> bool {
        self.reopened_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step() -> Step {
        Step::new(Uuid::new_v4(), 2, "Visit")
    }

    fn completed(step: &Step) -> Progress {
        let mut progress = Progress::new(Uuid::new_v4(), step.id);
        progress
            .complete(step, FormData::new(), None, Some(Uuid::new_v4()))
            .unwrap();
        progress
    }

    #[test]
    fn test_start_sets_started_at_once() {
        let step = step();
        let mut progress = Progress::new(Uuid::new_v4(), step.id);
        progress.start().unwrap();
        let started = progress.started_at;
        assert_eq!(progress.status, ProgressStatus::InProgress);
        assert!(started.is_some());
        assert!(progress.start().is_err());
        assert_eq!(progress.started_at, started);
    }

    #[test]
    fn test_complete_stores_data() {
        let step = step();
        let mut progress = Progress::new(Uuid::new_v4(), step.id);
        let mut data = FormData::new();
        data.insert("notes".to_string(), json!("all good"));
        progress.complete(&step, data, None, None).unwrap();

        assert_eq!(progress.status, ProgressStatus::Completed);
        assert!(progress.completed_at.is_some());
        assert_eq!(progress.data["notes"], "all good");
        assert!(progress.decision.is_none());
    }

    #[test]
    fn test_decision_flag_is_enforced() {
        let decision_step = step().with_decision(None, None);
        let mut progress = Progress::new(Uuid::new_v4(), decision_step.id);
        assert!(matches!(
            progress.complete(&decision_step, FormData::new(), None, None),
            Err(DomainError::DecisionRequired(_))
        ));
        progress
            .complete(&decision_step, FormData::new(), Some(false), None)
            .unwrap();
        assert_eq!(progress.decision, Some(false));

        let plain = step();
        let mut progress = Progress::new(Uuid::new_v4(), plain.id);
        assert!(matches!(
            progress.complete(&plain, FormData::new(), Some(true), None),
            Err(DomainError::DecisionNotAllowed(_))
        ));
        assert_eq!(progress.status, ProgressStatus::Pending);
    }

    #[test]
    fn test_complete_rejects_other_step() {
        let step = step();
        let mut progress = Progress::new(Uuid::new_v4(), Uuid::new_v4());
        assert!(matches!(
            progress.complete(&step, FormData::new(), None, None),
            Err(DomainError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_skip_requires_optional() {
        let mandatory = step();
        let mut progress = Progress::new(Uuid::new_v4(), mandatory.id);
        assert!(matches!(
            progress.skip(&mandatory),
            Err(DomainError::SkipNotAllowed(_))
        ));

        let optional = step().optional();
        let mut progress = Progress::new(Uuid::new_v4(), optional.id);
        progress.start().unwrap();
        progress.skip(&optional).unwrap();
        assert_eq!(progress.status, ProgressStatus::Skipped);
    }

    #[test]
    fn test_block_leaves_status_alone() {
        let step = step();
        let mut progress = Progress::new(Uuid::new_v4(), step.id);
        progress.block("waiting for insurer");
        assert!(progress.blocked);
        assert_eq!(progress.status, ProgressStatus::Pending);
        progress.unblock();
        assert!(!progress.blocked);
        assert!(progress.blocked_reason.is_none());
    }

    #[test]
    fn test_rollback_resets_completion() {
        let step = step().with_decision(None, None);
        let mut progress = Progress::new(Uuid::new_v4(), step.id);
        progress
            .complete(&step, FormData::new(), Some(true), None)
            .unwrap();
        let actor = Uuid::new_v4();

        progress.rollback(&step, "wrong answer", actor).unwrap();

        assert_eq!(progress.status, ProgressStatus::Pending);
        assert!(progress.completed_at.is_none());
        assert!(progress.decision.is_none());
        assert_eq!(progress.rollback_count, 1);
        assert_eq!(progress.rolled_back_by, Some(actor));
        assert_eq!(progress.rollback_reason.as_deref(), Some("wrong answer"));
    }

    #[test]
    fn test_second_rollback_without_completion_fails() {
        let step = step();
        let mut progress = completed(&step);
        progress.rollback(&step, "first", Uuid::new_v4()).unwrap();

        let err = progress.rollback(&step, "second", Uuid::new_v4()).unwrap_err();
        assert!(matches!(
            err,
            DomainError::RollbackNotAllowed {
                reason: RollbackDenial::AlreadyRolledBack,
                ..
            }
        ));
        assert_eq!(progress.rollback_count, 1);
    }

    #[test]
    fn test_recomplete_allows_another_rollback() {
        let step = step();
        let mut progress = completed(&step);
        progress.rollback(&step, "first", Uuid::new_v4()).unwrap();
        progress.complete(&step, FormData::new(), None, None).unwrap();
        progress.rollback(&step, "second", Uuid::new_v4()).unwrap();
        assert_eq!(progress.rollback_count, 2);
    }

    #[test]
    fn test_final_step_never_rolls_back() {
        let step = step().final_step();
        let mut pending = Progress::new(Uuid::new_v4(), step.id);
        let mut done = completed(&step);

        for progress in [&mut pending, &mut done] {
            let err = progress.rollback(&step, "undo", Uuid::new_v4()).unwrap_err();
            assert!(matches!(
                err,
                DomainError::RollbackNotAllowed {
                    reason: RollbackDenial::FinalStep,
                    ..
                }
            ));
        }
    }

    #[test]
    fn test_rollback_of_pending_step_fails() {
        let step = step();
        let mut progress = Progress::new(Uuid::new_v4(), step.id);
        assert!(matches!(
            progress.rollback(&step, "undo", Uuid::new_v4()),
            Err(DomainError::RollbackNotAllowed {
                reason: RollbackDenial::NotCompleted,
                ..
            })
        ));
    }

    #[test]
    fn test_reopen_keeps_counter_and_data() {
        let step = step();
        let mut progress = Progress::new(Uuid::new_v4(), step.id);
        let mut data = FormData::new();
        data.insert("amount".to_string(), json!(1200));
        progress.complete(&step, data, None, None).unwrap();

        progress.reopen().unwrap();
        assert_eq!(progress.status, ProgressStatus::Pending);
        assert_eq!(progress.rollback_count, 0);
        assert_eq!(progress.data["amount"], 1200);
        assert!(progress.reopen().is_err());
    }

    #[test]
    fn test_loop_pass_survives_completion_until_rollback() {
        let step = step();
        let mut progress = Progress::new(Uuid::new_v4(), step.id);
        assert!(!progress.is_loop_pass());

        progress.complete(&step, FormData::new(), None, None).unwrap();
        progress.reopen().unwrap();
        assert!(progress.is_loop_pass());

        progress.complete(&step, FormData::new(), None, None).unwrap();
        assert!(progress.is_loop_pass());

        progress.rollback(&step, "typo", Uuid::new_v4()).unwrap();
        assert!(!progress.is_loop_pass());
    }
}
