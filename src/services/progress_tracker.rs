//! Progress tracker service.
//!
//! Applies the `Progress` state machine and persists each transition through
//! the repository, guarded by the revision the row was read at.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{FormData, Progress, Step};
use crate::domain::ports::{ProgressRepository, ProgressTransition, ProgressWrite};

/// Persists `Progress` state changes, one revision-checked write each.
pub struct ProgressTracker<P: ProgressRepository> {
    repository: Arc<P>,
}

impl<P: ProgressRepository> Clone for ProgressTracker<P> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
        }
    }
}

impl<P: ProgressRepository> ProgressTracker<P> {
    /// Tracker writing through `repository`.
    pub fn new(repository: Arc<P>) -> Self {
        Self { repository }
    }

    /// Existing row for (dossier, step), or a freshly persisted `pending` one.
    pub async fn get_or_create(&self, dossier_id: Uuid, step_id: Uuid) -> DomainResult<Progress> {
        self.repository.get_or_create(dossier_id, step_id).await
    }

    /// Row for (dossier, step), if one exists.
    pub async fn find(&self, dossier_id: Uuid, step_id: Uuid) -> DomainResult<Option<Progress>> {
        self.repository.find(dossier_id, step_id).await
    }

    /// Every progress row of a dossier.
    pub async fn list(&self, dossier_id: Uuid) -> DomainResult<Vec<Progress>> {
        self.repository.list_for_dossier(dossier_id).await
    }

    /// Move a row to `in_progress`.
    pub async fn start(&self, progress: &Progress) -> DomainResult<Progress> {
        self.persist("start", progress, Progress::start).await
    }

    /// Store the payload and decision and mark the row `completed`.
    pub async fn complete(
        &self,
        progress: &Progress,
        step: &Step,
        data: FormData,
        decision: Option<bool>,
        actor_id: Option<Uuid>,
    ) -> DomainResult<Progress> {
        self.persist("complete", progress, |p| p.complete(step, data, decision, actor_id))
            .await
    }

    /// Mark an optional step `skipped`.
    pub async fn skip(&self, progress: &Progress, step: &Step) -> DomainResult<Progress> {
        self.persist("skip", progress, |p| p.skip(step)).await
    }

    /// Flag a row as blocked.
    pub async fn block(&self, progress: &Progress, reason: &str) -> DomainResult<Progress> {
        self.persist("block", progress, |p| {
            p.block(reason);
            Ok(())
        })
        .await
    }

    /// Clear the blocked flag.
    pub async fn unblock(&self, progress: &Progress) -> DomainResult<Progress> {
        self.persist("unblock", progress, |p| {
            p.unblock();
            Ok(())
        })
        .await
    }

    /// Set or clear assignee and deadline.
    pub async fn assign(
        &self,
        progress: &Progress,
        assignee_id: Option<Uuid>,
        due_date: Option<DateTime<Utc>>,
    ) -> DomainResult<Progress> {
        self.persist("assign", progress, |p| {
            p.assign(assignee_id, due_date);
            Ok(())
        })
        .await
    }

    /// Send a completed row back to `pending`, counting the rollback.
    pub async fn rollback(
        &self,
        progress: &Progress,
        step: &Step,
        reason: &str,
        actor_id: Uuid,
    ) -> DomainResult<Progress> {
        self.persist("rollback", progress, |p| p.rollback(step, reason, actor_id))
            .await
    }

    /// Send a closed row back to `pending` without counting a rollback.
    pub async fn reopen(&self, progress: &Progress) -> DomainResult<Progress> {
        self.persist("reopen", progress, Progress::reopen).await
    }

    /// Persist a multi-row transition atomically.
    #[instrument(skip(self, transition), fields(with_successor = transition.successor.is_some()))]
    pub async fn commit(&self, transition: &ProgressTransition) -> DomainResult<Vec<Progress>> {
        self.repository.apply(transition).await
    }

    #[instrument(
        skip(self, progress, mutate),
        fields(dossier_id = %progress.dossier_id, step_id = %progress.step_id)
    )]
    async fn persist<F>(&self, operation: &'static str, progress: &Progress, mutate: F) -> DomainResult<Progress>
    where
        F: FnOnce(&mut Progress) -> DomainResult<()>,
    {
        let mut next = progress.clone();
        mutate(&mut next)?;

        let transition = ProgressTransition::single(ProgressWrite::update(next, progress.revision));
        let stored = self
            .repository
            .apply(&transition)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::DatabaseError("transition returned no rows".to_string()))?;
        debug!(
            from = %progress.status,
            to = %stored.status,
            revision = stored.revision,
            "Progress transition persisted"
        );
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteDossierRepository, SqliteProgressRepository,
        SqliteTemplateRepository,
    };
    use crate::domain::errors::DomainError;
    use crate::domain::models::{BusinessDomain, Dossier, ProgressStatus, WorkflowTemplate};
    use crate::domain::ports::{DossierRepository, TemplateRepository};

    async fn setup() -> (ProgressTracker<SqliteProgressRepository>, Uuid, Step) {
        let pool = create_migrated_test_pool().await.unwrap();
        let domain = BusinessDomain::new("JDMO", "Project management", "new");
        let dossiers = SqliteDossierRepository::new(pool.clone());
        dossiers.upsert_domain(&domain).await.unwrap();
        let dossier = Dossier::new(&domain, "Extension");
        dossiers.create(&dossier).await.unwrap();

        let template = WorkflowTemplate::new("JDMO", "Project", 1)
            .with_steps(vec![Step::new(Uuid::nil(), 1, "Kick-off")]);
        SqliteTemplateRepository::new(pool.clone())
            .save(&template)
            .await
            .unwrap();

        let tracker = ProgressTracker::new(Arc::new(SqliteProgressRepository::new(pool)));
        (tracker, dossier.id, template.steps()[0].clone())
    }

    #[tokio::test]
    async fn test_start_then_complete() {
        let (tracker, dossier_id, step) = setup().await;
        let progress = tracker.get_or_create(dossier_id, step.id).await.unwrap();

        let started = tracker.start(&progress).await.unwrap();
        assert_eq!(started.status, ProgressStatus::InProgress);
        assert_eq!(started.revision, progress.revision + 1);

        let done = tracker
            .complete(&started, &step, FormData::new(), None, None)
            .await
            .unwrap();
        assert_eq!(done.status, ProgressStatus::Completed);

        let stored = tracker.find(dossier_id, step.id).await.unwrap().unwrap();
        assert_eq!(stored.revision, done.revision);
    }

    #[tokio::test]
    async fn test_stale_copy_is_rejected() {
        let (tracker, dossier_id, step) = setup().await;
        let progress = tracker.get_or_create(dossier_id, step.id).await.unwrap();

        tracker.block(&progress, "missing documents").await.unwrap();
        let err = tracker.start(&progress).await.unwrap_err();
        assert!(matches!(err, DomainError::ConcurrencyConflict { .. }));
    }

    #[tokio::test]
    async fn test_failed_transition_writes_nothing() {
        let (tracker, dossier_id, step) = setup().await;
        let progress = tracker.get_or_create(dossier_id, step.id).await.unwrap();

        assert!(tracker.skip(&progress, &step).await.is_err());
        let stored = tracker.find(dossier_id, step.id).await.unwrap().unwrap();
        assert_eq!(stored.revision, progress.revision);
        assert_eq!(stored.status, ProgressStatus::Pending);
    }

    #[tokio::test]
    async fn test_assign_and_unblock() {
        let (tracker, dossier_id, step) = setup().await;
        let progress = tracker.get_or_create(dossier_id, step.id).await.unwrap();
        let assignee = Uuid::new_v4();

        let assigned = tracker.assign(&progress, Some(assignee), None).await.unwrap();
        let blocked = tracker.block(&assigned, "waiting").await.unwrap();
        let unblocked = tracker.unblock(&blocked).await.unwrap();

        assert_eq!(unblocked.assignee_id, Some(assignee));
        assert!(!unblocked.blocked);
        assert_eq!(unblocked.revision, progress.revision + 3);
    }

    #[tokio::test]
    async fn test_reopen_keeps_rollback_count() {
        let (tracker, dossier_id, step) = setup().await;
        let progress = tracker.get_or_create(dossier_id, step.id).await.unwrap();
        assert!(tracker.reopen(&progress).await.is_err());

        let done = tracker
            .complete(&progress, &step, FormData::new(), None, None)
            .await
            .unwrap();
        let reopened = tracker.reopen(&done).await.unwrap();

        assert_eq!(reopened.status, ProgressStatus::Pending);
        assert_eq!(reopened.rollback_count, 0);
        assert!(reopened.completed_at.is_none());
    }
}
