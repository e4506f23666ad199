//! Progress repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::Progress;

/// One row write inside a progress transition.
#[derive(Debug, Clone)]
pub enum ProgressWrite {
    /// Insert a row that does not exist yet.
    Insert(Progress),
    /// Update a row, provided nobody wrote it since `expected_revision`.
    Update {
        /// Row to write
        progress: Progress,
        /// Revision the row was read at
        expected_revision: u32,
    },
}

impl ProgressWrite {
    /// Update guarded by the revision the row was read at.
    pub fn update(progress: Progress, expected_revision: u32) -> Self {
        Self::Update {
            progress,
            expected_revision,
        }
    }

    /// Row carried by this write.
    pub fn progress(&self) -> &Progress {
        match self {
            Self::Insert(progress) | Self::Update { progress, .. } => progress,
        }
    }
}

/// Writes that must land together or not at all.
#[derive(Debug, Clone)]
pub struct ProgressTransition {
    /// Write for the step the caller acted on
    pub primary: ProgressWrite,
    /// Successor row created or reopened by the same transition.
    pub successor: Option<ProgressWrite>,
}

impl ProgressTransition {
    /// Transition touching one row.
    pub fn single(write: ProgressWrite) -> Self {
        Self {
            primary: write,
            successor: None,
        }
    }

    /// Add the successor write.
    pub fn with_successor(mut self, write: ProgressWrite) -> Self {
        self.successor = Some(write);
        self
    }
}

/// Repository interface for per-dossier step progress.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Return the existing row for (dossier, step) or insert a `pending` one.
    async fn get_or_create(&self, dossier_id: Uuid, step_id: Uuid) -> DomainResult<Progress>;

    /// Find the row for (dossier, step), if any.
    async fn find(&self, dossier_id: Uuid, step_id: Uuid) -> DomainResult<Option<Progress>>;

    /// All rows of a dossier.
    async fn list_for_dossier(&self, dossier_id: Uuid) -> DomainResult<Vec<Progress>>;

    /// Apply a transition atomically.
    ///
    /// Every `Update` is checked against its expected revision and every
    /// `Insert` against the (dossier, step) uniqueness; any mismatch aborts
    /// the whole transition with `ConcurrencyConflict`. Returns the rows as
    /// persisted (revisions bumped).
    async fn apply(&self, transition: &ProgressTransition) -> DomainResult<Vec<Progress>>;
}
