//! Transfer ledger repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ClientInfo, Dossier, DossierTransfer};

/// Everything the atomic part of a transfer writes.
#[derive(Debug, Clone)]
pub struct TransferCommit {
    /// Ledger row being completed
    pub transfer_id: Uuid,
    /// Dossier created in the target domain
    pub target_dossier: Dossier,
    /// Copied best-effort: a failure here does not abort the commit.
    pub client_info: Option<ClientInfo>,
}

/// How the best-effort client-info copy went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientInfoCopy {
    /// The source had no client info, or duplication was not asked for.
    NotRequested,
    /// Client info was copied onto the target dossier.
    Copied,
    /// The copy failed; the transfer itself still committed.
    Failed(String),
}

/// Repository interface for the append-only transfer ledger.
#[async_trait]
pub trait TransferRepository: Send + Sync {
    /// Insert a new ledger row (status `in_progress`).
    async fn insert(&self, transfer: &DossierTransfer) -> DomainResult<()>;

    /// Atomically create the target dossier, link it to the ledger row, copy
    /// client info inside a savepoint and mark the row `completed`.
    ///
    /// On error nothing of this call persists and the ledger row is left
    /// `in_progress` for the caller to fail.
    async fn commit(&self, commit: &TransferCommit) -> DomainResult<ClientInfoCopy>;

    /// Move an `in_progress` row to `failed`. Terminal rows are left untouched;
    /// returns whether the row changed.
    async fn mark_failed(&self, id: Uuid, error_message: &str) -> DomainResult<bool>;

    /// Get a ledger row by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<DossierTransfer>>;

    /// Ledger rows where the dossier is source or target, oldest first.
    async fn list_for_dossier(&self, dossier_id: Uuid) -> DomainResult<Vec<DossierTransfer>>;

    /// `in_progress` rows created before the cutoff.
    async fn list_stale(&self, created_before: DateTime<Utc>) -> DomainResult<Vec<DossierTransfer>>;
}
