//! Cross-domain dossier transfer.
//!
//! A transfer duplicates a dossier into another business domain. Eligibility
//! is checked against the configured matrix before anything is written; the
//! ledger row is then opened and the duplication committed in one
//! transaction. A failed commit leaves the ledger row `failed` for audit.

use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Dossier, DossierTransfer, TransferMatrix, TransferSnapshot};
use crate::domain::ports::{ClientInfoCopy, DossierRepository, TransferCommit, TransferRepository};

/// What a successful transfer produced.
#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    /// Ledger row, now `completed`
    pub transfer: DossierTransfer,
    /// Dossier created in the target domain
    pub target_dossier: Dossier,
    /// Whether client info made it onto the target
    pub client_info_copied: bool,
}

/// Moves dossiers between business domains through the transfer ledger.
pub struct TransferCoordinator<D: DossierRepository, X: TransferRepository> {
    dossiers: Arc<D>,
    transfers: Arc<X>,
    matrix: TransferMatrix,
}

impl<D: DossierRepository, X: TransferRepository> TransferCoordinator<D, X> {
    /// Coordinator enforcing `matrix`.
    pub fn new(dossiers: Arc<D>, transfers: Arc<X>, matrix: TransferMatrix) -> Self {
        Self {
            dossiers,
            transfers,
            matrix,
        }
    }

    /// Allowed domain pairs.
    pub fn matrix(&self) -> &TransferMatrix {
        &self.matrix
    }

    /// Duplicate a dossier into `target_domain`.
    ///
    /// The source dossier is never modified.
    pub async fn transfer(
        &self,
        dossier_id: Uuid,
        target_domain: &str,
        actor_id: Uuid,
    ) -> DomainResult<TransferOutcome> {
        let source = self
            .dossiers
            .get(dossier_id)
            .await?
            .ok_or(DomainError::DossierNotFound(dossier_id))?;

        self.matrix.check(&source.domain_code, target_domain)?;

        let target = self
            .dossiers
            .get_domain(target_domain)
            .await?
            .ok_or_else(|| DomainError::TargetDomainNotFound(target_domain.to_string()))?;

        let missing = source.missing_transfer_fields();
        if !missing.is_empty() {
            return Err(DomainError::IncompleteSourceDossier {
                dossier_id,
                missing,
            });
        }

        let client_info = self.dossiers.get_client_info(source.id).await?;
        let snapshot = TransferSnapshot::capture(&source, client_info.is_some());
        let mut ledger = DossierTransfer::begin(&source, &target.code, actor_id, snapshot);
        self.transfers.insert(&ledger).await?;

        let target_dossier = source.duplicate_into(&target);
        let commit = TransferCommit {
            transfer_id: ledger.id,
            target_dossier: target_dossier.clone(),
            client_info: client_info.map(|info| info.duplicate_for(target_dossier.id)),
        };

        let copy = match self.transfers.commit(&commit).await {
            Ok(copy) => copy,
            Err(e) => {
                let message = e.to_string();
                error!(
                    transfer_id = %ledger.id,
                    source_dossier_id = %source.id,
                    target_domain,
                    error = %message,
                    "Transfer failed"
                );
                if let Err(mark_err) = self.transfers.mark_failed(ledger.id, &message).await {
                    error!(
                        transfer_id = %ledger.id,
                        error = %mark_err,
                        "Could not record transfer failure"
                    );
                }
                return Err(e);
            }
        };

        let client_info_copied = match &copy {
            ClientInfoCopy::Copied => true,
            ClientInfoCopy::NotRequested => false,
            ClientInfoCopy::Failed(reason) => {
                warn!(
                    transfer_id = %ledger.id,
                    target_dossier_id = %target_dossier.id,
                    error = %reason,
                    "Transfer completed without client info"
                );
                false
            }
        };

        ledger = self
            .transfers
            .get(ledger.id)
            .await?
            .ok_or(DomainError::TransferNotFound(ledger.id))?;

        info!(
            transfer_id = %ledger.id,
            source_dossier_id = %source.id,
            target_dossier_id = %target_dossier.id,
            source_domain = %source.domain_code,
            target_domain = %target.code,
            "Dossier transferred"
        );

        Ok(TransferOutcome {
            transfer: ledger,
            target_dossier,
            client_info_copied,
        })
    }

    /// Ledger rows where the dossier is source or target, oldest first.
    pub async fn history(&self, dossier_id: Uuid) -> DomainResult<Vec<DossierTransfer>> {
        self.transfers.list_for_dossier(dossier_id).await
    }

    /// Ledger row by ID.
    pub async fn get(&self, transfer_id: Uuid) -> DomainResult<DossierTransfer> {
        self.transfers
            .get(transfer_id)
            .await?
            .ok_or(DomainError::TransferNotFound(transfer_id))
    }

    /// Fail `in_progress` rows older than `older_than`. Returns the rows failed.
    pub async fn reconcile_stale(&self, older_than: Duration) -> DomainResult<Vec<DossierTransfer>> {
        let cutoff = Utc::now() - older_than;
        let stale = self.transfers.list_stale(cutoff).await?;

        let mut failed = Vec::with_capacity(stale.len());
        for mut transfer in stale {
            let message = format!("abandoned: still in progress after {}s", older_than.num_seconds());
            if self.transfers.mark_failed(transfer.id, &message).await? {
                warn!(transfer_id = %transfer.id, "Stale transfer marked failed");
                transfer.fail(message)?;
                failed.push(transfer);
            }
        }
        Ok(failed)
    }
}
