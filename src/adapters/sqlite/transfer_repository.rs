//! SQLite implementation of the TransferRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Acquire, SqlitePool};
use tracing::warn;
use uuid::Uuid;

use crate::adapters::sqlite::dossier_repository::{insert_client_info, insert_dossier};
use crate::adapters::sqlite::{parse_datetime, parse_optional_datetime, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{DossierTransfer, TransferStatus};
use crate::domain::ports::{ClientInfoCopy, TransferCommit, TransferRepository};

/// The transfer ledger in SQLite.
#[derive(Clone)]
pub struct SqliteTransferRepository {
    pool: SqlitePool,
}

impl SqliteTransferRepository {
    /// Create a transfer repository over `pool`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const TRANSFER_COLUMNS: &str = "id, source_dossier_id, source_domain, target_domain,
    target_dossier_id, status, actor_id, metadata_json, error_message, created_at, completed_at";

#[async_trait]
impl TransferRepository for SqliteTransferRepository {
    async fn insert(&self, transfer: &DossierTransfer) -> DomainResult<()> {
        sqlx::query(&format!(
            "INSERT INTO dossier_transfers ({TRANSFER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(transfer.id.to_string())
        .bind(transfer.source_dossier_id.to_string())
        .bind(&transfer.source_domain)
        .bind(&transfer.target_domain)
        .bind(transfer.target_dossier_id.map(|id| id.to_string()))
        .bind(transfer.status.as_str())
        .bind(transfer.actor_id.to_string())
        .bind(serde_json::to_string(&transfer.metadata)?)
        .bind(&transfer.error_message)
        .bind(transfer.created_at.to_rfc3339())
        .bind(transfer.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn commit(&self, commit: &TransferCommit) -> DomainResult<ClientInfoCopy> {
        let mut tx = self.pool.begin().await?;

        insert_dossier(&mut *tx, &commit.target_dossier).await?;

        let linked = sqlx::query(
            "UPDATE dossier_transfers SET target_dossier_id = ? WHERE id = ? AND status = 'in_progress'",
        )
        .bind(commit.target_dossier.id.to_string())
        .bind(commit.transfer_id.to_string())
        .execute(&mut *tx)
        .await?;
        if linked.rows_affected() == 0 {
            return Err(DomainError::ConcurrencyConflict {
                entity: "dossier_transfer".to_string(),
                id: commit.transfer_id.to_string(),
            });
        }

        let copy = match &commit.client_info {
            None => ClientInfoCopy::NotRequested,
            Some(info) => {
                let mut savepoint = Acquire::begin(&mut tx).await?;
                match insert_client_info(&mut *savepoint, info, false).await {
                    Ok(()) => {
                        savepoint.commit().await?;
                        ClientInfoCopy::Copied
                    }
                    Err(e) => {
                        savepoint.rollback().await?;
                        warn!(
                            transfer_id = %commit.transfer_id,
                            target_dossier_id = %commit.target_dossier.id,
                            error = %e,
                            "Client info copy failed; transfer continues without it"
                        );
                        ClientInfoCopy::Failed(e.to_string())
                    }
                }
            }
        };

        sqlx::query("UPDATE dossier_transfers SET status = ?, completed_at = ? WHERE id = ?")
            .bind(TransferStatus::Completed.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(commit.transfer_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(copy)
    }

    async fn mark_failed(&self, id: Uuid, error_message: &str) -> DomainResult<bool> {
        let result = sqlx::query(
            "UPDATE dossier_transfers SET status = ?, error_message = ?, completed_at = ?
             WHERE id = ? AND status = 'in_progress'",
        )
        .bind(TransferStatus::Failed.as_str())
        .bind(error_message)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<DossierTransfer>> {
        let row: Option<TransferRow> = sqlx::query_as(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM dossier_transfers WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransferRow::try_into_transfer).transpose()
    }

    async fn list_for_dossier(&self, dossier_id: Uuid) -> DomainResult<Vec<DossierTransfer>> {
        let rows: Vec<TransferRow> = sqlx::query_as(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM dossier_transfers
             WHERE source_dossier_id = ?1 OR target_dossier_id = ?1
             ORDER BY created_at"
        ))
        .bind(dossier_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransferRow::try_into_transfer).collect()
    }

    async fn list_stale(&self, created_before: DateTime<Utc>) -> DomainResult<Vec<DossierTransfer>> {
        let rows: Vec<TransferRow> = sqlx::query_as(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM dossier_transfers
             WHERE status = 'in_progress' AND created_at < ?
             ORDER BY created_at"
        ))
        .bind(created_before.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransferRow::try_into_transfer).collect()
    }
}

// ============================================================================
// Row types for sqlx
// ============================================================================

#[derive(sqlx::FromRow)]
struct TransferRow {
    id: String,
    source_dossier_id: String,
    source_domain: String,
    target_domain: String,
    target_dossier_id: Option<String>,
    status: String,
    actor_id: String,
    metadata_json: String,
    error_message: Option<String>,
    created_at: String,
    completed_at: Option<String>,
}

impl TransferRow {
    fn try_into_transfer(self) -> DomainResult<DossierTransfer> {
        let status = TransferStatus::from_str(&self.status)
            .ok_or_else(|| DomainError::SerializationError(format!("invalid transfer status: {}", self.status)))?;

        Ok(DossierTransfer {
            id: parse_uuid(&self.id)?,
            source_dossier_id: parse_uuid(&self.source_dossier_id)?,
            source_domain: self.source_domain,
            target_domain: self.target_domain,
            target_dossier_id: parse_optional_uuid(self.target_dossier_id)?,
            status,
            actor_id: parse_uuid(&self.actor_id)?,
            metadata: serde_json::from_str(&self.metadata_json)?,
            error_message: self.error_message,
            created_at: parse_datetime(&self.created_at)?,
            completed_at: parse_optional_datetime(self.completed_at)?,
        })
    }
}
