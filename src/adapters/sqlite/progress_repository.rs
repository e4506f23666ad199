//! SQLite implementation of the ProgressRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::adapters::sqlite::{
    is_unique_violation, parse_datetime, parse_json_or_default, parse_optional_datetime,
    parse_optional_uuid, parse_uuid,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Progress, ProgressStatus};
use crate::domain::ports::{ProgressRepository, ProgressTransition, ProgressWrite};

/// Step progress, written with revision-checked transitions in SQLite.
#[derive(Clone)]
pub struct SqliteProgressRepository {
    pool: SqlitePool,
}

impl SqliteProgressRepository {
    /// Create a progress repository over `pool`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const PROGRESS_COLUMNS: &str = "id, dossier_id, step_id, status, blocked, blocked_reason,
    assignee_id, due_date, started_at, completed_at, completed_by, data_json, decision,
    rollback_reason, rolled_back_at, rolled_back_by, rollback_count, reopened_at, revision, created_at,
    updated_at";

fn conflict(progress: &Progress) -> DomainError {
    DomainError::ConcurrencyConflict {
        entity: "step_progress".to_string(),
        id: format!("{}/{}", progress.dossier_id, progress.step_id),
    }
}

async fn insert_row(tx: &mut Transaction<'_, Sqlite>, progress: &Progress) -> DomainResult<Progress> {
    let mut stored = progress.clone();
    stored.revision = 0;

    sqlx::query(&format!(
        "INSERT INTO step_progress ({PROGRESS_COLUMNS})
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(stored.id.to_string())
    .bind(stored.dossier_id.to_string())
    .bind(stored.step_id.to_string())
    .bind(stored.status.as_str())
    .bind(stored.blocked)
    .bind(&stored.blocked_reason)
    .bind(stored.assignee_id.map(|id| id.to_string()))
    .bind(stored.due_date.map(|t| t.to_rfc3339()))
    .bind(stored.started_at.map(|t| t.to_rfc3339()))
    .bind(stored.completed_at.map(|t| t.to_rfc3339()))
    .bind(stored.completed_by.map(|id| id.to_string()))
    .bind(serde_json::to_string(&stored.data)?)
    .bind(stored.decision)
    .bind(&stored.rollback_reason)
    .bind(stored.rolled_back_at.map(|t| t.to_rfc3339()))
    .bind(stored.rolled_back_by.map(|id| id.to_string()))
    .bind(i64::from(stored.rollback_count))
    .bind(stored.reopened_at.map(|t| t.to_rfc3339()))
    .bind(i64::from(stored.revision))
    .bind(stored.created_at.to_rfc3339())
    .bind(stored.updated_at.to_rfc3339())
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            conflict(progress)
        } else {
            DomainError::from(e)
        }
    })?;

    Ok(stored)
}

async fn update_row(
    tx: &mut Transaction<'_, Sqlite>,
    progress: &Progress,
    expected_revision: u32,
) -> DomainResult<Progress> {
    let mut stored = progress.clone();
    stored.revision = expected_revision + 1;

    let result = sqlx::query(
        "UPDATE step_progress SET status = ?, blocked = ?, blocked_reason = ?, assignee_id = ?,
            due_date = ?, started_at = ?, completed_at = ?, completed_by = ?, data_json = ?,
            decision = ?, rollback_reason = ?, rolled_back_at = ?, rolled_back_by = ?,
            rollback_count = ?, reopened_at = ?, revision = ?, updated_at = ?
         WHERE id = ? AND revision = ?",
    )
    .bind(stored.status.as_str())
    .bind(stored.blocked)
    .bind(&stored.blocked_reason)
    .bind(stored.assignee_id.map(|id| id.to_string()))
    .bind(stored.due_date.map(|t| t.to_rfc3339()))
    .bind(stored.started_at.map(|t| t.to_rfc3339()))
    .bind(stored.completed_at.map(|t| t.to_rfc3339()))
    .bind(stored.completed_by.map(|id| id.to_string()))
    .bind(serde_json::to_string(&stored.data)?)
    .bind(stored.decision)
    .bind(&stored.rollback_reason)
    .bind(stored.rolled_back_at.map(|t| t.to_rfc3339()))
    .bind(stored.rolled_back_by.map(|id| id.to_string()))
    .bind(i64::from(stored.rollback_count))
    .bind(stored.reopened_at.map(|t| t.to_rfc3339()))
    .bind(i64::from(stored.revision))
    .bind(stored.updated_at.to_rfc3339())
    .bind(stored.id.to_string())
    .bind(i64::from(expected_revision))
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(conflict(progress));
    }
    Ok(stored)
}

async fn write(tx: &mut Transaction<'_, Sqlite>, write: &ProgressWrite) -> DomainResult<Progress> {
    match write {
        ProgressWrite::Insert(progress) => insert_row(tx, progress).await,
        ProgressWrite::Update {
            progress,
            expected_revision,
        } => update_row(tx, progress, *expected_revision).await,
    }
}

#[async_trait]
impl ProgressRepository for SqliteProgressRepository {
    async fn get_or_create(&self, dossier_id: Uuid, step_id: Uuid) -> DomainResult<Progress> {
        let fresh = Progress::new(dossier_id, step_id);
        let now = Utc::now().to_rfc3339();

        // Losing the race to another writer is fine: the SELECT below returns its row.
        sqlx::query(
            "INSERT OR IGNORE INTO step_progress
                (id, dossier_id, step_id, status, data_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, '{}', ?, ?)",
        )
        .bind(fresh.id.to_string())
        .bind(dossier_id.to_string())
        .bind(step_id.to_string())
        .bind(ProgressStatus::Pending.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.find(dossier_id, step_id)
            .await?
            .ok_or_else(|| DomainError::DatabaseError(format!("progress row for step {step_id} vanished")))
    }

    async fn find(&self, dossier_id: Uuid, step_id: Uuid) -> DomainResult<Option<Progress>> {
        let row: Option<ProgressRow> = sqlx::query_as(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM step_progress WHERE dossier_id = ? AND step_id = ?"
        ))
        .bind(dossier_id.to_string())
        .bind(step_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProgressRow::try_into_progress).transpose()
    }

    async fn list_for_dossier(&self, dossier_id: Uuid) -> DomainResult<Vec<Progress>> {
        let rows: Vec<ProgressRow> = sqlx::query_as(&format!(
            "SELECT {PROGRESS_COLUMNS} FROM step_progress WHERE dossier_id = ? ORDER BY created_at"
        ))
        .bind(dossier_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ProgressRow::try_into_progress).collect()
    }

    async fn apply(&self, transition: &ProgressTransition) -> DomainResult<Vec<Progress>> {
        let mut tx = self.pool.begin().await?;

        let mut persisted = vec![write(&mut tx, &transition.primary).await?];
        if let Some(successor) = &transition.successor {
            persisted.push(write(&mut tx, successor).await?);
        }

        tx.commit().await?;
        Ok(persisted)
    }
}

// ============================================================================
// Row types for sqlx
// ============================================================================

#[derive(sqlx::FromRow)]
struct ProgressRow {
    id: String,
    dossier_id: String,
    step_id: String,
    status: String,
    blocked: bool,
    blocked_reason: Option<String>,
    assignee_id: Option<String>,
    due_date: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
    completed_by: Option<String>,
    data_json: Option<String>,
    decision: Option<bool>,
    rollback_reason: Option<String>,
    rolled_back_at: Option<String>,
    rolled_back_by: Option<String>,
    rollback_count: i64,
    reopened_at: Option<String>,
    revision: i64,
    created_at: String,
    updated_at: String,
}

impl ProgressRow {
    fn try_into_progress(self) -> DomainResult<Progress> {
        let status = ProgressStatus::from_str(&self.status)
            .ok_or_else(|| DomainError::SerializationError(format!("invalid progress status: {}", self.status)))?;
        let counter = |value: i64, name: &str| {
            u32::try_from(value)
                .map_err(|_| DomainError::SerializationError(format!("invalid {name}: {value}")))
        };

        Ok(Progress {
            id: parse_uuid(&self.id)?,
            dossier_id: parse_uuid(&self.dossier_id)?,
            step_id: parse_uuid(&self.step_id)?,
            status,
            blocked: self.blocked,
            blocked_reason: self.blocked_reason,
            assignee_id: parse_optional_uuid(self.assignee_id)?,
            due_date: parse_optional_datetime(self.due_date)?,
            started_at: parse_optional_datetime(self.started_at)?,
            completed_at: parse_optional_datetime(self.completed_at)?,
            completed_by: parse_optional_uuid(self.completed_by)?,
            data: parse_json_or_default(self.data_json)?,
            decision: self.decision,
            rollback_reason: self.rollback_reason,
            rolled_back_at: parse_optional_datetime(self.rolled_back_at)?,
            rolled_back_by: parse_optional_uuid(self.rolled_back_by)?,
            rollback_count: counter(self.rollback_count, "rollback_count")?,
            reopened_at: parse_optional_datetime(self.reopened_at)?,
            revision: counter(self.revision, "revision")?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}
