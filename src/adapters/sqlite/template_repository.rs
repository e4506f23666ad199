//! SQLite implementation of the TemplateRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{parse_datetime, parse_json_or_default, parse_optional_uuid, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Step, StepType, WorkflowTemplate};
use crate::domain::ports::TemplateRepository;

/// Workflow templates and their step rows in SQLite.
#[derive(Clone)]
pub struct SqliteTemplateRepository {
    pool: SqlitePool,
}

impl SqliteTemplateRepository {
    /// Create a template repository over `pool`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_steps(&self, template_id: Uuid) -> DomainResult<Vec<Step>> {
        let rows: Vec<StepRow> = sqlx::query_as(&format!(
            "SELECT {STEP_COLUMNS} FROM workflow_steps WHERE template_id = ? ORDER BY sequence_number"
        ))
        .bind(template_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StepRow::try_into_step).collect()
    }

    async fn hydrate(&self, row: TemplateRow) -> DomainResult<WorkflowTemplate> {
        let mut template = row.try_into_template()?;
        let steps = self.load_steps(template.id).await?;
        template.set_steps(steps);
        Ok(template)
    }
}

const TEMPLATE_COLUMNS: &str = "id, domain_code, name, version, active, created_at";

const STEP_COLUMNS: &str = "id, template_id, sequence_number, name, description, step_type,
    requires_decision, is_optional, can_loop_back, is_final, form_schema_json, auto_actions_json,
    next_step_id, decision_yes_step_id, decision_no_step_id";

#[async_trait]
impl TemplateRepository for SqliteTemplateRepository {
    async fn save(&self, template: &WorkflowTemplate) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        if template.active {
            sqlx::query("UPDATE workflow_templates SET active = 0 WHERE domain_code = ? AND id != ?")
                .bind(&template.domain_code)
                .bind(template.id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(&format!(
            "INSERT INTO workflow_templates ({TEMPLATE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, active = excluded.active"
        ))
        .bind(template.id.to_string())
        .bind(&template.domain_code)
        .bind(&template.name)
        .bind(i64::from(template.version))
        .bind(template.active)
        .bind(template.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if super::is_unique_violation(&e) {
                DomainError::ValidationFailed(format!(
                    "template version {} already exists for domain {}",
                    template.version, template.domain_code
                ))
            } else {
                DomainError::from(e)
            }
        })?;

        for step in template.steps() {
            sqlx::query(&format!(
                "INSERT OR REPLACE INTO workflow_steps ({STEP_COLUMNS})
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(step.id.to_string())
            .bind(template.id.to_string())
            .bind(i64::from(step.sequence_number))
            .bind(&step.name)
            .bind(&step.description)
            .bind(step.step_type.as_str())
            .bind(step.requires_decision)
            .bind(step.is_optional)
            .bind(step.can_loop_back)
            .bind(step.is_final)
            .bind(serde_json::to_string(&step.form_schema)?)
            .bind(serde_json::to_string(&step.auto_actions)?)
            .bind(step.next_step.map(|id| id.to_string()))
            .bind(step.decision_yes_next_step.map(|id| id.to_string()))
            .bind(step.decision_no_next_step.map(|id| id.to_string()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<WorkflowTemplate>> {
        let row: Option<TemplateRow> = sqlx::query_as(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM workflow_templates WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn get_active(&self, domain_code: &str) -> DomainResult<Option<WorkflowTemplate>> {
        let row: Option<TemplateRow> = sqlx::query_as(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM workflow_templates WHERE domain_code = ? AND active = 1"
        ))
        .bind(domain_code)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn list_by_domain(&self, domain_code: &str) -> DomainResult<Vec<WorkflowTemplate>> {
        let rows: Vec<TemplateRow> = sqlx::query_as(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM workflow_templates WHERE domain_code = ? ORDER BY version DESC"
        ))
        .bind(domain_code)
        .fetch_all(&self.pool)
        .await?;

        let mut templates = Vec::with_capacity(rows.len());
        for row in rows {
            templates.push(self.hydrate(row).await?);
        }
        Ok(templates)
    }

    async fn activate(&self, id: Uuid) -> DomainResult<WorkflowTemplate> {
        let mut tx = self.pool.begin().await?;

        let domain_code: Option<String> =
            sqlx::query_scalar("SELECT domain_code FROM workflow_templates WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
        let domain_code = domain_code.ok_or(DomainError::TemplateNotFound(id))?;

        sqlx::query("UPDATE workflow_templates SET active = 0 WHERE domain_code = ?")
            .bind(&domain_code)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE workflow_templates SET active = 1 WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.get(id).await?.ok_or(DomainError::TemplateNotFound(id))
    }

    async fn find_step(&self, step_id: Uuid) -> DomainResult<Option<Step>> {
        let row: Option<StepRow> = sqlx::query_as(&format!(
            "SELECT {STEP_COLUMNS} FROM workflow_steps WHERE id = ?"
        ))
        .bind(step_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(StepRow::try_into_step).transpose()
    }
}

// ============================================================================
// Row types for sqlx
// ============================================================================

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: String,
    domain_code: String,
    name: String,
    version: i64,
    active: bool,
    created_at: String,
}

impl TemplateRow {
    fn try_into_template(self) -> DomainResult<WorkflowTemplate> {
        let version = u32::try_from(self.version)
            .map_err(|_| DomainError::SerializationError(format!("invalid template version {}", self.version)))?;
        let mut template = WorkflowTemplate::new(self.domain_code, self.name, version);
        template.id = parse_uuid(&self.id)?;
        template.active = self.active;
        template.created_at = parse_datetime(&self.created_at)?;
        Ok(template)
    }
}

#[derive(sqlx::FromRow)]
struct StepRow {
    id: String,
    template_id: String,
    sequence_number: i64,
    name: String,
    description: Option<String>,
    step_type: String,
    requires_decision: bool,
    is_optional: bool,
    can_loop_back: bool,
    is_final: bool,
    form_schema_json: Option<String>,
    auto_actions_json: Option<String>,
    next_step_id: Option<String>,
    decision_yes_step_id: Option<String>,
    decision_no_step_id: Option<String>,
}

impl StepRow {
    fn try_into_step(self) -> DomainResult<Step> {
        let sequence_number = u32::try_from(self.sequence_number).map_err(|_| {
            DomainError::SerializationError(format!("invalid sequence number {}", self.sequence_number))
        })?;
        let step_type = StepType::from_str(&self.step_type)
            .ok_or_else(|| DomainError::SerializationError(format!("invalid step type: {}", self.step_type)))?;

        Ok(Step {
            id: parse_uuid(&self.id)?,
            template_id: parse_uuid(&self.template_id)?,
            sequence_number,
            name: self.name,
            description: self.description,
            step_type,
            requires_decision: self.requires_decision,
            is_optional: self.is_optional,
            can_loop_back: self.can_loop_back,
            is_final: self.is_final,
            form_schema: parse_json_or_default(self.form_schema_json)?,
            auto_actions: parse_json_or_default(self.auto_actions_json)?,
            next_step: parse_optional_uuid(self.next_step_id)?,
            decision_yes_next_step: parse_optional_uuid(self.decision_yes_step_id)?,
            decision_no_next_step: parse_optional_uuid(self.decision_no_step_id)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::{AutoAction, FieldType, FormField, OpaqueAction, StepAction};
    use serde_json::json;

    async fn setup_test_repo() -> SqliteTemplateRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteTemplateRepository::new(pool)
    }

    fn template(version: u32) -> WorkflowTemplate {
        let template_id = Uuid::new_v4();
        let close = Step::new(template_id, 3, "Close").final_step();
        let report = Step::new(template_id, 2, "Report")
            .with_next(close.id)
            .with_field(FormField {
                name: "summary".to_string(),
                label: "Summary".to_string(),
                field_type: FieldType::Textarea,
                required: true,
                options: vec![],
                visible_when: None,
            })
            .with_action(StepAction::GenerateDocument {
                template: "report".to_string(),
                output_name: None,
            })
            .with_action(AutoAction::Opaque(OpaqueAction {
                action_type: "archive".to_string(),
                parameters: json!({"bucket": "cold"}),
            }));
        let open = Step::new(template_id, 1, "Open").with_decision(Some(report.id), Some(close.id));
        WorkflowTemplate::new("JDE", "Expertise", version).with_steps(vec![open, report, close])
    }

    #[tokio::test]
    async fn test_save_and_get_template() {
        let repo = setup_test_repo().await;
        let template = template(1);
        repo.save(&template).await.unwrap();

        let loaded = repo.get(template.id).await.unwrap().unwrap();
        assert_eq!(loaded.steps().len(), 3);
        assert_eq!(loaded.entry_step().unwrap().name, "Open");

        let report = loaded.step_by_sequence(2).unwrap();
        assert_eq!(report.form_schema[0].field_type, FieldType::Textarea);
        assert_eq!(report.auto_actions.len(), 2);
        assert_eq!(report.auto_actions[1].action_type(), "archive");

        let open = loaded.entry_step().unwrap();
        assert!(open.requires_decision);
        assert_eq!(open.decision_no_next_step, loaded.step_by_sequence(3).map(|s| s.id));
    }

    #[tokio::test]
    async fn test_activate_switches_active_version() {
        let repo = setup_test_repo().await;
        let v1 = template(1);
        let v2 = template(2);
        repo.save(&v1).await.unwrap();
        repo.save(&v2).await.unwrap();
        assert!(repo.get_active("JDE").await.unwrap().is_none());

        repo.activate(v1.id).await.unwrap();
        assert_eq!(repo.get_active("JDE").await.unwrap().unwrap().id, v1.id);

        let activated = repo.activate(v2.id).await.unwrap();
        assert!(activated.active);
        assert_eq!(repo.get_active("JDE").await.unwrap().unwrap().version, 2);

        let all = repo.list_by_domain("JDE").await.unwrap();
        assert_eq!(all.iter().filter(|t| t.active).count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_version_is_rejected() {
        let repo = setup_test_repo().await;
        repo.save(&template(1)).await.unwrap();
        let err = repo.save(&template(1)).await.unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_activate_unknown_template() {
        let repo = setup_test_repo().await;
        let id = Uuid::new_v4();
        assert!(matches!(
            repo.activate(id).await,
            Err(DomainError::TemplateNotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn test_find_step() {
        let repo = setup_test_repo().await;
        let template = template(1);
        repo.save(&template).await.unwrap();

        let step_id = template.steps()[1].id;
        let step = repo.find_step(step_id).await.unwrap().unwrap();
        assert_eq!(step.template_id, template.id);
        assert!(repo.find_step(Uuid::new_v4()).await.unwrap().is_none());
    }
}
