//! SQLite implementation of the DossierRepository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{
    parse_datetime, parse_json_or_default, parse_optional_uuid, parse_uuid,
};
use crate::domain::errors::DomainResult;
use crate::domain::models::{BusinessDomain, ClientInfo, Dossier};
use crate::domain::ports::DossierRepository;

/// Dossiers, business domains and client info in SQLite.
#[derive(Clone)]
pub struct SqliteDossierRepository {
    pool: SqlitePool,
}

impl SqliteDossierRepository {
    /// Create a dossier repository over `pool`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const DOSSIER_COLUMNS: &str =
    "id, domain_code, title, reference, status, tags_json, owner_id, transferred_from, created_at, updated_at";

#[async_trait]
impl DossierRepository for SqliteDossierRepository {
    async fn upsert_domain(&self, domain: &BusinessDomain) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO business_domains (code, name, initial_status) VALUES (?, ?, ?)
             ON CONFLICT(code) DO UPDATE SET name = excluded.name, initial_status = excluded.initial_status",
        )
        .bind(&domain.code)
        .bind(&domain.name)
        .bind(&domain.initial_status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_domain(&self, code: &str) -> DomainResult<Option<BusinessDomain>> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT code, name, initial_status FROM business_domains WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(code, name, initial_status)| BusinessDomain {
            code,
            name,
            initial_status,
        }))
    }

    async fn list_domains(&self) -> DomainResult<Vec<BusinessDomain>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT code, name, initial_status FROM business_domains ORDER BY code",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(code, name, initial_status)| BusinessDomain {
                code,
                name,
                initial_status,
            })
            .collect())
    }

    async fn create(&self, dossier: &Dossier) -> DomainResult<()> {
        insert_dossier(&self.pool, dossier).await
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Dossier>> {
        let row: Option<DossierRow> = sqlx::query_as(&format!(
            "SELECT {DOSSIER_COLUMNS} FROM dossiers WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(DossierRow::try_into_dossier).transpose()
    }

    async fn update_status(&self, id: Uuid, status: &str) -> DomainResult<bool> {
        let result = sqlx::query("UPDATE dossiers SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_by_domain(&self, domain_code: &str) -> DomainResult<Vec<Dossier>> {
        let rows: Vec<DossierRow> = sqlx::query_as(&format!(
            "SELECT {DOSSIER_COLUMNS} FROM dossiers WHERE domain_code = ? ORDER BY created_at DESC"
        ))
        .bind(domain_code)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DossierRow::try_into_dossier).collect()
    }

    async fn save_client_info(&self, info: &ClientInfo) -> DomainResult<()> {
        insert_client_info(&self.pool, info, true).await
    }

    async fn get_client_info(&self, dossier_id: Uuid) -> DomainResult<Option<ClientInfo>> {
        let row: Option<(String, String, String, String)> = sqlx::query_as(
            "SELECT id, dossier_id, data_json, created_at FROM client_infos WHERE dossier_id = ?",
        )
        .bind(dossier_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(id, dossier_id, data_json, created_at)| {
            Ok(ClientInfo {
                id: parse_uuid(&id)?,
                dossier_id: parse_uuid(&dossier_id)?,
                data: serde_json::from_str(&data_json)?,
                created_at: parse_datetime(&created_at)?,
            })
        })
        .transpose()
    }
}

/// Insert a dossier through any executor, so transfers can reuse it inside a transaction.
pub(crate) async fn insert_dossier<'e, E>(executor: E, dossier: &Dossier) -> DomainResult<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(&format!(
        "INSERT INTO dossiers ({DOSSIER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(dossier.id.to_string())
    .bind(&dossier.domain_code)
    .bind(&dossier.title)
    .bind(&dossier.reference)
    .bind(&dossier.status)
    .bind(serde_json::to_string(&dossier.tags)?)
    .bind(dossier.owner_id.map(|id| id.to_string()))
    .bind(dossier.transferred_from.map(|id| id.to_string()))
    .bind(dossier.created_at.to_rfc3339())
    .bind(dossier.updated_at.to_rfc3339())
    .execute(executor)
    .await?;
    Ok(())
}

/// Insert client info; `replace` overwrites an existing row for the dossier.
pub(crate) async fn insert_client_info<'e, E>(
    executor: E,
    info: &ClientInfo,
    replace: bool,
) -> DomainResult<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let verb = if replace { "INSERT OR REPLACE" } else { "INSERT" };
    sqlx::query(&format!(
        "{verb} INTO client_infos (id, dossier_id, data_json, created_at) VALUES (?, ?, ?, ?)"
    ))
    .bind(info.id.to_string())
    .bind(info.dossier_id.to_string())
    .bind(serde_json::to_string(&info.data)?)
    .bind(info.created_at.to_rfc3339())
    .execute(executor)
    .await?;
    Ok(())
}

// ============================================================================
// Row types for sqlx
// ============================================================================

#[derive(sqlx::FromRow)]
struct DossierRow {
    id: String,
    domain_code: String,
    title: String,
    reference: Option<String>,
    status: String,
    tags_json: Option<String>,
    owner_id: Option<String>,
    transferred_from: Option<String>,
    created_at: String,
    updated_at: String,
}

impl DossierRow {
    fn try_into_dossier(self) -> DomainResult<Dossier> {
        Ok(Dossier {
            id: parse_uuid(&self.id)?,
            domain_code: self.domain_code,
            title: self.title,
            reference: self.reference,
            status: self.status,
            tags: parse_json_or_default(self.tags_json)?,
            owner_id: parse_optional_uuid(self.owner_id)?,
            transferred_from: parse_optional_uuid(self.transferred_from)?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use serde_json::json;

    async fn setup_test_repo() -> SqliteDossierRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteDossierRepository::new(pool)
    }

    fn jde() -> BusinessDomain {
        BusinessDomain::new("JDE", "Insurance expertise", "new")
    }

    #[tokio::test]
    async fn test_upsert_and_list_domains() {
        let repo = setup_test_repo().await;
        repo.upsert_domain(&jde()).await.unwrap();
        repo.upsert_domain(&BusinessDomain::new("JDE", "Expertise", "opened"))
            .await
            .unwrap();

        let domains = repo.list_domains().await.unwrap();
        assert_eq!(domains.len(), 1);
        assert_eq!(domains[0].initial_status, "opened");
        assert!(repo.get_domain("DBCS").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_and_get_dossier() {
        let repo = setup_test_repo().await;
        repo.upsert_domain(&jde()).await.unwrap();
        let dossier = Dossier::new(&jde(), "Water damage")
            .with_owner(Uuid::new_v4())
            .with_tags(vec!["urgent".to_string()]);
        repo.create(&dossier).await.unwrap();

        let retrieved = repo.get(dossier.id).await.unwrap().unwrap();
        assert_eq!(retrieved.title, "Water damage");
        assert_eq!(retrieved.status, "new");
        assert_eq!(retrieved.tags, vec!["urgent"]);
        assert_eq!(retrieved.owner_id, dossier.owner_id);

        assert_eq!(repo.list_by_domain("JDE").await.unwrap().len(), 1);

        assert!(repo.update_status(dossier.id, "visit_planned").await.unwrap());
        assert_eq!(repo.get(dossier.id).await.unwrap().unwrap().status, "visit_planned");
        assert!(!repo.update_status(Uuid::new_v4(), "x").await.unwrap());
    }

    #[tokio::test]
    async fn test_client_info_replace() {
        let repo = setup_test_repo().await;
        repo.upsert_domain(&jde()).await.unwrap();
        let dossier = Dossier::new(&jde(), "Roof");
        repo.create(&dossier).await.unwrap();

        repo.save_client_info(&ClientInfo::new(dossier.id, json!({"name": "A"})))
            .await
            .unwrap();
        repo.save_client_info(&ClientInfo::new(dossier.id, json!({"name": "B"})))
            .await
            .unwrap();

        let info = repo.get_client_info(dossier.id).await.unwrap().unwrap();
        assert_eq!(info.data["name"], "B");
    }
}
