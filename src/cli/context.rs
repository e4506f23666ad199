//! Wiring of repositories and services shared by the CLI commands.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::actions::LoggingDispatcher;
use crate::adapters::sqlite::{
    initialize_database, SqliteDossierRepository, SqliteProgressRepository,
    SqliteTemplateRepository, SqliteTransferRepository,
};
use crate::domain::models::Config;
use crate::services::{ActionRouter, TransferCoordinator, WorkflowEngine};

/// Workflow engine over the SQLite repositories.
pub type Engine =
    WorkflowEngine<SqliteTemplateRepository, SqliteProgressRepository, SqliteDossierRepository>;
/// Transfer coordinator over the SQLite repositories.
pub type Coordinator = TransferCoordinator<SqliteDossierRepository, SqliteTransferRepository>;

/// Everything a command needs, built once from the loaded configuration.
pub struct AppContext {
    /// Loaded configuration
    pub config: Config,
    /// Shared connection pool
    pub pool: SqlitePool,
    /// Template repository
    pub templates: Arc<SqliteTemplateRepository>,
    /// Dossier repository
    pub dossiers: Arc<SqliteDossierRepository>,
    /// Workflow engine
    pub engine: Engine,
    /// Transfer coordinator, also used by the action router
    pub coordinator: Arc<Coordinator>,
}

impl AppContext {
    /// Open the database (running migrations) and assemble the services.
    pub async fn open(config: Config) -> Result<Self> {
        let pool = initialize_database(&config.database)
            .await
            .with_context(|| format!("Failed to open database at {}", config.database.path))?;
        Ok(Self::from_pool(config, pool))
    }

    /// Assemble the services over an already migrated pool.
    pub fn from_pool(config: Config, pool: SqlitePool) -> Self {
        let templates = Arc::new(SqliteTemplateRepository::new(pool.clone()));
        let progress = Arc::new(SqliteProgressRepository::new(pool.clone()));
        let dossiers = Arc::new(SqliteDossierRepository::new(pool.clone()));
        let transfers = Arc::new(SqliteTransferRepository::new(pool.clone()));

        let coordinator = Arc::new(TransferCoordinator::new(
            dossiers.clone(),
            transfers,
            config.transfers.clone(),
        ));
        let router = ActionRouter::new(
            dossiers.clone(),
            coordinator.clone(),
            Arc::new(LoggingDispatcher::new()),
        );
        let engine = WorkflowEngine::new(templates.clone(), progress, dossiers.clone(), Arc::new(router));

        Self {
            config,
            pool,
            templates,
            dossiers,
            engine,
            coordinator,
        }
    }
}

/// Parse a full UUID argument.
pub fn parse_id(value: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(value.trim()).with_context(|| format!("Invalid {what} id: {value}"))
}

/// Parse a UUID argument that may be absent.
pub fn parse_optional_id(value: Option<&str>, what: &str) -> Result<Option<Uuid>> {
    value.map(|v| parse_id(v, what)).transpose()
}
