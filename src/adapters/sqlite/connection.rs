//! SQLite connection pools for dossier storage.
//!
//! Every pooled connection enforces foreign keys (progress rows and ledger
//! entries reference dossiers and steps) and takes its journal mode and lock
//! timeouts from [`DatabaseConfig`].

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::{DatabaseConfig, JournalMode};

/// Errors raised while opening the dossier database.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The pool could not open its connections.
    #[error("Failed to open dossier database: {0}")]
    PoolCreationFailed(#[source] sqlx::Error),
    /// The configured path does not form a valid `SQLite` URL.
    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(String),
    /// The directory meant to hold the database file could not be created.
    #[error("Failed to create database directory {path}: {source}")]
    DirectoryCreationFailed {
        /// Directory that was being created
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },
    /// The database did not answer a trivial query.
    #[error("Connection check failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),
}

const MEMORY_URL: &str = "sqlite::memory:";

impl From<JournalMode> for SqliteJournalMode {
    fn from(mode: JournalMode) -> Self {
        match mode {
            JournalMode::Wal => Self::Wal,
            JournalMode::Delete => Self::Delete,
            JournalMode::Truncate => Self::Truncate,
        }
    }
}

/// File backing a `SQLite` URL, or `None` for in-memory databases.
fn database_file(url: &str) -> Option<&Path> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split_once('?').map_or(path, |(file, _)| file);

    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(Path::new(path))
    }
}

fn ensure_parent_directory(url: &str) -> Result<(), ConnectionError> {
    let Some(parent) = database_file(url).and_then(Path::parent) else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || parent.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|source| ConnectionError::DirectoryCreationFailed {
        path: parent.to_path_buf(),
        source,
    })
}

fn connect_options(config: &DatabaseConfig) -> Result<SqliteConnectOptions, ConnectionError> {
    let url = config.url();
    let options = SqliteConnectOptions::from_str(&url)
        .map_err(|_| ConnectionError::InvalidDatabaseUrl(url.clone()))?
        .create_if_missing(true)
        .journal_mode(config.journal_mode.into())
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms));
    Ok(options)
}

/// Open the pool described by `config`, creating the database file and its
/// directory on first use.
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool, ConnectionError> {
    ensure_parent_directory(&config.url())?;

    SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs.max(1)))
        .connect_with(connect_options(config)?)
        .await
        .map_err(ConnectionError::PoolCreationFailed)
}

/// Single-connection in-memory pool; every test gets its own database.
pub async fn create_test_pool() -> Result<SqlitePool, ConnectionError> {
    let options = SqliteConnectOptions::from_str(MEMORY_URL)
        .map_err(|_| ConnectionError::InvalidDatabaseUrl(MEMORY_URL.to_string()))?
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(ConnectionError::PoolCreationFailed)
}

/// Round-trip a trivial query so a broken database fails at startup.
pub async fn verify_connection(pool: &SqlitePool) -> Result<(), ConnectionError> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(ConnectionError::ConnectionFailed)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir, file: &str) -> DatabaseConfig {
        DatabaseConfig {
            path: dir.path().join(file).to_string_lossy().into_owned(),
            ..DatabaseConfig::default()
        }
    }

    #[test]
    fn test_database_file_strips_url_prefixes() {
        assert_eq!(database_file("sqlite://data/x.db"), Some(Path::new("data/x.db")));
        assert_eq!(database_file("sqlite:data/x.db"), Some(Path::new("data/x.db")));
        assert_eq!(database_file("sqlite:x.db?mode=rwc"), Some(Path::new("x.db")));
        assert_eq!(database_file("data/x.db"), Some(Path::new("data/x.db")));
        assert_eq!(database_file(MEMORY_URL), None);
    }

    #[tokio::test]
    async fn test_create_pool_makes_directory_and_applies_settings() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir, "nested/dossiers.db");
        config.journal_mode = JournalMode::Delete;
        config.busy_timeout_ms = 1_234;

        let pool = create_pool(&config).await.unwrap();
        verify_connection(&pool).await.unwrap();
        assert!(dir.path().join("nested").is_dir());

        let journal: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(journal, "delete");
        let busy: i64 = sqlx::query_scalar("PRAGMA busy_timeout")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(busy, 1_234);
        let foreign_keys: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(foreign_keys, 1);
    }

    #[tokio::test]
    async fn test_default_pool_uses_wal() {
        let dir = TempDir::new().unwrap();
        let pool = create_pool(&config_in(&dir, "dossiers.db")).await.unwrap();
        let journal: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(journal, "wal");
    }
}
