//! Layered configuration model: database, logging, domains, transfers and templates.

use serde::{Deserialize, Serialize};

use super::dossier::BusinessDomain;
use super::transfer::TransferMatrix;

/// Main configuration structure for dossier-flow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Business domains seeded by `init`
    #[serde(default = "default_domains")]
    pub domains: Vec<BusinessDomain>,

    /// Transfer eligibility matrix keyed by source domain code
    #[serde(default)]
    pub transfers: TransferMatrix,

    /// Directory holding YAML workflow templates
    #[serde(default = "default_templates_dir")]
    pub templates_dir: String,
}

fn default_domains() -> Vec<BusinessDomain> {
    vec![
        BusinessDomain::new("JDE", "Insurance expertise", "new"),
        BusinessDomain::new("JDMO", "Project management", "new"),
        BusinessDomain::new("DBCS", "Construction site", "new"),
    ]
}

fn default_templates_dir() -> String {
    "templates".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            domains: default_domains(),
            transfers: TransferMatrix::default(),
            templates_dir: default_templates_dir(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// `SQLite` journal mode applied to every pooled connection
    #[serde(default)]
    pub journal_mode: JournalMode,

    /// How long a writer waits on a locked database, in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// How long a caller waits for a free pooled connection, in seconds
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

/// `SQLite` journal mode
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    /// Write-ahead log; readers never block the writer
    #[default]
    Wal,
    /// Rollback journal deleted after each transaction
    Delete,
    /// Rollback journal truncated instead of deleted
    Truncate,
}

fn default_database_path() -> String {
    ".dossier-flow/dossier-flow.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

const fn default_busy_timeout_ms() -> u64 {
    30_000
}

const fn default_acquire_timeout_secs() -> u64 {
    3
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
            journal_mode: JournalMode::default(),
            busy_timeout_ms: default_busy_timeout_ms(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl DatabaseConfig {
    /// Connection URL for the configured database file.
    pub fn url(&self) -> String {
        format!("sqlite:{}", self.path)
    }
}

/// Output format of log lines
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

/// Log file rotation policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    /// New file every day.
    Daily,
    /// New file every hour.
    Hourly,
    /// A single file.
    Never,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::Daily
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Directory for log files (stderr only when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// Log rotation policy for file output
    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: RotationPolicy::default(),
        }
    }
}
