//! Figment-based configuration loading and validation.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project directory holding config, database and logs.
pub const PROJECT_DIR: &str = ".dossier-flow";

/// Prefix of environment overrides, e.g. `DOSSIER_FLOW_DATABASE__PATH`.
pub const ENV_PREFIX: &str = "DOSSIER_FLOW_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The log level is not a `tracing` level name.
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// `database.path` is empty.
    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    /// The pool would have no connections.
    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    /// A zero acquire timeout would fail every checkout.
    #[error("Invalid acquire_timeout_secs: {0}. Must be at least 1")]
    InvalidAcquireTimeout(u64),

    /// A business domain has an empty code.
    #[error("Domain code cannot be empty")]
    EmptyDomainCode,

    /// Two business domains share a code.
    #[error("Domain {0} is declared more than once")]
    DuplicateDomain(String),

    /// A transfer rule references an undeclared domain.
    #[error("Transfer rule for {source_domain} names unknown domain {unknown}")]
    UnknownTransferDomain {
        /// Domain owning the rule
        source_domain: String,
        /// Domain the rule names but nobody declares
        unknown: String,
    },

    /// Any other invalid setting.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .dossier-flow/config.yaml (project config, created by init)
    /// 3. .dossier-flow/local.yaml (local overrides, optional)
    /// 4. Environment variables (DOSSIER_FLOW_* prefix, `__` between levels)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(format!("{PROJECT_DIR}/config.yaml")))
            .merge(Yaml::file(format!("{PROJECT_DIR}/local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load from an explicit file when given, otherwise from the project layers.
    ///
    /// Environment overrides apply in both cases.
    pub fn load_with(path: Option<&Path>) -> Result<Config> {
        match path {
            None => Self::load(),
            Some(path) => {
                let config: Config = Self::file_figment(path)
                    .merge(Env::prefixed(ENV_PREFIX).split("__"))
                    .extract()
                    .with_context(|| format!("Failed to load config from {}", path.display()))?;
                Self::validate(&config)?;
                Ok(config)
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let config: Config = Self::file_figment(path)
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn file_figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        if config.database.acquire_timeout_secs == 0 {
            return Err(ConfigError::InvalidAcquireTimeout(0));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let mut codes = HashSet::new();
        for domain in &config.domains {
            if domain.code.trim().is_empty() {
                return Err(ConfigError::EmptyDomainCode);
            }
            if !codes.insert(domain.code.as_str()) {
                return Err(ConfigError::DuplicateDomain(domain.code.clone()));
            }
            if domain.initial_status.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "domain {} has an empty initial_status",
                    domain.code
                )));
            }
        }

        for (source, rule) in config.transfers.rules() {
            if !codes.contains(source.as_str()) {
                return Err(ConfigError::UnknownTransferDomain {
                    source_domain: source.clone(),
                    unknown: source.clone(),
                });
            }
            if let Some(unknown) = rule
                .allowed_targets
                .iter()
                .find(|target| !codes.contains(target.as_str()))
            {
                return Err(ConfigError::UnknownTransferDomain {
                    source_domain: source.clone(),
                    unknown: unknown.clone(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::{JournalMode, LogFormat};
    use crate::domain::models::{BusinessDomain, TransferMatrix, TransferRule};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.path, ".dossier-flow/dossier-flow.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.domains.len(), 3);
        assert_eq!(config.templates_dir, "templates");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
database:
  path: /custom/path.db
  max_connections: 2
  journal_mode: delete
  busy_timeout_ms: 500
logging:
  level: debug
  format: json
domains:
  - code: JDE
    name: Expertise
    initial_status: opened
  - code: DBCS
    name: Chantier
    initial_status: new
transfers:
  JDE:
    allowed_targets: [DBCS]
  DBCS:
    allowed_targets: []
    denial_reason: closed
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.database.path, "/custom/path.db");
        assert_eq!(config.database.max_connections, 2);
        assert_eq!(config.database.journal_mode, JournalMode::Delete);
        assert_eq!(config.database.busy_timeout_ms, 500);
        assert_eq!(config.database.acquire_timeout_secs, 3);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.domains[0].initial_status, "opened");
        assert_eq!(config.transfers.allowed_targets("JDE"), ["DBCS".to_string()]);

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_empty_database_path() {
        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::EmptyDatabasePath
        ));
    }

    #[test]
    fn test_validate_zero_max_connections() {
        let mut config = Config::default();
        config.database.max_connections = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidMaxConnections(0)
        ));
    }

    #[test]
    fn test_validate_zero_acquire_timeout() {
        let mut config = Config::default();
        config.database.acquire_timeout_secs = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidAcquireTimeout(0)
        ));
    }

    #[test]
    fn test_validate_duplicate_domain() {
        let mut config = Config::default();
        config
            .domains
            .push(BusinessDomain::new("JDE", "Again", "new"));
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::DuplicateDomain(code) if code == "JDE"
        ));
    }

    #[test]
    fn test_validate_transfer_to_unknown_domain() {
        let mut config = Config::default();
        config.transfers = TransferMatrix::new().with_rule(
            "JDE",
            TransferRule {
                allowed_targets: vec!["XYZ".to_string()],
                denial_reason: None,
            },
        );
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::UnknownTransferDomain { unknown, .. } if unknown == "XYZ"
        ));
    }

    #[test]
    fn test_unknown_log_format_fails_extraction() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "logging:\n  format: xml").unwrap();
        file.flush().unwrap();

        assert!(ConfigLoader::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_env_override() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "logging:\n  level: info\n  format: json").unwrap();
        file.flush().unwrap();

        temp_env::with_vars(
            [
                ("DOSSIER_FLOW_LOGGING__LEVEL", Some("debug")),
                ("DOSSIER_FLOW_DATABASE__MAX_CONNECTIONS", Some("9")),
            ],
            || {
                let config = ConfigLoader::load_with(Some(file.path())).unwrap();
                assert_eq!(config.logging.level, "debug");
                assert_eq!(config.logging.format, LogFormat::Json);
                assert_eq!(config.database.max_connections, 9);
            },
        );
    }

    #[test]
    fn test_hierarchical_merging() {
        let mut base_file = NamedTempFile::new().unwrap();
        writeln!(
            base_file,
            "templates_dir: base\nlogging:\n  level: info\n  format: json"
        )
        .unwrap();
        base_file.flush().unwrap();

        let mut override_file = NamedTempFile::new().unwrap();
        writeln!(override_file, "templates_dir: local\nlogging:\n  level: debug").unwrap();
        override_file.flush().unwrap();

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .unwrap();

        assert_eq!(config.templates_dir, "local", "Override should win");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.logging.format,
            LogFormat::Json,
            "Base value should persist when not overridden"
        );
    }
}
