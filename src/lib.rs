//! dossier-flow - dossier workflow engine
//!
//! Dossiers move through the versioned step graph of their business domain's
//! active template. Progress is tracked per step with decision branching,
//! loop-back, skip, rollback and blocking, and a completed dossier can be
//! duplicated into another domain through an audited transfer.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, errors and port traits
//! - **Adapters** (`adapters`): `SQLite` repositories and action dispatchers
//! - **Service Layer** (`services`): workflow engine, progress tracker, transfers
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging, YAML templates
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    BusinessDomain, Config, Dossier, DossierTransfer, Progress, ProgressStatus, Step,
    TransferMatrix, WorkflowTemplate,
};
pub use domain::ports::{
    AutoActionDispatcher, DossierRepository, ProgressRepository, TemplateRepository,
    TransferRepository,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{StepSubmission, TransferCoordinator, WorkflowEngine};
