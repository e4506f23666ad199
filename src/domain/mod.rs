//! Domain layer for the dossier workflow system
//!
//! This module contains core business logic, domain models and the port
//! traits adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{DomainError, DomainResult, RollbackDenial, UnavailableReason};
