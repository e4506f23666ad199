//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that infrastructure adapters must implement:
//! - TemplateRepository: workflow templates and their step graph
//! - ProgressRepository: per-dossier step progress, with atomic transitions
//! - DossierRepository: dossiers, business domains and client info
//! - TransferRepository: the append-only transfer ledger
//! - AutoActionDispatcher: sink for step side effects

pub mod action_dispatcher;
pub mod dossier_repository;
pub mod progress_repository;
pub mod template_repository;
pub mod transfer_repository;

pub use action_dispatcher::{ActionContext, ActionError, AutoActionDispatcher};
pub use dossier_repository::DossierRepository;
pub use progress_repository::{ProgressRepository, ProgressTransition, ProgressWrite};
pub use template_repository::TemplateRepository;
pub use transfer_repository::{ClientInfoCopy, TransferCommit, TransferRepository};
