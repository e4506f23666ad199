//! Domain models: dossiers, templates and their step graph, progress and transfers.

pub mod config;
pub mod dossier;
pub mod progress;
pub mod step;
pub mod template;
pub mod transfer;

pub use config::{Config, DatabaseConfig, JournalMode, LogFormat, LoggingConfig, RotationPolicy};
pub use dossier::{BusinessDomain, ClientInfo, Dossier};
pub use progress::{Progress, ProgressStatus};
pub use step::{
    AutoAction, ConditionOperator, FieldOption, FieldType, FormData, FormField, OpaqueAction,
    Routing, Step, StepAction, StepType, VisibilityRule,
};
pub use template::{GraphWarning, WorkflowTemplate, ENTRY_SEQUENCE};
pub use transfer::{DossierTransfer, TransferMatrix, TransferRule, TransferSnapshot, TransferStatus};
