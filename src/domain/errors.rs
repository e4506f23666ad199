//! Domain errors for the dossier workflow system.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Why a step cannot be worked on right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// The step is not part of the dossier's active template.
    NotInActiveTemplate,
    /// The step has no progress row yet and is not the entry step.
    NotReached,
    /// The step is already completed.
    AlreadyCompleted,
    /// The step was skipped.
    Skipped,
    /// The step is flagged as blocked.
    Blocked,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotInActiveTemplate => "it does not belong to the dossier's active template",
            Self::NotReached => "the workflow has not reached it yet",
            Self::AlreadyCompleted => "it is already completed",
            Self::Skipped => "it was skipped",
            Self::Blocked => "it is blocked",
        };
        f.write_str(text)
    }
}

/// Why a rollback was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackDenial {
    /// The step is one of the template's final steps.
    FinalStep,
    /// The progress row is not in `completed`.
    NotCompleted,
    /// The most recent completion was already rolled back.
    AlreadyRolledBack,
}

impl fmt::Display for RollbackDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::FinalStep => "it is a final step",
            Self::NotCompleted => "it is not completed",
            Self::AlreadyRolledBack => "its last completion was already rolled back",
        };
        f.write_str(text)
    }
}

fn join_fields(fields: &[String]) -> String {
    fields.join(", ")
}

/// Domain-level errors that can occur in the dossier workflow system.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No dossier has this id.
    #[error("Dossier not found: {0}")]
    DossierNotFound(Uuid),

    /// The domain has no active workflow template.
    #[error("No active workflow template for domain {0}")]
    NoActiveTemplate(String),

    /// No template has this id.
    #[error("Workflow template not found: {0}")]
    TemplateNotFound(Uuid),

    /// No step matches the given id or sequence number.
    #[error("Step not found: {0}")]
    StepNotFound(String),

    /// The step exists but cannot be worked on now.
    #[error("Step {step_id} is not available because {reason}")]
    StepNotAvailable {
        /// Step that was requested
        step_id: Uuid,
        /// Why it is unavailable
        reason: UnavailableReason,
    },

    /// A decision step was completed without a yes/no answer.
    #[error("Step {0} requires a decision")]
    DecisionRequired(Uuid),

    /// A non-decision step was given a yes/no answer.
    #[error("Step {0} does not take a decision")]
    DecisionNotAllowed(Uuid),

    /// Only optional steps may be skipped.
    #[error("Step {0} is not optional and cannot be skipped")]
    SkipNotAllowed(Uuid),

    /// A rollback was refused.
    #[error("Step {step_id} cannot be rolled back because {reason}")]
    RollbackNotAllowed {
        /// Step whose rollback was requested
        step_id: Uuid,
        /// Why it was refused
        reason: RollbackDenial,
    },

    /// A status change that the lifecycle does not allow.
    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        /// Current state
        from: String,
        /// Requested state
        to: String,
        /// Human-readable explanation
        reason: String,
    },

    /// The transfer matrix or dossier state forbids the transfer.
    #[error("Transfer from {source_domain} to {target_domain} is not eligible: {reason}")]
    TransferNotEligible {
        /// Domain the dossier lives in
        source_domain: String,
        /// Domain it was meant to move to
        target_domain: String,
        /// Human-readable explanation
        reason: String,
    },

    /// The target domain is not configured.
    #[error("Target domain not found: {0}")]
    TargetDomainNotFound(String),

    /// The source dossier lacks fields a duplicate needs.
    #[error("Dossier {dossier_id} cannot be duplicated, missing: {}", join_fields(.missing))]
    IncompleteSourceDossier {
        /// Dossier that was to be duplicated
        dossier_id: Uuid,
        /// Names of the empty fields
        missing: Vec<String>,
    },

    /// No transfer has this id.
    #[error("Transfer not found: {0}")]
    TransferNotFound(Uuid),

    /// Input failed validation.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// A row changed between read and write.
    #[error("Concurrency conflict: {entity} {id} was modified")]
    ConcurrencyConflict {
        /// Kind of row, e.g. `progress`
        entity: String,
        /// Identifier of the row
        id: String,
    },

    /// Storage failure.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// JSON encoding or decoding failure.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result alias for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Stable machine-readable kind, used by the CLI's JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DossierNotFound(_) => "dossier_not_found",
            Self::NoActiveTemplate(_) => "no_active_template",
            Self::TemplateNotFound(_) => "template_not_found",
            Self::StepNotFound(_) => "step_not_found",
            Self::StepNotAvailable { .. } => "step_not_available",
            Self::DecisionRequired(_) => "decision_required",
            Self::DecisionNotAllowed(_) => "decision_not_allowed",
            Self::SkipNotAllowed(_) => "skip_not_allowed",
            Self::RollbackNotAllowed { .. } => "rollback_not_allowed",
            Self::InvalidStateTransition { .. } => "invalid_state_transition",
            Self::TransferNotEligible { .. } => "transfer_not_eligible",
            Self::TargetDomainNotFound(_) => "target_domain_not_found",
            Self::IncompleteSourceDossier { .. } => "incomplete_source_dossier",
            Self::TransferNotFound(_) => "transfer_not_found",
            Self::ValidationFailed(_) => "validation_failed",
            Self::ConcurrencyConflict { .. } => "concurrency_conflict",
            Self::DatabaseError(_) => "database_error",
            Self::SerializationError(_) => "serialization_error",
        }
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollback_message_names_final_step() {
        let err = DomainError::RollbackNotAllowed {
            step_id: Uuid::nil(),
            reason: RollbackDenial::FinalStep,
        };
        assert!(err.to_string().ends_with("because it is a final step"));
        assert_eq!(err.kind(), "rollback_not_allowed");
    }

    #[test]
    fn test_incomplete_dossier_lists_missing_fields() {
        let err = DomainError::IncompleteSourceDossier {
            dossier_id: Uuid::nil(),
            missing: vec!["owner".to_string(), "title".to_string()],
        };
        assert!(err.to_string().ends_with("missing: owner, title"));
    }
}
