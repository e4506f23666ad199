//! Auto-action dispatcher port.
//!
//! The engine hands every auto action of a completed step to this sink after
//! the progress transition has committed. Results are never interpreted
//! beyond log-and-continue.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::AutoAction;

/// Where an auto action comes from.
#[derive(Debug, Clone, Serialize)]
pub struct ActionContext {
    /// Dossier whose step completed
    pub dossier_id: Uuid,
    /// Business domain of that dossier
    pub domain_code: String,
    /// Completed step
    pub step_id: Uuid,
    /// Sequence number of the completed step
    pub step_sequence: u32,
    /// User who completed it, when known
    pub actor_id: Option<Uuid>,
}

/// Failure reported by an action collaborator.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The dispatcher does not handle this action type.
    #[error("Action {0} is not supported by this dispatcher")]
    Unsupported(String),

    /// The action ran and failed.
    #[error("Action {action_type} failed: {message}")]
    Failed {
        /// Action type tag
        action_type: String,
        /// Failure detail
        message: String,
    },
}

/// Sink for step auto actions.
#[async_trait]
pub trait AutoActionDispatcher: Send + Sync {
    /// Run one auto action. Errors are logged by the caller, never propagated.
    async fn dispatch(&self, ctx: &ActionContext, action: &AutoAction) -> Result<(), ActionError>;
}
