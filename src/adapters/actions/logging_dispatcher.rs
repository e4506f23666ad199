//! Logging auto-action dispatcher.
//!
//! Used when no external collaborator is wired for documents, email,
//! appointments or tasks: every action is recorded as a structured log event.

use async_trait::async_trait;
use tracing::info;

use crate::domain::ports::{ActionContext, ActionError, AutoActionDispatcher};
use crate::domain::models::AutoAction;

/// Dispatcher that only records what it was asked to do.
#[derive(Debug, Clone, Default)]
pub struct LoggingDispatcher;

impl LoggingDispatcher {
    /// Create a dispatcher.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AutoActionDispatcher for LoggingDispatcher {
    async fn dispatch(&self, ctx: &ActionContext, action: &AutoAction) -> Result<(), ActionError> {
        let parameters = serde_json::to_string(action).unwrap_or_default();
        info!(
            dossier_id = %ctx.dossier_id,
            domain = %ctx.domain_code,
            step_id = %ctx.step_id,
            step_sequence = ctx.step_sequence,
            action_type = action.action_type(),
            parameters = %parameters,
            "Auto action recorded"
        );
        Ok(())
    }
}
