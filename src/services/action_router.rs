//! Auto-action routing.
//!
//! Actions the crate can carry out itself are handled here: `transfer_dossier`
//! goes back into the transfer coordinator and `update_dossier_status` writes
//! the dossier. Everything else is forwarded to the inner dispatcher.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::domain::models::{AutoAction, StepAction};
use crate::domain::ports::{
    ActionContext, ActionError, AutoActionDispatcher, DossierRepository, TransferRepository,
};
use crate::services::transfer_coordinator::TransferCoordinator;

/// Dispatcher that runs transfer actions itself and forwards the rest.
pub struct ActionRouter<D: DossierRepository, X: TransferRepository> {
    dossiers: Arc<D>,
    coordinator: Arc<TransferCoordinator<D, X>>,
    inner: Arc<dyn AutoActionDispatcher>,
}

impl<D: DossierRepository, X: TransferRepository> ActionRouter<D, X> {
    /// Router sending non-transfer actions to `inner`.
    pub fn new(
        dossiers: Arc<D>,
        coordinator: Arc<TransferCoordinator<D, X>>,
        inner: Arc<dyn AutoActionDispatcher>,
    ) -> Self {
        Self {
            dossiers,
            coordinator,
            inner,
        }
    }

    fn failed(action: &AutoAction, message: impl Into<String>) -> ActionError {
        ActionError::Failed {
            action_type: action.action_type().to_string(),
            message: message.into(),
        }
    }

    async fn transfer(
        &self,
        ctx: &ActionContext,
        action: &AutoAction,
        target_domain: &str,
    ) -> Result<(), ActionError> {
        let actor_id = match ctx.actor_id {
            Some(actor) => actor,
            None => self
                .dossiers
                .get(ctx.dossier_id)
                .await
                .map_err(|e| Self::failed(action, e.to_string()))?
                .and_then(|d| d.owner_id)
                .ok_or_else(|| Self::failed(action, "no actor and the dossier has no owner"))?,
        };

        let outcome = self
            .coordinator
            .transfer(ctx.dossier_id, target_domain, actor_id)
            .await
            .map_err(|e| Self::failed(action, e.to_string()))?;
        info!(
            dossier_id = %ctx.dossier_id,
            transfer_id = %outcome.transfer.id,
            target_dossier_id = %outcome.target_dossier.id,
            "Transfer triggered by step completion"
        );
        Ok(())
    }
}

#[async_trait]
impl<D, X> AutoActionDispatcher for ActionRouter<D, X>
where
    D: DossierRepository + 'static,
    X: TransferRepository + 'static,
{
    async fn dispatch(&self, ctx: &ActionContext, action: &AutoAction) -> Result<(), ActionError> {
        match action {
            AutoAction::Known(StepAction::TransferDossier { target_domain }) => {
                self.transfer(ctx, action, target_domain).await
            }
            AutoAction::Known(StepAction::UpdateDossierStatus { status }) => {
                let updated = self
                    .dossiers
                    .update_status(ctx.dossier_id, status)
                    .await
                    .map_err(|e| Self::failed(action, e.to_string()))?;
                if !updated {
                    return Err(Self::failed(action, format!("dossier {} not found", ctx.dossier_id)));
                }
                info!(dossier_id = %ctx.dossier_id, status = %status, "Dossier status updated");
                Ok(())
            }
            _ => self.inner.dispatch(ctx, action).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::actions::LoggingDispatcher;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteDossierRepository, SqliteTransferRepository};
    use crate::domain::models::{BusinessDomain, Dossier, OpaqueAction, TransferMatrix};
    use serde_json::json;
    use uuid::Uuid;

    async fn setup() -> (
        ActionRouter<SqliteDossierRepository, SqliteTransferRepository>,
        Arc<SqliteDossierRepository>,
        Dossier,
    ) {
        let pool = create_migrated_test_pool().await.unwrap();
        let dossiers = Arc::new(SqliteDossierRepository::new(pool.clone()));
        let jde = BusinessDomain::new("JDE", "Insurance expertise", "new");
        dossiers.upsert_domain(&jde).await.unwrap();
        dossiers
            .upsert_domain(&BusinessDomain::new("DBCS", "Construction site", "new"))
            .await
            .unwrap();
        let dossier = Dossier::new(&jde, "Crack in wall").with_owner(Uuid::new_v4());
        dossiers.create(&dossier).await.unwrap();

        let coordinator = Arc::new(TransferCoordinator::new(
            dossiers.clone(),
            Arc::new(SqliteTransferRepository::new(pool)),
            TransferMatrix::default(),
        ));
        let router = ActionRouter::new(dossiers.clone(), coordinator, Arc::new(LoggingDispatcher::new()));
        (router, dossiers, dossier)
    }

    fn ctx(dossier: &Dossier, actor_id: Option<Uuid>) -> ActionContext {
        ActionContext {
            dossier_id: dossier.id,
            domain_code: dossier.domain_code.clone(),
            step_id: Uuid::new_v4(),
            step_sequence: 4,
            actor_id,
        }
    }

    #[tokio::test]
    async fn test_transfer_falls_back_to_owner() {
        let (router, dossiers, dossier) = setup().await;
        let action = AutoAction::Known(StepAction::TransferDossier {
            target_domain: "DBCS".to_string(),
        });

        router.dispatch(&ctx(&dossier, None), &action).await.unwrap();

        let created = dossiers.list_by_domain("DBCS").await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].transferred_from, Some(dossier.id));
    }

    #[tokio::test]
    async fn test_ineligible_transfer_is_reported() {
        let (router, _, dossier) = setup().await;
        let action = AutoAction::Known(StepAction::TransferDossier {
            target_domain: "JDE".to_string(),
        });
        let err = router
            .dispatch(&ctx(&dossier, Some(Uuid::new_v4())), &action)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Failed { ref action_type, .. } if action_type == "transfer_dossier"));
    }

    #[tokio::test]
    async fn test_status_update_and_passthrough() {
        let (router, dossiers, dossier) = setup().await;
        let update = AutoAction::Known(StepAction::UpdateDossierStatus {
            status: "visit_planned".to_string(),
        });
        router.dispatch(&ctx(&dossier, None), &update).await.unwrap();
        assert_eq!(dossiers.get(dossier.id).await.unwrap().unwrap().status, "visit_planned");

        let opaque = AutoAction::Opaque(OpaqueAction {
            action_type: "archive".to_string(),
            parameters: json!({}),
        });
        router.dispatch(&ctx(&dossier, None), &opaque).await.unwrap();
    }
}
