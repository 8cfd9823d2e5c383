//! Registers and deploys a remote model bound to the connector.

use super::error::{Details, StepError};
use super::{InstallationStep, RollbackFailure};
use crate::context::{ContextKey, InstallationContext};
use crate::repositories::dto::CreateModelRequest;
use crate::repositories::MlServices;
use async_trait::async_trait;
use da_protocol::installation_models::InstallRequest;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const NAME: &str = "Create Model";
const ACTION: &str = "creating the ML Commons model";

pub struct CreateModelStep {
    services: Arc<MlServices>,
}

impl CreateModelStep {
    pub fn new(services: Arc<MlServices>) -> Self {
        Self { services }
    }

    fn error(details: &Details, cause: impl std::fmt::Display) -> StepError {
        StepError::builder(NAME)
            .action(ACTION)
            .details(details.clone())
            .build(cause)
    }
}

#[async_trait]
impl InstallationStep for CreateModelStep {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn execute(
        &self,
        request: &InstallRequest,
        context: &mut InstallationContext,
    ) -> Result<(), StepError> {
        let mut details = Details::new();
        details.insert("provider".to_string(), json!(request.selected_provider));
        details.insert("modelId".to_string(), json!(request.model_id));

        let connector_id = context
            .get(ContextKey::ConnectorId)
            .map_err(|e| Self::error(&details, e))?
            .to_string();
        details.insert("connectorId".to_string(), json!(connector_id));

        let model = CreateModelRequest {
            name: request.selected_provider.clone(),
            description: request
                .description
                .clone()
                .unwrap_or_else(|| format!("{} language model", request.selected_provider)),
            connector_id,
        };
        debug!(connector_id = %model.connector_id, "Registering model");

        let created = self
            .services
            .models
            .create(&model)
            .await
            .map_err(|e| Self::error(&details, e))?;

        info!(model_id = %created.id, "Model created");
        context.set(ContextKey::ModelId, created.id);
        Ok(())
    }

    /// Undeploys, then deletes the model. An undeploy failure is only logged
    /// since the model may never have been deployed.
    async fn rollback(
        &self,
        _request: &InstallRequest,
        context: &mut InstallationContext,
        _failure: &StepError,
    ) -> Result<(), RollbackFailure> {
        let Some(model_id) = context.model_id().map(str::to_string) else {
            return Ok(());
        };

        if let Err(e) = self.services.models.undeploy(&model_id).await {
            warn!(%model_id, error = %e, "Model undeploy failed, deleting anyway");
        }

        self.services.models.delete(&model_id).await.map_err(|e| {
            warn!(%model_id, error = %e, "Model rollback failed");
            RollbackFailure::resource("model creation", "modelId", &model_id, &e)
        })?;

        context.delete(ContextKey::ModelId);
        info!(%model_id, "Model deleted during rollback");
        Ok(())
    }

    fn success_message(&self) -> &'static str {
        "Model created successfully"
    }

    fn failure_message(&self) -> &'static str {
        "Failed to create model. Please check the configuration and try again."
    }
}
