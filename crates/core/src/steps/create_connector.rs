//! Creates the remote-model connector for the selected provider.

use super::error::{Details, StepError};
use super::{InstallationStep, RollbackFailure};
use crate::context::{ContextKey, InstallationContext};
use crate::repositories::dto::CreateConnectorRequest;
use crate::repositories::MlServices;
use async_trait::async_trait;
use da_protocol::installation_models::InstallRequest;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const NAME: &str = "Create Connector";
const ACTION: &str = "creating the ML Commons connector";

pub struct CreateConnectorStep {
    services: Arc<MlServices>,
}

impl CreateConnectorStep {
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
impl InstallationStep for CreateConnectorStep {
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
        details.insert("apiUrl".to_string(), json!(request.api_url));

        let provider = self
            .services
            .providers
            .require(&request.selected_provider)
            .map_err(|e| Self::error(&details, e))?;

        let connector = CreateConnectorRequest {
            name: format!("{} Chat Connector", request.selected_provider),
            description: format!(
                "Connector to {} model service for {}",
                request.selected_provider, request.model_id
            ),
            endpoint: request.api_url.clone(),
            model_id: request.model_id.clone(),
            api_key: request.api_key.clone(),
            url_path: provider.url_path.clone(),
            headers: provider.headers.clone(),
            request_body: provider.request_body.clone(),
            extra_parameters: provider.extra_parameters.clone(),
        };
        debug!(name = %connector.name, "Creating connector");

        let created = self
            .services
            .connectors
            .create(&connector)
            .await
            .map_err(|e| Self::error(&details, e))?;

        info!(connector_id = %created.id, "Connector created");
        context.set(ContextKey::ConnectorId, created.id);
        Ok(())
    }

    async fn rollback(
        &self,
        _request: &InstallRequest,
        context: &mut InstallationContext,
        _failure: &StepError,
    ) -> Result<(), RollbackFailure> {
        let Some(connector_id) = context.connector_id().map(str::to_string) else {
            return Ok(());
        };

        self.services
            .connectors
            .delete(&connector_id)
            .await
            .map_err(|e| {
                warn!(%connector_id, error = %e, "Connector rollback failed");
                RollbackFailure::resource("connector creation", "connectorId", &connector_id, &e)
            })?;

        context.delete(ContextKey::ConnectorId);
        info!(%connector_id, "Connector deleted during rollback");
        Ok(())
    }

    fn success_message(&self) -> &'static str {
        "Connector created successfully"
    }

    fn failure_message(&self) -> &'static str {
        "Failed to create connector. Please check the configuration and try again."
    }
}
