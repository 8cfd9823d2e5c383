//! Creates the conversational agent backed by the new model.

use super::error::{Details, StepError};
use super::{InstallationStep, RollbackFailure};
use crate::config::error::ProviderError;
use crate::context::{ContextKey, InstallationContext};
use crate::repositories::dto::CreateAgentRequest;
use crate::repositories::MlServices;
use async_trait::async_trait;
use da_protocol::installation_models::InstallRequest;
use da_protocol::provider_models::ProviderConfig;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const NAME: &str = "Create Agent";
const ACTION: &str = "creating the ML Commons agent";
const AGENT_TYPE: &str = "conversational";

pub struct CreateAgentStep {
    services: Arc<MlServices>,
}

impl CreateAgentStep {
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

/// Installer defaults with the provider's `agent_parameters` merged over them.
fn agent_parameters(provider: &ProviderConfig) -> BTreeMap<String, Value> {
    let mut parameters = BTreeMap::from([
        ("max_iteration".to_string(), json!(5)),
        ("stop_when_no_tool_found".to_string(), json!(true)),
    ]);
    parameters.extend(provider.agent_parameters.clone());
    parameters
}

#[async_trait]
impl InstallationStep for CreateAgentStep {
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

        let model_id = context
            .get(ContextKey::ModelId)
            .map_err(|e| Self::error(&details, e))?
            .to_string();
        details.insert("modelId".to_string(), json!(model_id));

        let provider = self
            .services
            .providers
            .require(&request.selected_provider)
            .map_err(|e| Self::error(&details, e))?;

        let response_filter = provider.response_filter.clone().ok_or_else(|| {
            Self::error(
                &details,
                ProviderError::MissingResponseFilter(request.selected_provider.clone()),
            )
        })?;

        let agent = CreateAgentRequest {
            name: format!("{} Dashboard Assistant", request.selected_provider),
            description: format!("Dashboard assistant agent using model {model_id}"),
            agent_type: AGENT_TYPE.to_string(),
            model_id,
            response_filter,
            parameters: agent_parameters(provider),
        };
        debug!(name = %agent.name, model_id = %agent.model_id, "Creating agent");

        let created = self
            .services
            .agents
            .create(&agent)
            .await
            .map_err(|e| Self::error(&details, e))?;

        info!(agent_id = %created.id, "Agent created");
        context.set(ContextKey::AgentId, created.id);
        Ok(())
    }

    async fn rollback(
        &self,
        _request: &InstallRequest,
        context: &mut InstallationContext,
        _failure: &StepError,
    ) -> Result<(), RollbackFailure> {
        let Some(agent_id) = context.agent_id().map(str::to_string) else {
            return Ok(());
        };

        self.services.agents.delete(&agent_id).await.map_err(|e| {
            warn!(%agent_id, error = %e, "Agent rollback failed");
            RollbackFailure::resource("agent creation", "agentId", &agent_id, &e)
        })?;

        context.delete(ContextKey::AgentId);
        info!(%agent_id, "Agent deleted during rollback");
        Ok(())
    }

    fn success_message(&self) -> &'static str {
        "Agent created successfully"
    }

    fn failure_message(&self) -> &'static str {
        "Failed to create agent. Please check the configuration and try again."
    }
}
