//! Views of the installed models and the active agent, and removal of a
//! model together with everything built on it.

use crate::error::{MonitorError, RepositoryResult};
use crate::repositories::MlServices;
use da_protocol::monitor_models::{AgentSummary, ModelSummary};
use tracing::{debug, info, warn};

/// The agent the dashboard assistant currently uses, if any.
///
/// # Errors
///
/// Returns the repository error if the active-agent document or the agent
/// itself cannot be read.
pub async fn active_agent(services: &MlServices) -> RepositoryResult<Option<AgentSummary>> {
    let Some(agent_id) = services.agents.get_active().await? else {
        return Ok(None);
    };
    services.agents.find_by_id(&agent_id).await
}

/// All remote models, each with the agent built on it, flagging the model
/// whose agent is the active assistant agent.
///
/// A failure to resolve the active agent is logged and treated as "no active
/// agent" so the listing still succeeds.
pub async fn list_models(services: &MlServices) -> RepositoryResult<Vec<ModelSummary>> {
    let models = services.models.get_all().await?;

    let active_id = match services.agents.get_active().await {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "Could not resolve the active agent");
            None
        }
    };

    let mut composed = Vec::with_capacity(models.len());
    for mut model in models {
        model.agent = services.agents.find_by_model_id(&model.id).await?;
        model.is_active_agent_model = match (&model.agent, &active_id) {
            (Some(agent), Some(active)) => agent.id == *active,
            _ => false,
        };
        composed.push(model);
    }
    Ok(composed)
}

/// Delete a model along with its agents, its connector and its model group.
///
/// Agents go first since they reference the model. An undeploy failure is
/// only logged; the model may not be deployed.
///
/// # Errors
///
/// Returns `ModelNotFound` without touching the cluster when the model does
/// not exist, or the first repository error of the deletion chain.
pub async fn delete_model_with_related_entities(
    services: &MlServices,
    model_id: &str,
) -> Result<(), MonitorError> {
    let model = services
        .models
        .find_by_id(model_id)
        .await?
        .ok_or_else(|| MonitorError::ModelNotFound(model_id.to_string()))?;

    services.agents.delete_by_model_id(model_id).await?;
    debug!(%model_id, "Agents using the model deleted");

    if let Err(e) = services.models.undeploy(model_id).await {
        warn!(%model_id, error = %e, "Model undeploy failed, deleting anyway");
    }
    services.models.delete(model_id).await?;

    if let Some(connector_id) = &model.connector_id {
        services.connectors.delete(connector_id).await?;
    }
    if let Some(group_id) = &model.model_group_id {
        services.model_groups.delete(group_id).await?;
    }

    info!(%model_id, "Model and related entities deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::providers::ProviderCatalog;
    use crate::engine::InstallationManager;
    use crate::repositories::mock::{BackendCall, MockMlBackend};
    use da_protocol::installation_models::InstallRequest;
    use std::sync::Arc;
    use std::time::Duration;

    fn services(backend: &Arc<MockMlBackend>) -> Arc<MlServices> {
        let providers = Arc::new(ProviderCatalog::builtin().unwrap());
        Arc::new(
            MlServices::from_backend(Arc::clone(backend), providers)
                .with_agent_propagation_delay(Duration::ZERO),
        )
    }

    fn request() -> InstallRequest {
        InstallRequest {
            selected_provider: "OpenAI".to_string(),
            model_id: "gpt-4o".to_string(),
            api_url: "https://api.openai.com".to_string(),
            api_key: "sk-test".to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_no_active_agent_on_empty_cluster() {
        let backend = Arc::new(MockMlBackend::new());
        let services = services(&backend);

        assert_eq!(active_agent(&services).await.unwrap(), None);
        assert!(list_models(&services).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_installed_model_is_flagged_active() {
        let backend = Arc::new(MockMlBackend::new());
        let services = services(&backend);
        let installer = InstallationManager::new(Arc::clone(&services));

        installer.execute(&request()).await;
        installer.execute(&request()).await;

        let agent = active_agent(&services).await.unwrap().unwrap();
        assert_eq!(agent.id, "agent-2");
        assert_eq!(agent.model_id.as_deref(), Some("model-2"));

        let models = list_models(&services).await.unwrap();
        assert_eq!(models.len(), 2);
        let flagged: Vec<&str> = models
            .iter()
            .filter(|m| m.is_active_agent_model)
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(flagged, vec!["model-2"]);
    }

    #[tokio::test]
    async fn test_models_carry_their_agent() {
        let backend = Arc::new(MockMlBackend::new());
        let services = services(&backend);
        InstallationManager::new(Arc::clone(&services))
            .execute(&request())
            .await;

        let models = list_models(&services).await.unwrap();
        let agent = models[0].agent.as_ref().unwrap();
        assert_eq!(agent.id, "agent-1");
        assert_eq!(agent.model_id.as_deref(), Some("model-1"));
    }

    #[tokio::test]
    async fn test_delete_model_removes_related_entities() {
        let backend = Arc::new(MockMlBackend::new());
        let services = services(&backend);
        InstallationManager::new(Arc::clone(&services))
            .execute(&request())
            .await;
        let installed = backend.calls().len();

        delete_model_with_related_entities(&services, "model-1")
            .await
            .unwrap();

        assert_eq!(
            &backend.calls()[installed..],
            &[
                BackendCall::DeleteAgentsByModel("model-1".to_string()),
                BackendCall::UndeployModel("model-1".to_string()),
                BackendCall::DeleteModel("model-1".to_string()),
                BackendCall::DeleteConnector("connector-1".to_string()),
                BackendCall::DeleteModelGroup("model-group-1".to_string()),
            ]
        );
        assert!(backend.agents().is_empty());
        assert!(backend.models().is_empty());
        assert!(backend.connectors().is_empty());
        assert!(backend.model_groups().is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_model_touches_nothing() {
        let backend = Arc::new(MockMlBackend::new());
        let services = services(&backend);

        let error = delete_model_with_related_entities(&services, "model-9")
            .await
            .unwrap_err();

        assert_eq!(error, MonitorError::ModelNotFound("model-9".to_string()));
        assert_eq!(error.to_string(), "Model not found: model-9");
        assert!(backend.calls().is_empty());
    }
}
