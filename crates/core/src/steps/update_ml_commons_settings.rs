//! Enables the ML-Commons agent framework and trusts the provider endpoint.

use super::error::{Details, StepError};
use super::{InstallationStep, RollbackFailure};
use crate::config::providers::DEFAULT_ENDPOINT_REGEX;
use crate::context::InstallationContext;
use crate::repositories::dto::MlCommonsSettings;
use crate::repositories::MlServices;
use async_trait::async_trait;
use da_protocol::installation_models::InstallRequest;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

pub const NAME: &str = "Update ML Commons Settings";
const ACTION: &str = "updating ML Commons settings in the cluster";

pub struct UpdateMlCommonsSettingsStep {
    services: Arc<MlServices>,
}

impl UpdateMlCommonsSettingsStep {
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
impl InstallationStep for UpdateMlCommonsSettingsStep {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn execute(
        &self,
        request: &InstallRequest,
        _context: &mut InstallationContext,
    ) -> Result<(), StepError> {
        let mut details = Details::new();
        details.insert("provider".to_string(), json!(request.selected_provider));

        let provider = self
            .services
            .providers
            .require(&request.selected_provider)
            .map_err(|e| Self::error(&details, e))?;

        let endpoint_regex = provider
            .default_endpoint_regex
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT_REGEX.to_string());
        details.insert("endpointRegex".to_string(), json!(endpoint_regex));

        let settings = MlCommonsSettings::trusting(vec![endpoint_regex]);
        debug!(provider = %provider.name, "Persisting ML Commons settings");

        self.services
            .settings
            .persist(&settings)
            .await
            .map_err(|e| Self::error(&details, e))?;

        info!(provider = %provider.name, "ML Commons settings updated");
        Ok(())
    }

    /// Settings are left in place; they are harmless without the resources.
    async fn rollback(
        &self,
        _request: &InstallRequest,
        _context: &mut InstallationContext,
        _failure: &StepError,
    ) -> Result<(), RollbackFailure> {
        Ok(())
    }

    fn success_message(&self) -> &'static str {
        "ML Commons settings have been updated successfully"
    }

    fn failure_message(&self) -> &'static str {
        "Failed to update ML Commons settings. Please check the configuration and try again."
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepositoryError;
    use crate::repositories::mock::{BackendCall, BackendOperation, MockMlBackend};
    use crate::steps::test_support::{request, services, unwinding};

    #[tokio::test]
    async fn test_persists_provider_endpoint() {
        let backend = Arc::new(MockMlBackend::new());
        let step = UpdateMlCommonsSettingsStep::new(services(&backend));
        let mut context = InstallationContext::new();

        step.execute(&request("OpenAI"), &mut context).await.unwrap();

        let settings = backend.settings().unwrap();
        assert_eq!(
            settings.trusted_connector_endpoints_regex,
            vec![r"^https://api\.openai\.com/.*$".to_string()]
        );
        assert!(settings.agent_framework_enabled);
        assert!(!settings.only_run_on_ml_node);
        assert!(settings.rag_pipeline_feature_enabled);
        assert!(context.to_data().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_provider_fails_without_calls() {
        let backend = Arc::new(MockMlBackend::new());
        let step = UpdateMlCommonsSettingsStep::new(services(&backend));
        let mut context = InstallationContext::new();

        let error = step.execute(&request("Foo"), &mut context).await.unwrap_err();

        assert!(error.to_string().contains("Unknown provider: Foo"));
        assert!(error.to_string().contains("while updating ML Commons settings"));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_not_acknowledged_is_reported() {
        let backend = Arc::new(MockMlBackend::new().with_failure(
            BackendOperation::PersistSettings,
            RepositoryError::NotAcknowledged("Failed to update cluster settings".to_string()),
        ));
        let step = UpdateMlCommonsSettingsStep::new(services(&backend));

        let error = step
            .execute(&request("OpenAI"), &mut InstallationContext::new())
            .await
            .unwrap_err();

        assert_eq!(error.cause(), "Failed to update cluster settings");
        assert_eq!(error.details()["provider"], json!("OpenAI"));
        assert!(matches!(
            backend.calls()[0],
            BackendCall::PersistSettings { .. }
        ));
    }

    #[tokio::test]
    async fn test_rollback_is_noop() {
        let backend = Arc::new(MockMlBackend::new());
        let step = UpdateMlCommonsSettingsStep::new(services(&backend));

        step.rollback(&request("OpenAI"), &mut InstallationContext::new(), &unwinding())
            .await
            .unwrap();
        assert!(backend.calls().is_empty());
    }
}
