//! Sends a test prompt to the new model and validates the answer.

use super::error::{Details, StepError};
use super::{possible_causes, InstallationStep, RollbackFailure};
use crate::context::InstallationContext;
use crate::predict;
use crate::repositories::MlServices;
use async_trait::async_trait;
use da_protocol::installation_models::InstallRequest;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

pub const NAME: &str = "Test Model Connection";
const ACTION: &str = "validating the model connection";

pub struct TestModelConnectionStep {
    services: Arc<MlServices>,
}

impl TestModelConnectionStep {
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

/// The response as a detail value, or the serialization error in its place.
fn response_detail<T: Serialize>(response: &T) -> Value {
    serde_json::to_value(response)
        .unwrap_or_else(|e| json!(format!("Response could not be serialized: {e}")))
}

#[async_trait]
impl InstallationStep for TestModelConnectionStep {
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
        details.insert("apiUrl".to_string(), json!(request.api_url));

        let Some(model_id) = context.model_id().map(str::to_string) else {
            return Err(Self::error(
                &details,
                "Model identifier not found in installation context",
            ));
        };
        details.insert("modelId".to_string(), json!(model_id));
        debug!(%model_id, "Testing model connection");

        let response = self
            .services
            .models
            .validate_connection(&model_id)
            .await
            .map_err(|e| {
                StepError::builder(NAME)
                    .action(ACTION)
                    .details(details.clone())
                    .possible_causes(possible_causes(&e, &model_id))
                    .build(e)
            })?;

        if let Err(e) = predict::validate(&response) {
            return Err(StepError::builder(NAME)
                .action(ACTION)
                .details(details)
                .detail("response", response_detail(&response))
                .build(format!("Model connection validation returned false: {e}")));
        }

        info!(%model_id, "Model connection validated");
        Ok(())
    }

    async fn rollback(
        &self,
        _request: &InstallRequest,
        _context: &mut InstallationContext,
        _failure: &StepError,
    ) -> Result<(), RollbackFailure> {
        Ok(())
    }

    fn success_message(&self) -> &'static str {
        "Model connection tested successfully"
    }

    fn failure_message(&self) -> &'static str {
        "Failed to test model connection. Please check the model configuration and try again."
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextKey;
    use crate::error::RepositoryError;
    use crate::repositories::mock::{BackendOperation, MockMlBackend};
    use crate::steps::test_support::{request, services, unwinding};

    fn context_with_model() -> InstallationContext {
        let mut context = InstallationContext::new();
        context.set(ContextKey::ModelId, "model-1");
        context
    }

    #[tokio::test]
    async fn test_positive_prediction_passes() {
        let backend = Arc::new(MockMlBackend::new());
        let step = TestModelConnectionStep::new(services(&backend));

        step.execute(&request("OpenAI"), &mut context_with_model())
            .await
            .unwrap();
        assert_eq!(backend.call_count(BackendOperation::ValidateConnection), 1);
    }

    #[tokio::test]
    async fn test_missing_model_id() {
        let backend = Arc::new(MockMlBackend::new());
        let step = TestModelConnectionStep::new(services(&backend));

        let error = step
            .execute(&request("OpenAI"), &mut InstallationContext::new())
            .await
            .unwrap_err();

        assert_eq!(error.cause(), "Model identifier not found in installation context");
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_negative_prediction_fails() {
        let backend = Arc::new(MockMlBackend::new().with_negative_prediction());
        let step = TestModelConnectionStep::new(services(&backend));

        let error = step
            .execute(&request("OpenAI"), &mut context_with_model())
            .await
            .unwrap_err();

        assert!(error
            .cause()
            .starts_with("Model connection validation returned false"));
        assert!(error.details().contains_key("response"));
        assert!(error.possible_causes().is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_suggests_api_key() {
        let backend = Arc::new(MockMlBackend::new().with_failure(
            BackendOperation::ValidateConnection,
            RepositoryError::Status {
                status: 401,
                message: "Incorrect API key provided".to_string(),
            },
        ));
        let step = TestModelConnectionStep::new(services(&backend));

        let error = step
            .execute(&request("OpenAI"), &mut context_with_model())
            .await
            .unwrap_err();

        assert_eq!(
            error.possible_causes(),
            ["Verify the API key; it may be incorrect or lack permissions."]
        );
        assert_eq!(error.details()["modelId"], json!("model-1"));
    }

    #[tokio::test]
    async fn test_not_found_names_installed_model() {
        let backend = Arc::new(MockMlBackend::new().with_failure(
            BackendOperation::ValidateConnection,
            RepositoryError::Status {
                status: 404,
                message: "model not found".to_string(),
            },
        ));
        let step = TestModelConnectionStep::new(services(&backend));

        let error = step
            .execute(&request("OpenAI"), &mut context_with_model())
            .await
            .unwrap_err();

        assert_eq!(
            error.possible_causes(),
            ["Confirm that model `model-1` exists and is deployed."]
        );
    }

    #[tokio::test]
    async fn test_network_error_suggests_api_url() {
        let backend = Arc::new(MockMlBackend::new().with_failure(
            BackendOperation::ValidateConnection,
            RepositoryError::Network("dns error".to_string()),
        ));
        let step = TestModelConnectionStep::new(services(&backend));

        let error = step
            .execute(&request("OpenAI"), &mut context_with_model())
            .await
            .unwrap_err();

        assert!(error.possible_causes()[0].contains("API URL"));
    }

    #[test]
    fn test_unserializable_response_keeps_error_text() {
        struct Unserializable;

        impl Serialize for Unserializable {
            fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("bad payload"))
            }
        }

        assert_eq!(
            response_detail(&Unserializable),
            json!("Response could not be serialized: bad payload")
        );
    }

    #[tokio::test]
    async fn test_rollback_is_noop() {
        let backend = Arc::new(MockMlBackend::new());
        let step = TestModelConnectionStep::new(services(&backend));
        let mut context = context_with_model();

        step.rollback(&request("OpenAI"), &mut context, &unwinding())
            .await
            .unwrap();
        assert!(backend.calls().is_empty());
        assert_eq!(context.model_id(), Some("model-1"));
    }
}
