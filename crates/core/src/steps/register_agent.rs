//! Makes the new agent the active dashboard assistant agent.

use super::error::{Details, StepError};
use super::{InstallationStep, RollbackFailure};
use crate::context::{ContextKey, InstallationContext};
use crate::repositories::MlServices;
use async_trait::async_trait;
use da_protocol::installation_models::InstallRequest;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

pub const NAME: &str = "Register Agent";
const ACTION: &str = "registering the assistant agent for usage";

pub struct RegisterAgentStep {
    services: Arc<MlServices>,
}

impl RegisterAgentStep {
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
impl InstallationStep for RegisterAgentStep {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn execute(
        &self,
        _request: &InstallRequest,
        context: &mut InstallationContext,
    ) -> Result<(), StepError> {
        let mut details = Details::new();

        let agent_id = context
            .get(ContextKey::AgentId)
            .map_err(|e| Self::error(&details, e))?
            .to_string();
        details.insert("agentId".to_string(), json!(agent_id));

        self.services
            .agents
            .register(&agent_id)
            .await
            .map_err(|e| Self::error(&details, e))?;

        let delay = self.services.agent_propagation_delay;
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "Waiting for agent propagation");
            tokio::time::sleep(delay).await;
        }

        info!(%agent_id, "Agent registered");
        Ok(())
    }

    /// Registration is the last step, so nothing can fail after it.
    // TODO: restore the previously active agent if a step is ever added after this one.
    async fn rollback(
        &self,
        _request: &InstallRequest,
        _context: &mut InstallationContext,
        _failure: &StepError,
    ) -> Result<(), RollbackFailure> {
        Ok(())
    }

    fn success_message(&self) -> &'static str {
        "Agent registered successfully"
    }

    fn failure_message(&self) -> &'static str {
        "Failed to register agent. Please check the configuration and try again."
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepositoryError;
    use crate::repositories::mock::{BackendCall, BackendOperation, MockMlBackend};
    use crate::steps::test_support::{request, services, unwinding};
    use std::time::Duration;

    fn context_with_agent() -> InstallationContext {
        let mut context = InstallationContext::new();
        context.set(ContextKey::AgentId, "agent-1");
        context
    }

    #[tokio::test]
    async fn test_registers_agent() {
        let backend = Arc::new(MockMlBackend::new());
        let step = RegisterAgentStep::new(services(&backend));

        step.execute(&request("OpenAI"), &mut context_with_agent())
            .await
            .unwrap();

        assert_eq!(backend.active_agent().as_deref(), Some("agent-1"));
        assert_eq!(
            backend.calls(),
            vec![BackendCall::RegisterAgent("agent-1".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_propagation() {
        let backend = Arc::new(MockMlBackend::new());
        let services = Arc::new(
            (*services(&backend))
                .clone()
                .with_agent_propagation_delay(Duration::from_millis(1000)),
        );
        let step = RegisterAgentStep::new(services);

        let started = tokio::time::Instant::now();
        step.execute(&request("OpenAI"), &mut context_with_agent())
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_missing_agent_id() {
        let backend = Arc::new(MockMlBackend::new());
        let step = RegisterAgentStep::new(services(&backend));

        let error = step
            .execute(&request("OpenAI"), &mut InstallationContext::new())
            .await
            .unwrap_err();

        assert_eq!(error.cause(), "agentId not found in installation context");
        assert!(error.to_string().contains("while registering the assistant agent"));
    }

    #[tokio::test]
    async fn test_register_failure() {
        let backend = Arc::new(MockMlBackend::new().with_failure(
            BackendOperation::RegisterAgent,
            RepositoryError::Status {
                status: 403,
                message: "forbidden".to_string(),
            },
        ));
        let step = RegisterAgentStep::new(services(&backend));

        let error = step
            .execute(&request("OpenAI"), &mut context_with_agent())
            .await
            .unwrap_err();

        assert_eq!(error.details()["agentId"], json!("agent-1"));
        assert!(backend.active_agent().is_none());
    }

    #[tokio::test]
    async fn test_rollback_is_noop() {
        let backend = Arc::new(MockMlBackend::new());
        let step = RegisterAgentStep::new(services(&backend));

        step.rollback(&request("OpenAI"), &mut context_with_agent(), &unwinding())
            .await
            .unwrap();
        assert!(backend.calls().is_empty());
    }
}
