//! Installation orchestrator.
//!
//! The `InstallationManager` drives one complete installation: it builds the
//! six steps, runs them through a fresh saga manager, and folds the outcome
//! into an `InstallationResult`. A failed run never surfaces as an `Err`; the
//! failure is reported inside the result together with the compensations
//! that were attempted.

use crate::context::InstallationContext;
use crate::repositories::MlServices;
use crate::state::manager::{InstallationProgressManager, SagaError};
use crate::steps::{self, InstallationStep};
use da_protocol::installation_models::{
    InstallRequest, InstallResponse, InstallationError, InstallationProgress, InstallationResult,
    RollbackError,
};
use da_protocol::ipc::Event;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info};
use uuid::Uuid;

pub const SUCCESS_MESSAGE: &str = "Dashboard assistant installed successfully";

const EVENT_CAPACITY: usize = 256;

/// Runs assistant installations, one at a time.
pub struct InstallationManager {
    services: Arc<MlServices>,
    events_tx: broadcast::Sender<Event>,

    /// Serializes `execute` calls.
    run_lock: Mutex<()>,
}

impl InstallationManager {
    /// Create a new InstallationManager.
    ///
    /// # Arguments
    ///
    /// * `services` - Repositories and provider catalog the steps use
    pub fn new(services: Arc<MlServices>) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            services,
            events_tx,
            run_lock: Mutex::new(()),
        }
    }

    /// Receive the events of every subsequent run.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events_tx.subscribe()
    }

    /// Run the full installation for `request`.
    ///
    /// Steps run in order; the first failure stops the run after its
    /// compensations. Concurrent calls wait for the previous run to finish.
    ///
    /// # Returns
    ///
    /// An `InstallationResult` with the final progress ledger, the identifiers
    /// of resources that still exist, and on failure the errors and rollback
    /// outcomes.
    pub async fn execute(&self, request: &InstallRequest) -> InstallationResult {
        let _run = self.run_lock.lock().await;
        let steps = steps::default_steps(&self.services);
        self.run(&steps, request).await
    }

    /// Run the installation and reduce the result to what the dashboard shows.
    pub async fn install(&self, request: &InstallRequest) -> InstallResponse {
        self.execute(request).await.into()
    }

    async fn run(
        &self,
        steps: &[Arc<dyn InstallationStep>],
        request: &InstallRequest,
    ) -> InstallationResult {
        let installation_id = Uuid::new_v4();
        let mut context = InstallationContext::new();

        let manager =
            match InstallationProgressManager::new(installation_id, steps, self.events_tx.clone()) {
                Ok(manager) => manager,
                Err(e) => {
                    return failure_result(
                        format!("Installation failed at an unknown step: {e}"),
                        InstallationProgress::new(Vec::<String>::new()),
                        &context,
                        None,
                    )
                }
            };

        info!(
            %installation_id,
            provider = %request.selected_provider,
            model = %request.model_id,
            "Starting dashboard assistant installation"
        );
        self.publish(Event::InstallationStarted {
            installation_id,
            step_count: steps.len(),
        });

        for step in steps {
            if let Err(e) = manager.run_step(Arc::clone(step), request, &mut context).await {
                return self.failed(&manager, &context, &e);
            }
        }

        info!(%installation_id, "Dashboard assistant installed");
        self.publish(Event::InstallationCompleted { installation_id });

        InstallationResult {
            success: true,
            message: SUCCESS_MESSAGE.to_string(),
            progress: manager.get_progress(),
            data: context.to_data(),
            errors: None,
            rollbacks: None,
            rollback_errors: None,
        }
    }

    fn failed(
        &self,
        manager: &InstallationProgressManager,
        context: &InstallationContext,
        cause: &SagaError,
    ) -> InstallationResult {
        let progress = manager.get_progress();
        let failed_step = progress
            .failed_steps()
            .first()
            .map(|step| step.step_name.clone());

        let message = match &failed_step {
            Some(step) => format!("Installation failed during step \"{step}\": {cause}"),
            None => format!("Installation failed at an unknown step: {cause}"),
        };

        error!(
            installation_id = %manager.installation_id(),
            step = failed_step.as_deref().unwrap_or("unknown"),
            "Installation failed"
        );
        self.publish(Event::InstallationFailed {
            installation_id: manager.installation_id(),
            step: failed_step.unwrap_or_else(|| "unknown".to_string()),
            error: cause.to_string(),
        });

        let mut result = failure_result(message, progress, context, manager.get_rollback_errors());
        result.rollbacks = manager.get_rollbacks();
        result
    }

    fn publish(&self, event: Event) {
        let _ = self.events_tx.send(event);
    }
}

fn failure_result(
    message: String,
    progress: InstallationProgress,
    context: &InstallationContext,
    rollback_errors: Option<Vec<RollbackError>>,
) -> InstallationResult {
    let errors = progress
        .failed_steps()
        .into_iter()
        .map(|step| InstallationError {
            step: step.step_name.clone(),
            message: step
                .message
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string()),
            details: step.error.clone(),
        })
        .collect();

    InstallationResult {
        success: false,
        message,
        progress,
        data: context.to_data(),
        errors: Some(errors),
        rollbacks: None,
        rollback_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::providers::ProviderCatalog;
    use crate::error::RepositoryError;
    use crate::repositories::mock::{BackendOperation, MockMlBackend};
    use da_protocol::installation_models::ExecutionState;
    use std::time::Duration;

    fn request() -> InstallRequest {
        InstallRequest {
            selected_provider: "OpenAI".to_string(),
            model_id: "gpt-4o".to_string(),
            api_url: "https://api.openai.com".to_string(),
            api_key: "sk-test".to_string(),
            description: None,
        }
    }

    fn installer(backend: &Arc<MockMlBackend>) -> InstallationManager {
        let providers = Arc::new(ProviderCatalog::builtin().unwrap());
        let services = MlServices::from_backend(Arc::clone(backend), providers)
            .with_agent_propagation_delay(Duration::ZERO);
        InstallationManager::new(Arc::new(services))
    }

    #[tokio::test]
    async fn test_execute_success() {
        let backend = Arc::new(MockMlBackend::new());
        let result = installer(&backend).execute(&request()).await;

        assert!(result.success);
        assert_eq!(result.message, SUCCESS_MESSAGE);
        assert!(result.progress.is_finished_successfully());
        assert_eq!(result.data.connector_id.as_deref(), Some("connector-1"));
        assert_eq!(result.data.model_id.as_deref(), Some("model-1"));
        assert_eq!(result.data.agent_id.as_deref(), Some("agent-1"));
        assert!(result.errors.is_none());
    }

    #[tokio::test]
    async fn test_execute_failure_message_names_step() {
        let backend = Arc::new(MockMlBackend::new().with_failure(
            BackendOperation::CreateModel,
            RepositoryError::Status {
                status: 500,
                message: "model registration failed".to_string(),
            },
        ));
        let result = installer(&backend).execute(&request()).await;

        assert!(!result.success);
        assert!(result
            .message
            .starts_with("Installation failed during step \"Create Model\": "));
        assert!(result.message.contains("model registration failed"));
        assert_eq!(result.progress.steps[2].state, ExecutionState::Failed);

        let errors = result.errors.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].step, "Create Model");
        assert_eq!(
            errors[0].message,
            "Failed to create model. Please check the configuration and try again."
        );
        assert!(errors[0].details.is_some());
    }

    #[tokio::test]
    async fn test_install_response_lists_rollbacks() {
        let backend = Arc::new(MockMlBackend::new().with_negative_prediction());
        let response = installer(&backend).install(&request()).await;

        assert!(!response.success);
        assert_eq!(
            response.rollbacks,
            Some(vec![
                "Test Model Connection".to_string(),
                "Create Model".to_string(),
                "Create Connector".to_string(),
                "Update ML Commons Settings".to_string(),
            ])
        );
        assert_eq!(response.data, Some(Default::default()));
    }

    #[test]
    fn test_failure_result_without_failed_step() {
        let progress = InstallationProgress::new(["a"]);
        let result = failure_result(
            "Installation failed at an unknown step: x".to_string(),
            progress,
            &InstallationContext::new(),
            None,
        );
        assert!(!result.success);
        assert_eq!(result.errors, Some(Vec::new()));
    }
}
