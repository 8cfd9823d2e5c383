//! Installation steps.
//!
//! Each step creates (or configures) one ML-Commons resource and knows how to
//! compensate for it. The saga manager runs the steps in the order returned by
//! [`default_steps`] and, when one fails, invokes `rollback` on the failing
//! step and then on every completed step in reverse order.

pub mod create_agent;
pub mod create_connector;
pub mod create_model;
pub mod error;
pub mod register_agent;
pub mod test_model_connection;
pub mod update_ml_commons_settings;

use crate::context::InstallationContext;
use crate::error::RepositoryError;
use crate::repositories::MlServices;
use async_trait::async_trait;
use da_protocol::installation_models::InstallRequest;
use std::sync::Arc;
use thiserror::Error;

pub use create_agent::CreateAgentStep;
pub use create_connector::CreateConnectorStep;
pub use create_model::CreateModelStep;
pub use error::StepError;
pub use register_agent::RegisterAgentStep;
pub use test_model_connection::TestModelConnectionStep;
pub use update_ml_commons_settings::UpdateMlCommonsSettingsStep;

/// A compensation that could not undo its step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct RollbackFailure(pub String);

impl RollbackFailure {
    /// Failure to delete a resource the step created.
    pub fn resource(action: &str, id_field: &str, id: &str, cause: &RepositoryError) -> Self {
        Self(format!(
            "Failed to rollback {action} for {id_field}=\"{id}\": {cause}"
        ))
    }
}

/// One unit of the installation saga.
///
/// Implementations must make `rollback` idempotent: when the identifier the
/// step would have produced is absent from the context, it does nothing.
#[async_trait]
pub trait InstallationStep: Send + Sync {
    /// Display name shown in the progress ledger.
    fn name(&self) -> &'static str;

    /// Perform the step, storing any produced identifier in `context`.
    ///
    /// # Errors
    ///
    /// Returns a `StepError` describing what the step was doing and why it
    /// failed.
    async fn execute(
        &self,
        request: &InstallRequest,
        context: &mut InstallationContext,
    ) -> Result<(), StepError>;

    /// Undo the effect of a successful `execute`.
    ///
    /// `failure` is the error that made the saga unwind. A compensation that
    /// removes a resource also removes its identifier from `context`.
    async fn rollback(
        &self,
        request: &InstallRequest,
        context: &mut InstallationContext,
        failure: &StepError,
    ) -> Result<(), RollbackFailure>;

    fn success_message(&self) -> &'static str;

    fn failure_message(&self) -> &'static str;
}

/// The six steps of an assistant installation, in execution order.
pub fn default_steps(services: &Arc<MlServices>) -> Vec<Arc<dyn InstallationStep>> {
    vec![
        Arc::new(UpdateMlCommonsSettingsStep::new(Arc::clone(services))),
        Arc::new(CreateConnectorStep::new(Arc::clone(services))),
        Arc::new(CreateModelStep::new(Arc::clone(services))),
        Arc::new(TestModelConnectionStep::new(Arc::clone(services))),
        Arc::new(CreateAgentStep::new(Arc::clone(services))),
        Arc::new(RegisterAgentStep::new(Arc::clone(services))),
    ]
}

/// Advisory causes for a repository failure talking to a provider.
pub(crate) fn possible_causes(error: &RepositoryError, model_id: &str) -> Vec<String> {
    match error.status() {
        Some(401) | Some(403) => {
            vec!["Verify the API key; it may be incorrect or lack permissions.".to_string()]
        }
        Some(404) => vec![format!(
            "Confirm that model `{model_id}` exists and is deployed."
        )],
        None if error.is_network() => vec![
            "Check the API URL for typos and ensure the endpoint is reachable.".to_string(),
        ],
        _ => Vec::new(),
    }
}
