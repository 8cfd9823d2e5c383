//! ML-Commons repositories.
//!
//! The installation steps and the monitoring views never talk HTTP directly.
//! They go through the repository traits defined here, bundled in
//! [`MlServices`]:
//!
//! - [`ClusterSettingsRepository`]: plugin cluster settings
//! - [`ConnectorRepository`]: remote-model connectors
//! - [`ModelRepository`]: registered models and prediction
//! - [`ModelGroupRepository`]: groups models are registered in
//! - [`AgentRepository`]: agents and the active assistant agent
//!
//! Two implementations are provided: [`opensearch::OpenSearchClient`] for a
//! real cluster and [`mock::MockMlBackend`] for tests and dry runs.

pub mod dto;
pub mod mock;
pub mod opensearch;

use crate::config::providers::ProviderCatalog;
use crate::error::RepositoryResult;
use async_trait::async_trait;
use da_protocol::monitor_models::{AgentSummary, ModelSummary};
use dto::{
    CreateAgentRequest, CreateConnectorRequest, CreateModelRequest, CreatedResource,
    MlCommonsSettings, ModelPredictResponse,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait ClusterSettingsRepository: Send + Sync {
    /// Persist the ML-Commons plugin settings.
    ///
    /// # Errors
    ///
    /// Returns `NotAcknowledged` when the cluster did not confirm the update.
    async fn persist(&self, settings: &MlCommonsSettings) -> RepositoryResult<()>;

    /// Read the current cluster settings document.
    async fn retrieve(&self) -> RepositoryResult<Value>;
}

#[async_trait]
pub trait ConnectorRepository: Send + Sync {
    async fn create(&self, request: &CreateConnectorRequest) -> RepositoryResult<CreatedResource>;

    async fn delete(&self, connector_id: &str) -> RepositoryResult<()>;
}

#[async_trait]
pub trait ModelRepository: Send + Sync {
    /// Register (and deploy) a remote model bound to a connector.
    async fn create(&self, request: &CreateModelRequest) -> RepositoryResult<CreatedResource>;

    async fn delete(&self, model_id: &str) -> RepositoryResult<()>;

    async fn undeploy(&self, model_id: &str) -> RepositoryResult<()>;

    /// Send a test prompt to the model and return the raw prediction.
    async fn validate_connection(&self, model_id: &str) -> RepositoryResult<ModelPredictResponse>;

    /// Look up a model, `None` when it does not exist.
    async fn find_by_id(&self, model_id: &str) -> RepositoryResult<Option<ModelSummary>>;

    async fn get_all(&self) -> RepositoryResult<Vec<ModelSummary>>;
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn create(&self, request: &CreateAgentRequest) -> RepositoryResult<CreatedResource>;

    async fn delete(&self, agent_id: &str) -> RepositoryResult<()>;

    /// Identifier of the agent the dashboard assistant currently uses.
    async fn get_active(&self) -> RepositoryResult<Option<String>>;

    /// Make `agent_id` the active assistant agent.
    async fn register(&self, agent_id: &str) -> RepositoryResult<()>;

    async fn find_by_id(&self, agent_id: &str) -> RepositoryResult<Option<AgentSummary>>;

    /// First agent whose LLM is bound to `model_id`.
    async fn find_by_model_id(&self, model_id: &str) -> RepositoryResult<Option<AgentSummary>>;

    /// Delete every agent bound to `model_id`.
    async fn delete_by_model_id(&self, model_id: &str) -> RepositoryResult<()>;
}

#[async_trait]
pub trait ModelGroupRepository: Send + Sync {
    async fn delete(&self, group_id: &str) -> RepositoryResult<()>;
}

/// Collaborators shared by every installation step.
#[derive(Clone)]
pub struct MlServices {
    pub settings: Arc<dyn ClusterSettingsRepository>,
    pub connectors: Arc<dyn ConnectorRepository>,
    pub models: Arc<dyn ModelRepository>,
    pub model_groups: Arc<dyn ModelGroupRepository>,
    pub agents: Arc<dyn AgentRepository>,
    pub providers: Arc<ProviderCatalog>,

    /// Pause after registering the agent so the cluster can propagate it.
    pub agent_propagation_delay: Duration,
}

impl MlServices {
    /// Wire every repository to one backend.
    ///
    /// # Arguments
    ///
    /// * `backend` - Implementation of every repository trait
    /// * `providers` - Provider catalog used to build connector and agent requests
    pub fn from_backend<B>(backend: Arc<B>, providers: Arc<ProviderCatalog>) -> Self
    where
        B: ClusterSettingsRepository
            + ConnectorRepository
            + ModelRepository
            + ModelGroupRepository
            + AgentRepository
            + 'static,
    {
        Self {
            settings: backend.clone(),
            connectors: backend.clone(),
            models: backend.clone(),
            model_groups: backend.clone(),
            agents: backend,
            providers,
            agent_propagation_delay: Duration::from_millis(1000),
        }
    }

    pub fn with_agent_propagation_delay(mut self, delay: Duration) -> Self {
        self.agent_propagation_delay = delay;
        self
    }
}
