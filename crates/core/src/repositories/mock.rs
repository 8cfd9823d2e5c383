//! In-process ML-Commons backend.
//!
//! `MockMlBackend` implements every repository trait against in-memory state.
//! It records each call in order, hands out sequential identifiers, and can be
//! told to fail a given operation or to answer predictions with an empty
//! payload. Tests use it to observe compensation order; the CLI uses it for
//! `install --dry-run`.

use super::dto::{
    CreateAgentRequest, CreateConnectorRequest, CreateModelRequest, CreatedResource,
    MlCommonsSettings, ModelPredictResponse,
};
use super::{
    AgentRepository, ClusterSettingsRepository, ConnectorRepository, ModelGroupRepository,
    ModelRepository,
};
use crate::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use da_protocol::monitor_models::{AgentSummary, ModelSummary};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Operations the mock can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOperation {
    PersistSettings,
    CreateConnector,
    DeleteConnector,
    CreateModel,
    UndeployModel,
    DeleteModel,
    DeleteModelGroup,
    ValidateConnection,
    CreateAgent,
    DeleteAgent,
    DeleteAgentsByModel,
    RegisterAgent,
}

/// One recorded repository call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    PersistSettings { endpoints_regex: Vec<String> },
    CreateConnector { name: String },
    DeleteConnector(String),
    CreateModel { connector_id: String },
    UndeployModel(String),
    DeleteModel(String),
    DeleteModelGroup(String),
    ValidateConnection(String),
    CreateAgent { model_id: String },
    DeleteAgent(String),
    DeleteAgentsByModel(String),
    RegisterAgent(String),
}

impl BackendCall {
    pub fn operation(&self) -> BackendOperation {
        match self {
            BackendCall::PersistSettings { .. } => BackendOperation::PersistSettings,
            BackendCall::CreateConnector { .. } => BackendOperation::CreateConnector,
            BackendCall::DeleteConnector(_) => BackendOperation::DeleteConnector,
            BackendCall::CreateModel { .. } => BackendOperation::CreateModel,
            BackendCall::UndeployModel(_) => BackendOperation::UndeployModel,
            BackendCall::DeleteModel(_) => BackendOperation::DeleteModel,
            BackendCall::DeleteModelGroup(_) => BackendOperation::DeleteModelGroup,
            BackendCall::ValidateConnection(_) => BackendOperation::ValidateConnection,
            BackendCall::CreateAgent { .. } => BackendOperation::CreateAgent,
            BackendCall::DeleteAgent(_) => BackendOperation::DeleteAgent,
            BackendCall::DeleteAgentsByModel(_) => BackendOperation::DeleteAgentsByModel,
            BackendCall::RegisterAgent(_) => BackendOperation::RegisterAgent,
        }
    }
}

#[derive(Default)]
struct MockState {
    calls: Vec<BackendCall>,
    failures: HashMap<BackendOperation, RepositoryError>,
    negative_prediction: bool,
    counters: HashMap<&'static str, usize>,
    settings: Option<MlCommonsSettings>,
    connectors: BTreeSet<String>,
    models: BTreeMap<String, ModelSummary>,
    model_groups: BTreeSet<String>,
    agents: BTreeMap<String, AgentSummary>,
    active_agent: Option<String>,
}

impl MockState {
    fn next_id(&mut self, prefix: &'static str) -> String {
        let counter = self.counters.entry(prefix).or_insert(0);
        *counter += 1;
        format!("{prefix}-{counter}")
    }

    /// Record `call`, then fail it if a failure was configured.
    fn record(&mut self, call: BackendCall) -> RepositoryResult<()> {
        let operation = call.operation();
        self.calls.push(call);
        match self.failures.get(&operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct MockMlBackend {
    state: Mutex<MockState>,
}

impl MockMlBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `operation` fail with `error`.
    pub fn with_failure(self, operation: BackendOperation, error: RepositoryError) -> Self {
        self.state.lock().failures.insert(operation, error);
        self
    }

    /// Answer predictions with a payload that carries no content.
    pub fn with_negative_prediction(self) -> Self {
        self.state.lock().negative_prediction = true;
        self
    }

    pub fn fail_on(&self, operation: BackendOperation, error: RepositoryError) {
        self.state.lock().failures.insert(operation, error);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, operation: BackendOperation) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    pub fn settings(&self) -> Option<MlCommonsSettings> {
        self.state.lock().settings.clone()
    }

    pub fn connectors(&self) -> Vec<String> {
        self.state.lock().connectors.iter().cloned().collect()
    }

    pub fn models(&self) -> Vec<String> {
        self.state.lock().models.keys().cloned().collect()
    }

    pub fn model_groups(&self) -> Vec<String> {
        self.state.lock().model_groups.iter().cloned().collect()
    }

    pub fn agents(&self) -> Vec<String> {
        self.state.lock().agents.keys().cloned().collect()
    }

    pub fn active_agent(&self) -> Option<String> {
        self.state.lock().active_agent.clone()
    }
}

#[async_trait]
impl ClusterSettingsRepository for MockMlBackend {
    async fn persist(&self, settings: &MlCommonsSettings) -> RepositoryResult<()> {
        let mut state = self.state.lock();
        state.record(BackendCall::PersistSettings {
            endpoints_regex: settings.trusted_connector_endpoints_regex.clone(),
        })?;
        state.settings = Some(settings.clone());
        Ok(())
    }

    async fn retrieve(&self) -> RepositoryResult<Value> {
        let state = self.state.lock();
        Ok(json!({ "persistent": { "plugins": { "ml_commons": state.settings } } }))
    }
}

#[async_trait]
impl ConnectorRepository for MockMlBackend {
    async fn create(&self, request: &CreateConnectorRequest) -> RepositoryResult<CreatedResource> {
        let mut state = self.state.lock();
        state.record(BackendCall::CreateConnector {
            name: request.name.clone(),
        })?;
        let id = state.next_id("connector");
        state.connectors.insert(id.clone());
        Ok(CreatedResource::new(id))
    }

    async fn delete(&self, connector_id: &str) -> RepositoryResult<()> {
        let mut state = self.state.lock();
        state.record(BackendCall::DeleteConnector(connector_id.to_string()))?;
        if !state.connectors.remove(connector_id) {
            return Err(RepositoryError::NotFound(format!("connector {connector_id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ModelRepository for MockMlBackend {
    async fn create(&self, request: &CreateModelRequest) -> RepositoryResult<CreatedResource> {
        let mut state = self.state.lock();
        state.record(BackendCall::CreateModel {
            connector_id: request.connector_id.clone(),
        })?;
        let id = state.next_id("model");
        // ML-Commons registers each remote model in a group of its own.
        let group_id = state.next_id("model-group");
        state.model_groups.insert(group_id.clone());
        state.models.insert(
            id.clone(),
            ModelSummary {
                id: id.clone(),
                name: request.name.clone(),
                state: Some("DEPLOYED".to_string()),
                connector_id: Some(request.connector_id.clone()),
                model_group_id: Some(group_id),
                agent: None,
                is_active_agent_model: false,
            },
        );
        Ok(CreatedResource::new(id))
    }

    async fn delete(&self, model_id: &str) -> RepositoryResult<()> {
        let mut state = self.state.lock();
        state.record(BackendCall::DeleteModel(model_id.to_string()))?;
        if state.models.remove(model_id).is_none() {
            return Err(RepositoryError::NotFound(format!("model {model_id}")));
        }
        Ok(())
    }

    async fn undeploy(&self, model_id: &str) -> RepositoryResult<()> {
        let mut state = self.state.lock();
        state.record(BackendCall::UndeployModel(model_id.to_string()))?;
        if let Some(model) = state.models.get_mut(model_id) {
            model.state = Some("UNDEPLOYED".to_string());
        }
        Ok(())
    }

    async fn validate_connection(&self, model_id: &str) -> RepositoryResult<ModelPredictResponse> {
        let mut state = self.state.lock();
        state.record(BackendCall::ValidateConnection(model_id.to_string()))?;
        if state.negative_prediction {
            return Ok(ModelPredictResponse::with_data(json!({})));
        }
        Ok(ModelPredictResponse::with_data(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Hello! How can I help?" } }]
        })))
    }

    async fn find_by_id(&self, model_id: &str) -> RepositoryResult<Option<ModelSummary>> {
        Ok(self.state.lock().models.get(model_id).cloned())
    }

    async fn get_all(&self) -> RepositoryResult<Vec<ModelSummary>> {
        Ok(self.state.lock().models.values().cloned().collect())
    }
}

#[async_trait]
impl ModelGroupRepository for MockMlBackend {
    async fn delete(&self, group_id: &str) -> RepositoryResult<()> {
        let mut state = self.state.lock();
        state.record(BackendCall::DeleteModelGroup(group_id.to_string()))?;
        if !state.model_groups.remove(group_id) {
            return Err(RepositoryError::NotFound(format!("model group {group_id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl AgentRepository for MockMlBackend {
    async fn create(&self, request: &CreateAgentRequest) -> RepositoryResult<CreatedResource> {
        let mut state = self.state.lock();
        state.record(BackendCall::CreateAgent {
            model_id: request.model_id.clone(),
        })?;
        let id = state.next_id("agent");
        state.agents.insert(
            id.clone(),
            AgentSummary {
                id: id.clone(),
                name: request.name.clone(),
                model_id: Some(request.model_id.clone()),
            },
        );
        Ok(CreatedResource::new(id))
    }

    async fn delete(&self, agent_id: &str) -> RepositoryResult<()> {
        let mut state = self.state.lock();
        state.record(BackendCall::DeleteAgent(agent_id.to_string()))?;
        if state.agents.remove(agent_id).is_none() {
            return Err(RepositoryError::NotFound(format!("agent {agent_id}")));
        }
        Ok(())
    }

    async fn get_active(&self) -> RepositoryResult<Option<String>> {
        Ok(self.state.lock().active_agent.clone())
    }

    async fn register(&self, agent_id: &str) -> RepositoryResult<()> {
        let mut state = self.state.lock();
        state.record(BackendCall::RegisterAgent(agent_id.to_string()))?;
        state.active_agent = Some(agent_id.to_string());
        Ok(())
    }

    async fn find_by_id(&self, agent_id: &str) -> RepositoryResult<Option<AgentSummary>> {
        Ok(self.state.lock().agents.get(agent_id).cloned())
    }

    async fn find_by_model_id(&self, model_id: &str) -> RepositoryResult<Option<AgentSummary>> {
        let state = self.state.lock();
        Ok(state
            .agents
            .values()
            .find(|agent| agent.model_id.as_deref() == Some(model_id))
            .cloned())
    }

    async fn delete_by_model_id(&self, model_id: &str) -> RepositoryResult<()> {
        let mut state = self.state.lock();
        state.record(BackendCall::DeleteAgentsByModel(model_id.to_string()))?;
        state
            .agents
            .retain(|_, agent| agent.model_id.as_deref() != Some(model_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_request(connector_id: &str) -> CreateModelRequest {
        CreateModelRequest {
            name: "OpenAI".to_string(),
            description: "test".to_string(),
            connector_id: connector_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_sequential_ids_per_kind() {
        let backend = MockMlBackend::new();
        let first = ModelRepository::create(&backend, &model_request("c")).await.unwrap();
        let second = ModelRepository::create(&backend, &model_request("c")).await.unwrap();

        assert_eq!(first.id, "model-1");
        assert_eq!(second.id, "model-2");
        assert_eq!(backend.models(), vec!["model-1", "model-2"]);
    }

    #[tokio::test]
    async fn test_configured_failure_is_recorded_and_returned() {
        let backend = MockMlBackend::new().with_failure(
            BackendOperation::CreateModel,
            RepositoryError::Status {
                status: 500,
                message: "boom".to_string(),
            },
        );

        let result = ModelRepository::create(&backend, &model_request("c")).await;
        assert!(matches!(
            result,
            Err(RepositoryError::Status { status: 500, .. })
        ));
        assert_eq!(backend.call_count(BackendOperation::CreateModel), 1);
        assert!(backend.models().is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_resource_is_not_found() {
        let backend = MockMlBackend::new();
        let result = ConnectorRepository::delete(&backend, "connector-9").await;
        assert_eq!(result.unwrap_err().status(), Some(404));
    }

    #[tokio::test]
    async fn test_register_sets_active_agent() {
        let backend = MockMlBackend::new();
        assert_eq!(backend.get_active().await.unwrap(), None);

        backend.register("agent-1").await.unwrap();
        assert_eq!(backend.get_active().await.unwrap().as_deref(), Some("agent-1"));
        assert_eq!(backend.calls(), vec![BackendCall::RegisterAgent("agent-1".to_string())]);
    }

    #[tokio::test]
    async fn test_delete_agents_by_model_keeps_other_agents() {
        let backend = MockMlBackend::new();
        for model_id in ["model-1", "model-1", "model-2"] {
            let request = CreateAgentRequest {
                name: "assistant".to_string(),
                description: "test".to_string(),
                agent_type: "conversational".to_string(),
                model_id: model_id.to_string(),
                response_filter: "$.choices[0].message.content".to_string(),
                parameters: BTreeMap::new(),
            };
            AgentRepository::create(&backend, &request).await.unwrap();
        }

        let found = backend.find_by_model_id("model-2").await.unwrap();
        assert_eq!(found.map(|agent| agent.id).as_deref(), Some("agent-3"));

        backend.delete_by_model_id("model-1").await.unwrap();
        assert_eq!(backend.agents(), vec!["agent-3"]);
        assert_eq!(backend.find_by_model_id("model-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_model_gets_its_own_group() {
        let backend = MockMlBackend::new();
        let created = ModelRepository::create(&backend, &model_request("c")).await.unwrap();

        let model = ModelRepository::find_by_id(&backend, &created.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(model.model_group_id.as_deref(), Some("model-group-1"));
        assert_eq!(backend.model_groups(), vec!["model-group-1"]);
    }

    #[tokio::test]
    async fn test_negative_prediction_has_no_content() {
        let backend = MockMlBackend::new().with_negative_prediction();
        let response = backend.validate_connection("model-1").await.unwrap();
        assert!(crate::predict::validate(&response).is_err());
    }
}
