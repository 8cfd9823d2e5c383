//! OpenSearch REST implementation of the ML-Commons repositories.
//!
//! Every repository trait is implemented on one [`OpenSearchClient`],
//! which wraps a `reqwest::Client` configured from the `[cluster]` section of
//! the configuration.

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
use da_protocol::config_models::ClusterConfig;
use da_protocol::monitor_models::{AgentSummary, ModelSummary};
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

/// Prompt sent to a freshly created model to check that it answers.
pub const TEST_PROMPT: &str = "Hello!";

/// Index document holding the active assistant agent.
const ACTIVE_AGENT_DOC: &str = "/.plugins-ml-config/_doc/os_chat";

const SEARCH_PAGE_SIZE: usize = 25;

/// Upper bound on agents fetched when looking them up by model.
const AGENT_SEARCH_SIZE: usize = 1000;

#[derive(Clone)]
pub struct OpenSearchClient {
    http: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl OpenSearchClient {
    /// Create a client for the cluster described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Network` if the HTTP client cannot be built.
    pub fn new(config: &ClusterConfig) -> RepositoryResult<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| RepositoryError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> RepositoryResult<Value> {
        let url = format!("{}{path}", self.base_url);
        debug!(%method, %url, "Sending ML-Commons request");

        let mut request = self.http.request(method, &url);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RepositoryError::Network(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RepositoryError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(RepositoryError::Status {
                status: status.as_u16(),
                message: error_reason(&text),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| RepositoryError::InvalidResponse(e.to_string()))
    }

    /// Like `send`, but maps a 404 to `None`.
    async fn send_optional(&self, method: Method, path: &str) -> RepositoryResult<Option<Value>> {
        match self.send(method, path, None).await {
            Ok(value) => Ok(Some(value)),
            Err(RepositoryError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Pull the most useful message out of an OpenSearch error body.
fn error_reason(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };

    value
        .pointer("/error/reason")
        .or_else(|| value.get("error"))
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

fn required_str(value: &Value, field: &str) -> RepositoryResult<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RepositoryError::InvalidResponse(format!("missing `{field}` in response")))
}

fn optional_str(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer).and_then(Value::as_str).map(str::to_string)
}

fn connector_body(request: &CreateConnectorRequest) -> Value {
    let mut parameters = Map::new();
    parameters.insert("endpoint".to_string(), json!(request.endpoint));
    parameters.insert("model".to_string(), json!(request.model_id));
    for (key, value) in &request.extra_parameters {
        parameters.insert(key.clone(), value.clone());
    }

    json!({
        "name": request.name,
        "description": request.description,
        "version": 1,
        "protocol": "http",
        "parameters": parameters,
        "credential": { "api_key": request.api_key },
        "actions": [{
            "action_type": "predict",
            "method": "POST",
            "url": format!("{}{}", request.endpoint.trim_end_matches('/'), request.url_path),
            "headers": request.headers,
            "request_body": request.request_body,
        }],
    })
}

fn agent_body(request: &CreateAgentRequest) -> Value {
    let mut parameters: Map<String, Value> = request
        .parameters
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    parameters.insert("response_filter".to_string(), json!(request.response_filter));

    json!({
        "name": request.name,
        "type": request.agent_type,
        "description": request.description,
        "llm": {
            "model_id": request.model_id,
            "parameters": parameters,
        },
        "memory": { "type": "conversation_index" },
        "app_type": "os_chat",
        "tools": [],
    })
}

fn model_summary(id: String, source: &Value) -> ModelSummary {
    ModelSummary {
        id,
        name: optional_str(source, "/name").unwrap_or_default(),
        state: optional_str(source, "/model_state"),
        connector_id: optional_str(source, "/connector_id"),
        model_group_id: optional_str(source, "/model_group_id"),
        agent: None,
        is_active_agent_model: false,
    }
}

fn agent_summary(id: String, source: &Value) -> AgentSummary {
    AgentSummary {
        id,
        name: optional_str(source, "/name").unwrap_or_default(),
        model_id: optional_str(source, "/llm/model_id"),
    }
}

/// `_id` and `_source` of every hit in a search response.
fn search_hits(response: &Value) -> Vec<(String, &Value)> {
    response
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| Some((optional_str(hit, "/_id")?, hit.get("_source")?)))
                .collect()
        })
        .unwrap_or_default()
}

impl OpenSearchClient {
    async fn find_agents_by_model_id(
        &self,
        model_id: &str,
        size: usize,
    ) -> RepositoryResult<Vec<AgentSummary>> {
        let body = json!({
            "query": { "term": { "llm.model_id": { "value": model_id } } },
            "size": size,
        });
        let response = self
            .send(Method::POST, "/_plugins/_ml/agents/_search", Some(&body))
            .await?;

        Ok(search_hits(&response)
            .into_iter()
            .map(|(id, source)| agent_summary(id, source))
            .collect())
    }
}

#[async_trait]
impl ClusterSettingsRepository for OpenSearchClient {
    async fn persist(&self, settings: &MlCommonsSettings) -> RepositoryResult<()> {
        let body = json!({ "persistent": { "plugins": { "ml_commons": settings } } });
        let response = self.send(Method::PUT, "/_cluster/settings", Some(&body)).await?;

        if response.get("acknowledged").and_then(Value::as_bool) != Some(true) {
            return Err(RepositoryError::NotAcknowledged(
                "Failed to update cluster settings".to_string(),
            ));
        }
        Ok(())
    }

    async fn retrieve(&self) -> RepositoryResult<Value> {
        self.send(
            Method::GET,
            "/_cluster/settings?include_defaults=true",
            None,
        )
        .await
    }
}

#[async_trait]
impl ConnectorRepository for OpenSearchClient {
    async fn create(&self, request: &CreateConnectorRequest) -> RepositoryResult<CreatedResource> {
        let body = connector_body(request);
        let response = self
            .send(Method::POST, "/_plugins/_ml/connectors/_create", Some(&body))
            .await?;
        Ok(CreatedResource::new(required_str(&response, "connector_id")?))
    }

    async fn delete(&self, connector_id: &str) -> RepositoryResult<()> {
        self.send(
            Method::DELETE,
            &format!("/_plugins/_ml/connectors/{connector_id}"),
            None,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ModelRepository for OpenSearchClient {
    async fn create(&self, request: &CreateModelRequest) -> RepositoryResult<CreatedResource> {
        let body = json!({
            "name": request.name,
            "function_name": "remote",
            "description": request.description,
            "connector_id": request.connector_id,
        });

        let response = self
            .send(
                Method::POST,
                "/_plugins/_ml/models/_register?deploy=true",
                Some(&body),
            )
            .await?;
        Ok(CreatedResource::new(required_str(&response, "model_id")?))
    }

    async fn delete(&self, model_id: &str) -> RepositoryResult<()> {
        self.send(
            Method::DELETE,
            &format!("/_plugins/_ml/models/{model_id}"),
            None,
        )
        .await?;
        Ok(())
    }

    async fn undeploy(&self, model_id: &str) -> RepositoryResult<()> {
        self.send(
            Method::POST,
            &format!("/_plugins/_ml/models/{model_id}/_undeploy"),
            Some(&json!({})),
        )
        .await?;
        Ok(())
    }

    async fn validate_connection(&self, model_id: &str) -> RepositoryResult<ModelPredictResponse> {
        let body = json!({ "parameters": { "prompt": TEST_PROMPT } });
        let response = self
            .send(
                Method::POST,
                &format!("/_plugins/_ml/models/{model_id}/_predict"),
                Some(&body),
            )
            .await?;
        serde_json::from_value(response)
            .map_err(|e| RepositoryError::InvalidResponse(e.to_string()))
    }

    async fn find_by_id(&self, model_id: &str) -> RepositoryResult<Option<ModelSummary>> {
        let response = self
            .send_optional(Method::GET, &format!("/_plugins/_ml/models/{model_id}"))
            .await?;
        Ok(response.map(|source| model_summary(model_id.to_string(), &source)))
    }

    async fn get_all(&self) -> RepositoryResult<Vec<ModelSummary>> {
        let body = json!({
            "query": { "term": { "algorithm": { "value": "REMOTE" } } },
            "size": SEARCH_PAGE_SIZE,
        });
        let response = self
            .send(Method::POST, "/_plugins/_ml/models/_search", Some(&body))
            .await?;

        Ok(search_hits(&response)
            .into_iter()
            .map(|(id, source)| model_summary(id, source))
            .collect())
    }
}

#[async_trait]
impl ModelGroupRepository for OpenSearchClient {
    async fn delete(&self, group_id: &str) -> RepositoryResult<()> {
        self.send(
            Method::DELETE,
            &format!("/_plugins/_ml/model_groups/{group_id}"),
            None,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AgentRepository for OpenSearchClient {
    async fn create(&self, request: &CreateAgentRequest) -> RepositoryResult<CreatedResource> {
        let body = agent_body(request);
        let response = self
            .send(Method::POST, "/_plugins/_ml/agents/_register", Some(&body))
            .await?;
        Ok(CreatedResource::new(required_str(&response, "agent_id")?))
    }

    async fn delete(&self, agent_id: &str) -> RepositoryResult<()> {
        self.send(
            Method::DELETE,
            &format!("/_plugins/_ml/agents/{agent_id}"),
            None,
        )
        .await?;
        Ok(())
    }

    async fn get_active(&self) -> RepositoryResult<Option<String>> {
        let Some(document) = self.send_optional(Method::GET, ACTIVE_AGENT_DOC).await? else {
            return Ok(None);
        };

        let agent_id = optional_str(&document, "/_source/configuration/agent_id");
        if agent_id.is_none() {
            warn!("Active agent document has no agent_id");
        }
        Ok(agent_id)
    }

    async fn register(&self, agent_id: &str) -> RepositoryResult<()> {
        let body = json!({
            "type": "os_chat_root_agent",
            "configuration": { "agent_id": agent_id },
        });
        self.send(Method::PUT, ACTIVE_AGENT_DOC, Some(&body)).await?;
        Ok(())
    }

    async fn find_by_id(&self, agent_id: &str) -> RepositoryResult<Option<AgentSummary>> {
        let response = self
            .send_optional(Method::GET, &format!("/_plugins/_ml/agents/{agent_id}"))
            .await?;

        Ok(response.map(|source| agent_summary(agent_id.to_string(), &source)))
    }

    async fn find_by_model_id(&self, model_id: &str) -> RepositoryResult<Option<AgentSummary>> {
        let mut agents = self.find_agents_by_model_id(model_id, 1).await?;
        Ok(agents.pop())
    }

    async fn delete_by_model_id(&self, model_id: &str) -> RepositoryResult<()> {
        let agents = self
            .find_agents_by_model_id(model_id, AGENT_SEARCH_SIZE)
            .await?;
        for agent in agents {
            debug!(agent_id = %agent.id, %model_id, "Deleting agent bound to model");
            AgentRepository::delete(self, &agent.id).await?;
        }
        Ok(())
    }
}
