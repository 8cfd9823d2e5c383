//! Request and response payloads exchanged with the ML-Commons repositories.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Plugin settings the cluster needs before it accepts a remote connector.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MlCommonsSettings {
    pub trusted_connector_endpoints_regex: Vec<String>,
    pub agent_framework_enabled: bool,
    pub only_run_on_ml_node: bool,
    pub rag_pipeline_feature_enabled: bool,
}

impl MlCommonsSettings {
    /// Settings enabling the agent framework and trusting the given endpoints.
    pub fn trusting(endpoints_regex: Vec<String>) -> Self {
        Self {
            trusted_connector_endpoints_regex: endpoints_regex,
            agent_framework_enabled: true,
            only_run_on_ml_node: false,
            rag_pipeline_feature_enabled: true,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct CreateConnectorRequest {
    pub name: String,
    pub description: String,
    pub endpoint: String,
    pub model_id: String,
    pub api_key: String,
    pub url_path: String,
    pub headers: BTreeMap<String, String>,
    pub request_body: String,
    pub extra_parameters: BTreeMap<String, Value>,
}

impl fmt::Debug for CreateConnectorRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateConnectorRequest")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("endpoint", &self.endpoint)
            .field("model_id", &self.model_id)
            .field("api_key", &"<redacted>")
            .field("url_path", &self.url_path)
            .field("headers", &self.headers)
            .field("request_body", &self.request_body)
            .field("extra_parameters", &self.extra_parameters)
            .finish()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CreateModelRequest {
    pub name: String,
    pub description: String,
    pub connector_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CreateAgentRequest {
    pub name: String,
    pub description: String,
    pub agent_type: String,
    pub model_id: String,
    pub response_filter: String,
    /// LLM parameters, already merged with the installer defaults.
    pub parameters: BTreeMap<String, Value>,
}

/// Identifier returned by a create call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CreatedResource {
    pub id: String,
}

impl CreatedResource {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Response of a model `_predict` call.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ModelPredictResponse {
    #[serde(default)]
    pub inference_results: Vec<InferenceResult>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct InferenceResult {
    #[serde(default)]
    pub status_code: Option<u16>,

    #[serde(default)]
    pub output: Vec<InferenceOutput>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct InferenceOutput {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(rename = "dataAsMap", default)]
    pub data_as_map: Option<Value>,
}

impl ModelPredictResponse {
    /// A single successful result carrying `data` as its payload.
    pub fn with_data(data: Value) -> Self {
        Self {
            inference_results: vec![InferenceResult {
                status_code: Some(200),
                output: vec![InferenceOutput {
                    name: Some("response".to_string()),
                    data_as_map: Some(data),
                }],
            }],
        }
    }
}
