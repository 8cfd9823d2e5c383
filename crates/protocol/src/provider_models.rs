//! Provider configuration models for `providers/*.yaml`.
//!
//! A provider entry describes how to reach a remote LLM API: which path to
//! call, which headers and body template the connector forwards, which
//! endpoints the cluster must trust, and how the agent extracts the answer
//! from the provider's response.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use ts_rs::TS;

/// Static configuration of one model provider.
///
/// # Example
///
/// ```yaml
/// name: OpenAI
/// url_path: /v1/chat/completions
/// headers:
///   Authorization: "Bearer ${credential.api_key}"
///   Content-Type: application/json
/// request_body: '{ "model": "${parameters.model}", "messages": ${parameters.messages} }'
/// default_endpoint_regex: '^https://api\.openai\.com/.*$'
/// response_filter: '$.choices[0].message.content'
/// models:
///   - gpt-4o
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct ProviderConfig {
    /// Provider name as selected by the operator (e.g. "OpenAI").
    pub name: String,

    /// Path appended to the operator's API URL.
    pub url_path: String,

    /// Header templates sent by the connector.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Request body template sent by the connector.
    pub request_body: String,

    /// Endpoint pattern the cluster must trust for this provider.
    #[serde(default)]
    pub default_endpoint_regex: Option<String>,

    /// JSONPath expression extracting the answer from a provider response.
    #[serde(default)]
    pub response_filter: Option<String>,

    /// Models the provider is known to serve.
    #[serde(default)]
    pub models: Vec<String>,

    /// Extra connector parameters.
    #[serde(default)]
    pub extra_parameters: BTreeMap<String, Value>,

    /// Agent LLM parameters merged over the installer defaults.
    #[serde(default)]
    pub agent_parameters: BTreeMap<String, Value>,
}
