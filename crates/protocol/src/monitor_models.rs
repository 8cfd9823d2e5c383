//! Models for monitoring deployed models and the active assistant agent.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A model registered in the cluster's ML subsystem.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct ModelSummary {
    pub id: String,

    pub name: String,

    /// Deployment state as reported by the cluster (e.g. "DEPLOYED").
    #[serde(default)]
    pub state: Option<String>,

    #[serde(default)]
    pub connector_id: Option<String>,

    /// Group the model was registered in; the cluster creates one per model
    /// when none is given.
    #[serde(default)]
    pub model_group_id: Option<String>,

    /// Agent whose LLM is bound to this model, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentSummary>,

    /// True when this model's agent is the cluster's active assistant agent.
    #[serde(default)]
    pub is_active_agent_model: bool,
}

/// An agent registered in the cluster's ML subsystem.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct AgentSummary {
    pub id: String,

    pub name: String,

    /// Model the agent's LLM is bound to.
    #[serde(default)]
    pub model_id: Option<String>,
}
