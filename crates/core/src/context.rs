//! Execution context carried through one installation run.
//!
//! The context holds the identifiers of resources created by completed steps.
//! A key stays absent until the step that produces it succeeds, and a
//! compensation that removes the resource clears the key again, so at the end
//! of a run the context lists exactly the resources that still exist.

use crate::error::ContextError;
use da_protocol::installation_models::InstallationData;
use std::fmt;

/// Names of the identifiers the installation steps produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
    ConnectorId,
    ModelId,
    AgentId,
}

impl ContextKey {
    pub const ALL: [ContextKey; 3] = [
        ContextKey::ConnectorId,
        ContextKey::ModelId,
        ContextKey::AgentId,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ContextKey::ConnectorId => "connectorId",
            ContextKey::ModelId => "modelId",
            ContextKey::AgentId => "agentId",
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed store of resource identifiers for a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallationContext {
    connector_id: Option<String>,
    model_id: Option<String>,
    agent_id: Option<String>,
}

impl InstallationContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: ContextKey) -> &Option<String> {
        match key {
            ContextKey::ConnectorId => &self.connector_id,
            ContextKey::ModelId => &self.model_id,
            ContextKey::AgentId => &self.agent_id,
        }
    }

    fn slot_mut(&mut self, key: ContextKey) -> &mut Option<String> {
        match key {
            ContextKey::ConnectorId => &mut self.connector_id,
            ContextKey::ModelId => &mut self.model_id,
            ContextKey::AgentId => &mut self.agent_id,
        }
    }

    pub fn set(&mut self, key: ContextKey, value: impl Into<String>) {
        *self.slot_mut(key) = Some(value.into());
    }

    /// Read an identifier, failing when no step has stored it.
    pub fn get(&self, key: ContextKey) -> Result<&str, ContextError> {
        self.slot(key)
            .as_deref()
            .ok_or(ContextError::NotFound(key))
    }

    /// Read an identifier without treating absence as an error.
    pub fn lookup(&self, key: ContextKey) -> Option<&str> {
        self.slot(key).as_deref()
    }

    pub fn has(&self, key: ContextKey) -> bool {
        self.slot(key).is_some()
    }

    /// Remove an identifier, returning it if it was present.
    pub fn delete(&mut self, key: ContextKey) -> Option<String> {
        self.slot_mut(key).take()
    }

    pub fn connector_id(&self) -> Option<&str> {
        self.lookup(ContextKey::ConnectorId)
    }

    pub fn model_id(&self) -> Option<&str> {
        self.lookup(ContextKey::ModelId)
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.lookup(ContextKey::AgentId)
    }

    /// Snapshot of every identifier currently held.
    pub fn to_data(&self) -> InstallationData {
        InstallationData {
            connector_id: self.connector_id.clone(),
            model_id: self.model_id.clone(),
            agent_id: self.agent_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_absent_until_set() {
        let context = InstallationContext::new();
        for key in ContextKey::ALL {
            assert!(!context.has(key));
            assert_eq!(context.get(key), Err(ContextError::NotFound(key)));
        }
        assert!(context.to_data().is_empty());
    }

    #[test]
    fn test_set_get_delete() {
        let mut context = InstallationContext::new();
        context.set(ContextKey::ConnectorId, "conn-1");

        assert!(context.has(ContextKey::ConnectorId));
        assert_eq!(context.get(ContextKey::ConnectorId), Ok("conn-1"));
        assert_eq!(context.connector_id(), Some("conn-1"));

        assert_eq!(
            context.delete(ContextKey::ConnectorId),
            Some("conn-1".to_string())
        );
        assert!(!context.has(ContextKey::ConnectorId));
        assert_eq!(context.delete(ContextKey::ConnectorId), None);
    }

    #[test]
    fn test_to_data_snapshot() {
        let mut context = InstallationContext::new();
        context.set(ContextKey::ConnectorId, "conn-1");
        context.set(ContextKey::ModelId, "model-1");
        context.set(ContextKey::AgentId, "agent-1");

        let data = context.to_data();
        assert_eq!(data.connector_id.as_deref(), Some("conn-1"));
        assert_eq!(data.model_id.as_deref(), Some("model-1"));
        assert_eq!(data.agent_id.as_deref(), Some("agent-1"));

        context.delete(ContextKey::ModelId);
        assert_eq!(data.model_id.as_deref(), Some("model-1"));
    }

    #[test]
    fn test_not_found_message_names_key() {
        let error = InstallationContext::new()
            .get(ContextKey::ModelId)
            .unwrap_err();
        assert_eq!(error.to_string(), "modelId not found in installation context");
    }
}
