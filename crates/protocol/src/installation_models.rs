//! Installation state models.
//!
//! This module defines the structures that describe an assistant installation
//! run: the request that starts it, the per-step progress ledger the UI renders,
//! and the final report returned once the run succeeds or unwinds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use ts_rs::TS;

/// Lifecycle state of a single installation step.
///
/// Every step starts as `Pending`, moves to `Running` when the saga manager
/// picks it up, and settles in exactly one terminal state per run:
/// Pending -> Running -> FinishedSuccessfully | FinishedWithWarnings | Failed
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Step has not been started in the current run.
    Pending,

    /// Step is executing.
    Running,

    /// Step completed and its resource exists.
    FinishedSuccessfully,

    /// Step completed but reported something the operator should look at.
    FinishedWithWarnings,

    /// Step failed; the run halted and compensations were attempted.
    Failed,
}

impl ExecutionState {
    /// Returns true for the three states a step can settle in.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::FinishedSuccessfully | Self::FinishedWithWarnings | Self::Failed
        )
    }
}

/// Outcome reported when a running step is completed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "snake_case")]
pub enum StepResultState {
    Success,
    Fail,
    Warning,
}

impl From<StepResultState> for ExecutionState {
    fn from(result: StepResultState) -> Self {
        match result {
            StepResultState::Success => ExecutionState::FinishedSuccessfully,
            StepResultState::Warning => ExecutionState::FinishedWithWarnings,
            StepResultState::Fail => ExecutionState::Failed,
        }
    }
}

/// Serializable form of a step error, attached to a failed step.
///
/// Details have already been sanitized: credentials are blanked and long
/// values truncated before they reach this structure.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct StepFailure {
    /// Full human-readable error message.
    pub message: String,

    /// Contextual values captured while the step was running.
    #[serde(default)]
    pub details: BTreeMap<String, Value>,

    /// Advisory hints about what probably went wrong.
    #[serde(default)]
    pub possible_causes: Vec<String>,
}

/// Progress entry for one step of the installation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct StepState {
    /// Display name of the step (e.g. "Create Connector").
    pub step_name: String,

    /// Current lifecycle state.
    pub state: ExecutionState,

    /// Success or failure message set when the step settles.
    pub message: Option<String>,

    /// Error that made the step fail, if it failed.
    pub error: Option<StepFailure>,

    /// When the step entered `Running`.
    pub started_at: Option<DateTime<Utc>>,

    /// When the step reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepState {
    /// Create a fresh `Pending` entry for the named step.
    pub fn pending(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            state: ExecutionState::Pending,
            message: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Ordered ledger of step states plus the pointer to the next step to run.
///
/// This is a plain value: cloning it yields an independent snapshot, so
/// observers holding a copy can never disturb the live ledger. State
/// transitions are applied by the core crate's `state::progress` module.
///
/// Invariants maintained by the transitions:
/// - `current_step_index` only grows, except on an explicit reset
/// - every step before `current_step_index` is terminal
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct InstallationProgress {
    /// One entry per configured step, in execution order.
    pub steps: Vec<StepState>,

    /// Zero-based index of the next step to run; equals `steps.len()` once
    /// every step has finished.
    pub current_step_index: usize,
}

impl InstallationProgress {
    /// Build a ledger with every named step `Pending`.
    pub fn new<I, S>(step_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            steps: step_names.into_iter().map(StepState::pending).collect(),
            current_step_index: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn current_step(&self) -> usize {
        self.current_step_index
    }

    pub fn step(&self, index: usize) -> Option<&StepState> {
        self.steps.get(index)
    }

    /// Returns true when `index` addresses an existing step.
    pub fn is_step_position_valid(&self, index: usize) -> bool {
        index < self.steps.len()
    }

    /// A run is finished once the pointer moved past the last step or the
    /// step it points at has failed.
    pub fn is_finished(&self) -> bool {
        if self.current_step_index >= self.steps.len() {
            return true;
        }
        self.steps[self.current_step_index].state == ExecutionState::Failed
    }

    /// Finished with no step in the `Failed` state.
    pub fn is_finished_successfully(&self) -> bool {
        self.is_finished()
            && self
                .steps
                .iter()
                .all(|step| step.state != ExecutionState::Failed)
    }

    /// All steps currently in the `Failed` state, in execution order.
    pub fn failed_steps(&self) -> Vec<&StepState> {
        self.steps
            .iter()
            .filter(|step| step.state == ExecutionState::Failed)
            .collect()
    }
}

/// Operator input for one installation.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, TS)]
pub struct InstallRequest {
    /// Provider name, matching an entry of the provider catalog.
    pub selected_provider: String,

    /// Remote model identifier (e.g. "gpt-4o").
    pub model_id: String,

    /// Base URL of the provider API.
    pub api_url: String,

    /// Credential forwarded to the connector.
    pub api_key: String,

    /// Optional description for the registered model.
    #[serde(default)]
    pub description: Option<String>,
}

impl fmt::Debug for InstallRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallRequest")
            .field("selected_provider", &self.selected_provider)
            .field("model_id", &self.model_id)
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("description", &self.description)
            .finish()
    }
}

/// Identifiers of resources that exist on the cluster at the end of a run.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, TS)]
#[serde(rename_all = "camelCase")]
pub struct InstallationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
}

impl InstallationData {
    pub fn is_empty(&self) -> bool {
        self.connector_id.is_none() && self.model_id.is_none() && self.agent_id.is_none()
    }
}

/// A failed step as reported in the final result.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct InstallationError {
    pub step: String,
    pub message: String,
    pub details: Option<StepFailure>,
}

/// A compensation that ran to completion.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct RollbackAction {
    pub step: String,
}

/// A compensation that failed; the resource may need manual cleanup.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct RollbackError {
    pub step: String,
    pub message: String,
}

/// Final report of an installation run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct InstallationResult {
    pub success: bool,

    pub message: String,

    /// Snapshot of the ledger when the run ended.
    pub progress: InstallationProgress,

    /// Identifiers still held by the context when the run ended.
    pub data: InstallationData,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<InstallationError>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollbacks: Option<Vec<RollbackAction>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_errors: Option<Vec<RollbackError>>,
}

/// Condensed response handed to the dashboard once an installation returns.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct InstallResponse {
    pub success: bool,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<InstallationData>,

    /// Names of the steps whose compensation completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollbacks: Option<Vec<String>>,
}

impl From<InstallationResult> for InstallResponse {
    fn from(result: InstallationResult) -> Self {
        let rollbacks = if result.success {
            None
        } else {
            result
                .rollbacks
                .map(|actions| actions.into_iter().map(|action| action.step).collect())
        };

        Self {
            success: result.success,
            message: result.message,
            data: Some(result.data),
            rollbacks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress_with(states: &[ExecutionState], current: usize) -> InstallationProgress {
        let mut progress = InstallationProgress::new(["a", "b", "c"]);
        for (step, state) in progress.steps.iter_mut().zip(states) {
            step.state = *state;
        }
        progress.current_step_index = current;
        progress
    }

    #[test]
    fn test_new_progress_is_pending() {
        let progress = InstallationProgress::new(["Create Connector", "Create Model"]);
        assert_eq!(progress.len(), 2);
        assert_eq!(progress.current_step(), 0);
        assert!(progress
            .steps
            .iter()
            .all(|step| step.state == ExecutionState::Pending));
        assert!(!progress.is_finished());
    }

    #[test]
    fn test_step_position_validity() {
        let progress = InstallationProgress::new(["a", "b"]);
        assert!(progress.is_step_position_valid(0));
        assert!(progress.is_step_position_valid(1));
        assert!(!progress.is_step_position_valid(2));
    }

    #[test]
    fn test_finished_when_pointer_past_end() {
        use ExecutionState::*;
        let progress = progress_with(
            &[FinishedSuccessfully, FinishedWithWarnings, FinishedSuccessfully],
            3,
        );
        assert!(progress.is_finished());
        assert!(progress.is_finished_successfully());
    }

    #[test]
    fn test_finished_when_current_step_failed() {
        use ExecutionState::*;
        let progress = progress_with(&[FinishedSuccessfully, Failed, Pending], 1);
        assert!(progress.is_finished());
        assert!(!progress.is_finished_successfully());
        let failed = progress.failed_steps();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].step_name, "b");
    }

    #[test]
    fn test_not_finished_while_running() {
        use ExecutionState::*;
        let progress = progress_with(&[FinishedSuccessfully, Running, Pending], 1);
        assert!(!progress.is_finished());
    }

    #[test]
    fn test_result_state_mapping() {
        assert_eq!(
            ExecutionState::from(StepResultState::Success),
            ExecutionState::FinishedSuccessfully
        );
        assert_eq!(
            ExecutionState::from(StepResultState::Warning),
            ExecutionState::FinishedWithWarnings
        );
        assert_eq!(ExecutionState::from(StepResultState::Fail), ExecutionState::Failed);
    }

    #[test]
    fn test_install_request_debug_redacts_key() {
        let request = InstallRequest {
            selected_provider: "OpenAI".to_string(),
            model_id: "gpt-4o".to_string(),
            api_url: "https://api.openai.com".to_string(),
            api_key: "sk-secret".to_string(),
            description: None,
        };
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_install_response_keeps_rollbacks_only_on_failure() {
        let result = InstallationResult {
            success: false,
            message: "Installation failed".to_string(),
            progress: InstallationProgress::new(["a"]),
            data: InstallationData::default(),
            errors: None,
            rollbacks: Some(vec![RollbackAction {
                step: "Create Connector".to_string(),
            }]),
            rollback_errors: None,
        };

        let response = InstallResponse::from(result);
        assert!(!response.success);
        assert_eq!(response.rollbacks, Some(vec!["Create Connector".to_string()]));
    }
}
