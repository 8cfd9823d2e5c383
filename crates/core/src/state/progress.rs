//! Progress ledger state machine.
//!
//! This module applies the step transitions to an `InstallationProgress`
//! value: Pending -> Running -> terminal. Event emission is not done here;
//! the saga manager publishes a snapshot after each successful transition.

use chrono::Utc;
use da_protocol::installation_models::{
    ExecutionState, InstallationProgress, StepFailure, StepResultState,
};
use thiserror::Error;

/// Rejected ledger transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgressError {
    #[error("Step position {index} is out of range (0..{len})")]
    OutOfRange { index: usize, len: usize },

    #[error("Invalid transition for step {index}: {from:?} -> {to:?}")]
    InvalidTransition {
        index: usize,
        from: ExecutionState,
        to: ExecutionState,
    },
}

fn check_position(progress: &InstallationProgress, index: usize) -> Result<(), ProgressError> {
    if progress.is_step_position_valid(index) {
        Ok(())
    } else {
        Err(ProgressError::OutOfRange {
            index,
            len: progress.len(),
        })
    }
}

/// Mark the step at `index` as running.
///
/// # Errors
///
/// Returns `OutOfRange` for an invalid position and `InvalidTransition` when
/// the step already reached a terminal state in this run.
pub fn start_step(progress: &mut InstallationProgress, index: usize) -> Result<(), ProgressError> {
    check_position(progress, index)?;

    let step = &mut progress.steps[index];
    if step.state.is_terminal() {
        return Err(ProgressError::InvalidTransition {
            index,
            from: step.state,
            to: ExecutionState::Running,
        });
    }

    step.state = ExecutionState::Running;
    step.message = None;
    step.error = None;
    step.started_at = Some(Utc::now());
    step.completed_at = None;
    Ok(())
}

/// Settle the running step at `index` in the state matching `result`.
///
/// A successful (or warning) completion moves the pointer past the step; a
/// failure leaves the pointer on it, which marks the run as finished.
///
/// # Errors
///
/// Returns `OutOfRange` for an invalid position and `InvalidTransition` when
/// the step is not currently running.
pub fn complete_step(
    progress: &mut InstallationProgress,
    index: usize,
    result: StepResultState,
    message: impl Into<String>,
    error: Option<StepFailure>,
) -> Result<(), ProgressError> {
    check_position(progress, index)?;

    let target = ExecutionState::from(result);
    let step = &mut progress.steps[index];
    if step.state != ExecutionState::Running {
        return Err(ProgressError::InvalidTransition {
            index,
            from: step.state,
            to: target,
        });
    }

    step.state = target;
    step.message = Some(message.into());
    step.error = error;
    step.completed_at = Some(Utc::now());

    if target != ExecutionState::Failed {
        progress.current_step_index = progress.current_step_index.max(index + 1);
    }
    Ok(())
}

/// Return every step to `Pending` and rewind the pointer.
pub fn reset(progress: &mut InstallationProgress) {
    for step in &mut progress.steps {
        step.state = ExecutionState::Pending;
        step.message = None;
        step.error = None;
        step.started_at = None;
        step.completed_at = None;
    }
    progress.current_step_index = 0;
}
