//! Saga manager for one installation run.
//!
//! The `InstallationProgressManager` runs steps one at a time against the
//! progress ledger. When a step fails it compensates: the failing step is
//! rolled back first, then every completed step in reverse order. Each
//! compensation is isolated, so one failing rollback never prevents the
//! others from running.

use crate::context::InstallationContext;
use crate::state::progress::{self, ProgressError};
use crate::steps::{InstallationStep, StepError};
use da_protocol::installation_models::{
    InstallRequest, InstallationProgress, RollbackAction, RollbackError, StepResultState,
};
use da_protocol::ipc::Event;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors raised by the saga manager.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SagaError {
    #[error("At least one step must be provided")]
    NoSteps,

    #[error("Another step is already running")]
    Concurrency,

    #[error("All steps have already been executed")]
    SequenceExhausted,

    #[error(transparent)]
    Progress(#[from] ProgressError),

    #[error(transparent)]
    Step(#[from] StepError),
}

/// Resets the in-progress flag when a `run_step` call ends, however it ends.
struct InProgressGuard<'a>(&'a AtomicBool);

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs installation steps and unwinds them on failure.
pub struct InstallationProgressManager {
    installation_id: Uuid,
    progress: Mutex<InstallationProgress>,
    in_progress: AtomicBool,

    /// Steps that completed in the current run, in completion order.
    completed: Mutex<Vec<Arc<dyn InstallationStep>>>,

    rollbacks: Mutex<Vec<RollbackAction>>,
    rollback_errors: Mutex<Vec<RollbackError>>,
    events_tx: broadcast::Sender<Event>,
}

impl InstallationProgressManager {
    /// Create a manager whose ledger lists `steps` in order.
    ///
    /// # Arguments
    ///
    /// * `installation_id` - Identifier stamped on every emitted event
    /// * `steps` - The steps of the run, used for the ledger names
    /// * `events_tx` - Channel progress and rollback events are published on
    ///
    /// # Errors
    ///
    /// Returns `SagaError::NoSteps` when `steps` is empty.
    pub fn new(
        installation_id: Uuid,
        steps: &[Arc<dyn InstallationStep>],
        events_tx: broadcast::Sender<Event>,
    ) -> Result<Self, SagaError> {
        if steps.is_empty() {
            return Err(SagaError::NoSteps);
        }

        Ok(Self {
            installation_id,
            progress: Mutex::new(InstallationProgress::new(steps.iter().map(|s| s.name()))),
            in_progress: AtomicBool::new(false),
            completed: Mutex::new(Vec::new()),
            rollbacks: Mutex::new(Vec::new()),
            rollback_errors: Mutex::new(Vec::new()),
            events_tx,
        })
    }

    pub fn installation_id(&self) -> Uuid {
        self.installation_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events_tx.subscribe()
    }

    /// Deep copy of the ledger.
    pub fn get_progress(&self) -> InstallationProgress {
        self.progress.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Compensations that succeeded during the last failed run, if any.
    pub fn get_rollbacks(&self) -> Option<Vec<RollbackAction>> {
        let rollbacks = self.rollbacks.lock();
        (!rollbacks.is_empty()).then(|| rollbacks.clone())
    }

    /// Compensations that failed during the last failed run, if any.
    pub fn get_rollback_errors(&self) -> Option<Vec<RollbackError>> {
        let errors = self.rollback_errors.lock();
        (!errors.is_empty()).then(|| errors.clone())
    }

    /// Run `step` at the current ledger position.
    ///
    /// On success the step is recorded as completed and the pointer advances.
    /// On failure every compensation runs before the step is marked `Failed`,
    /// then the step's error is returned.
    ///
    /// # Errors
    ///
    /// - `Concurrency` if another `run_step` is in flight (nothing is changed)
    /// - `SequenceExhausted` if the run is already finished
    /// - `Step` with the error the step failed with
    pub async fn run_step(
        &self,
        step: Arc<dyn InstallationStep>,
        request: &InstallRequest,
        context: &mut InstallationContext,
    ) -> Result<(), SagaError> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(step = step.name(), "Rejected step while another is running");
            return Err(SagaError::Concurrency);
        }
        let _guard = InProgressGuard(&self.in_progress);

        let index = {
            let progress = self.progress.lock();
            if progress.is_finished() {
                return Err(SagaError::SequenceExhausted);
            }
            progress.current_step()
        };

        self.transition(|p| progress::start_step(p, index))?;
        self.rollbacks.lock().clear();
        self.rollback_errors.lock().clear();
        debug!(step = step.name(), index, "Step started");

        match step.execute(request, context).await {
            Ok(()) => {
                self.completed.lock().push(Arc::clone(&step));
                self.transition(|p| {
                    progress::complete_step(
                        p,
                        index,
                        StepResultState::Success,
                        step.success_message(),
                        None,
                    )
                })?;
                info!(step = step.name(), index, "Step completed");
                Ok(())
            }
            Err(error) => {
                warn!(step = step.name(), index, error = %error, "Step failed, rolling back");
                self.compensate(step.as_ref(), request, context, &error).await;
                self.transition(|p| {
                    progress::complete_step(
                        p,
                        index,
                        StepResultState::Fail,
                        step.failure_message(),
                        Some(error.to_failure()),
                    )
                })?;
                Err(SagaError::Step(error))
            }
        }
    }

    /// Return the ledger to its initial state and forget the last run.
    pub fn reset(&self) {
        self.transition_infallible(progress::reset);
        self.completed.lock().clear();
        self.rollbacks.lock().clear();
        self.rollback_errors.lock().clear();
    }

    /// Roll back the failing step, then completed steps newest first.
    async fn compensate(
        &self,
        failed: &dyn InstallationStep,
        request: &InstallRequest,
        context: &mut InstallationContext,
        error: &StepError,
    ) {
        let completed: Vec<Arc<dyn InstallationStep>> =
            self.completed.lock().iter().rev().cloned().collect();

        self.rollback_one(failed, request, context, error).await;
        for step in &completed {
            self.rollback_one(step.as_ref(), request, context, error).await;
        }

        self.completed.lock().clear();
    }

    async fn rollback_one(
        &self,
        step: &dyn InstallationStep,
        request: &InstallRequest,
        context: &mut InstallationContext,
        error: &StepError,
    ) {
        let name = step.name().to_string();

        match step.rollback(request, context, error).await {
            Ok(()) => {
                debug!(step = %name, "Rollback succeeded");
                self.rollbacks.lock().push(RollbackAction { step: name.clone() });
                self.publish(Event::RollbackSucceeded {
                    installation_id: self.installation_id,
                    step: name,
                });
            }
            Err(failure) => {
                let message = failure.to_string();
                warn!(step = %name, error = %message, "Rollback failed");
                self.rollback_errors.lock().push(RollbackError {
                    step: name.clone(),
                    message: message.clone(),
                });
                self.publish(Event::RollbackFailed {
                    installation_id: self.installation_id,
                    step: name,
                    message,
                });
            }
        }
    }

    /// Apply a ledger transition and publish the resulting snapshot.
    fn transition<F>(&self, apply: F) -> Result<(), ProgressError>
    where
        F: FnOnce(&mut InstallationProgress) -> Result<(), ProgressError>,
    {
        let snapshot = {
            let mut progress = self.progress.lock();
            apply(&mut progress)?;
            progress.clone()
        };
        self.publish_progress(snapshot);
        Ok(())
    }

    fn transition_infallible<F>(&self, apply: F)
    where
        F: FnOnce(&mut InstallationProgress),
    {
        let snapshot = {
            let mut progress = self.progress.lock();
            apply(&mut progress);
            progress.clone()
        };
        self.publish_progress(snapshot);
    }

    fn publish_progress(&self, progress: InstallationProgress) {
        self.publish(Event::ProgressUpdated {
            installation_id: self.installation_id,
            progress,
        });
    }

    fn publish(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }
}
