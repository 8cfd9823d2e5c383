//! Custom assertion helpers for installer integration tests.

use da_core::repositories::mock::{BackendCall, BackendOperation};
use da_protocol::installation_models::{ExecutionState, InstallationProgress};
use da_protocol::ipc::Event;

/// Assert the state of every step, in order.
pub fn assert_step_states(progress: &InstallationProgress, expected: &[ExecutionState]) {
    let actual: Vec<ExecutionState> = progress.steps.iter().map(|s| s.state).collect();
    assert_eq!(actual, expected, "unexpected step states");
}

/// Assert that no call of the given kinds was made.
pub fn assert_never_called(calls: &[BackendCall], operations: &[BackendOperation]) {
    for call in calls {
        assert!(
            !operations.contains(&call.operation()),
            "unexpected call {call:?}"
        );
    }
}

/// Names of the steps whose rollback events were emitted, in order.
pub fn rolled_back_steps(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::RollbackSucceeded { step, .. } => Some(step.clone()),
            _ => None,
        })
        .collect()
}

/// Assert that the run started first and ended with the given terminal event.
pub fn assert_event_bookends(events: &[Event], succeeded: bool) {
    assert!(
        matches!(events.first(), Some(Event::InstallationStarted { step_count: 6, .. })),
        "first event should be InstallationStarted, got: {:?}",
        events.first()
    );

    let last = events.last();
    if succeeded {
        assert!(
            matches!(last, Some(Event::InstallationCompleted { .. })),
            "last event should be InstallationCompleted, got: {last:?}"
        );
    } else {
        assert!(
            matches!(last, Some(Event::InstallationFailed { .. })),
            "last event should be InstallationFailed, got: {last:?}"
        );
    }

    let id = events[0].installation_id();
    assert!(events.iter().all(|e| e.installation_id() == id));
}
