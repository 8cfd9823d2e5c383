//! Progress events emitted by an installation run.
//!
//! The installer core publishes an `Event` after every state transition of
//! the progress ledger and after every compensation it attempts. The dashboard
//! (or the CLI) subscribes to these to render live progress without ever
//! touching the live ledger itself.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::installation_models::InstallationProgress;

/// Events sent from the installer core to its observers.
///
/// Uses tagged enum serialization for TypeScript compatibility:
/// ```json
/// {
///   "type": "rollbackFailed",
///   "payload": {
///     "installation_id": "uuid-here",
///     "step": "Create Model",
///     "message": "Failed to rollback model creation"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    /// A new installation run has been created.
    InstallationStarted {
        #[ts(type = "string")]
        installation_id: Uuid,
        step_count: usize,
    },

    /// The progress ledger changed; carries an independent snapshot.
    ProgressUpdated {
        #[ts(type = "string")]
        installation_id: Uuid,
        progress: InstallationProgress,
    },

    /// A compensation finished without error.
    RollbackSucceeded {
        #[ts(type = "string")]
        installation_id: Uuid,
        step: String,
    },

    /// A compensation failed; the resource may need manual cleanup.
    RollbackFailed {
        #[ts(type = "string")]
        installation_id: Uuid,
        step: String,
        message: String,
    },

    /// Every step finished successfully.
    InstallationCompleted {
        #[ts(type = "string")]
        installation_id: Uuid,
    },

    /// A step failed and the run was unwound.
    InstallationFailed {
        #[ts(type = "string")]
        installation_id: Uuid,
        step: String,
        error: String,
    },
}

impl Event {
    /// Identifier of the run this event belongs to.
    pub fn installation_id(&self) -> Uuid {
        match self {
            Event::InstallationStarted { installation_id, .. }
            | Event::ProgressUpdated { installation_id, .. }
            | Event::RollbackSucceeded { installation_id, .. }
            | Event::RollbackFailed { installation_id, .. }
            | Event::InstallationCompleted { installation_id }
            | Event::InstallationFailed { installation_id, .. } => *installation_id,
        }
    }
}
