//! Error types shared across the installer core.

use crate::context::ContextKey;
use thiserror::Error;

/// Failure reported by an ML-Commons repository call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The cluster answered with a non-success HTTP status.
    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never produced an HTTP response.
    #[error("Network error: {0}")]
    Network(String),

    /// The response could not be decoded or lacked a required field.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The cluster did not acknowledge a settings update.
    #[error("{0}")]
    NotAcknowledged(String),

    /// The addressed resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl RepositoryError {
    /// HTTP status attached to the failure, if the cluster answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            RepositoryError::Status { status, .. } => Some(*status),
            RepositoryError::NotFound(_) => Some(404),
            _ => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, RepositoryError::Network(_))
    }
}

/// Type alias for Result with RepositoryError.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Lookup of an identifier that no completed step has produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("{0} not found in installation context")]
    NotFound(ContextKey),
}

/// Failure of a monitoring operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
