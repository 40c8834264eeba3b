//! Error types for the worker agent.

use lotus_coord::{ServerId, StoreError, UnknownAction};

/// Result type alias using [`WorkerError`].
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors raised by the worker loops and command handlers.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Command carried an action with no handler.
    #[error(transparent)]
    UnknownAction(#[from] UnknownAction),

    /// Command parameters could not be decoded.
    #[error("invalid command parameters: {0}")]
    InvalidParams(String),

    /// The launch hook reported a failure.
    #[error("launch hook failed for server {server_id}: {reason}")]
    Launch {
        /// Server the hook was acting on.
        server_id: ServerId,
        /// Hook-provided reason.
        reason: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Coordination store error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WorkerError {
    /// Create a launch hook error.
    #[must_use]
    pub fn launch(server_id: &ServerId, reason: impl Into<String>) -> Self {
        Self::Launch {
            server_id: server_id.clone(),
            reason: reason.into(),
        }
    }
}
