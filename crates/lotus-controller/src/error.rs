//! Error types for the controller.

use lotus_coord::{ServerId, StoreError};

/// Result type alias using [`ControlError`].
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors surfaced to callers of the orchestration service.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Server does not exist or belongs to another user.
    #[error("server not found: {0}")]
    NotFound(ServerId),

    /// No online worker has a free slot.
    #[error("no worker has free capacity")]
    NoCapacity,

    /// Start requested for a server that already has a live dynamic record.
    #[error("server {0} is already running")]
    AlreadyRunning(ServerId),

    /// Stop requested for a server that is not running.
    #[error("server {0} is not running")]
    NotRunning(ServerId),

    /// Persistent store failure.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Coordination store error, including a reservation that lost a race.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ControlError {
    /// Create a catalog error.
    #[must_use]
    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog(msg.into())
    }
}
