use thiserror::Error;

use crate::types::{ServerId, WorkerId};

/// Result type for coordination store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("worker not found: {0}")]
    WorkerNotFound(WorkerId),

    #[error("server not found: {0}")]
    ServerNotFound(ServerId),

    #[error("worker {worker_id} at capacity ({max_servers} servers)")]
    CapacityExceeded { worker_id: WorkerId, max_servers: u32 },

    #[error("server {server_id} is not assigned to worker {worker_id}")]
    NotAssigned {
        worker_id: WorkerId,
        server_id: ServerId,
    },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Serialisation error: {0}")]
    Serialisation(String),
}

impl StoreError {
    /// Returns true for store I/O failures that a later attempt may not hit.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Backend(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialisation(e.to_string())
    }
}
