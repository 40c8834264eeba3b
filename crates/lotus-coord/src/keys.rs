//! Key layout in the coordination store.

use crate::types::{ServerId, WorkerId};

pub const WORKER_STATE_PREFIX: &str = "worker:state:";
pub const SERVER_DYNAMIC_PREFIX: &str = "server:dynamic:";
pub const WORKER_COMMAND_PREFIX: &str = "worker:command:";

/// Builds keys, optionally under a namespace (`{ns}:worker:state:...`).
#[derive(Debug, Clone, Default)]
pub struct KeySpace {
    namespace: Option<String>,
}

impl KeySpace {
    #[must_use]
    pub fn new(namespace: Option<String>) -> Self {
        Self { namespace }
    }

    fn prefixed(&self, key: String) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}:{key}"),
            None => key,
        }
    }

    #[must_use]
    pub fn worker_state(&self, id: &WorkerId) -> String {
        self.prefixed(format!("{WORKER_STATE_PREFIX}{id}"))
    }

    #[must_use]
    pub fn server_dynamic(&self, id: &ServerId) -> String {
        self.prefixed(format!("{SERVER_DYNAMIC_PREFIX}{id}"))
    }

    #[must_use]
    pub fn worker_command(&self, id: &WorkerId) -> String {
        self.prefixed(format!("{WORKER_COMMAND_PREFIX}{id}"))
    }

    /// `SCAN MATCH` pattern covering every worker state key.
    #[must_use]
    pub fn worker_state_pattern(&self) -> String {
        self.prefixed(format!("{WORKER_STATE_PREFIX}*"))
    }
}
