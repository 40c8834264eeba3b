//! Lifecycle commands delivered through `worker:command:{id}` queues.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ServerId;

/// Known command actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandAction {
    Stop,
    Restart,
    Update,
}

impl CommandAction {
    /// Action name as carried on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for CommandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action name no handler is registered for.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for CommandAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            "update" => Ok(Self::Update),
            other => Err(UnknownAction(other.to_owned())),
        }
    }
}

/// Command payload pushed to a worker's queue.
///
/// The action stays a plain string on the wire so that a command with an
/// unrecognised action still decodes and can be rejected by the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCommand {
    pub server_id: ServerId,
    pub action: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl ServerCommand {
    /// Creates a command stamped with the current time.
    #[must_use]
    pub fn new(server_id: ServerId, action: CommandAction) -> Self {
        Self {
            server_id,
            action: action.as_str().to_owned(),
            params: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Parses the action name.
    pub fn action(&self) -> Result<CommandAction, UnknownAction> {
        self.action.parse()
    }
}
