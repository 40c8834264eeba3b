//! Configuration for the worker agent.

use std::time::Duration;

use chrono::{DateTime, Utc};
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use lotus_coord::{ValkeyConfig, WorkerId};
use serde::Deserialize;

use crate::error::{WorkerError, WorkerResult};
use crate::state::WorkerIdentity;

/// Top-level configuration for the worker agent.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WorkerConfig {
    /// Static identity published with every heartbeat.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Coordination store connection.
    #[serde(default)]
    pub valkey: ValkeyConfig,

    /// Background loop timing.
    #[serde(default)]
    pub loops: LoopConfig,
}

impl WorkerConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `worker.toml` in the current directory (if present)
    /// 3. Environment variables with `LOTUS_WORKER_` prefix
    pub fn load() -> WorkerResult<Self> {
        Self::extract(Figment::new().merge(Toml::file("worker.toml")))
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> WorkerResult<Self> {
        Self::extract(Figment::new().merge(Toml::file(path.as_ref())))
    }

    fn extract(figment: Figment) -> WorkerResult<Self> {
        let config: Self = figment
            .merge(Env::prefixed("LOTUS_WORKER_").split("__"))
            .extract()
            .map_err(|e| WorkerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the agent cannot start with.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.identity.id.trim().is_empty() {
            return Err(WorkerError::Config("identity.id is required".to_owned()));
        }
        if self.identity.max_servers == 0 {
            return Err(WorkerError::Config(
                "identity.max_servers must be at least 1".to_owned(),
            ));
        }
        if self.loops.heartbeat_interval_ms == 0
            || self.loops.assignment_interval_ms == 0
            || self.loops.command_wait_secs == 0
        {
            return Err(WorkerError::Config(
                "loop intervals and the command wait must be non-zero".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Worker identity as configured.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Worker identifier. Required.
    #[serde(default)]
    pub id: String,

    /// Host (cloud instance) identifier.
    #[serde(default)]
    pub host_id: String,

    /// Creation time; defaults to agent start.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    /// Publicly reachable address.
    #[serde(default = "default_ip")]
    pub public_ip: String,

    /// Fleet-internal address.
    #[serde(default = "default_ip")]
    pub private_ip: String,

    /// Capacity limit.
    #[serde(default = "default_max_servers")]
    pub max_servers: u32,
}

fn default_ip() -> String {
    "127.0.0.1".to_owned()
}

const fn default_max_servers() -> u32 {
    1
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            host_id: String::new(),
            created_at: None,
            public_ip: default_ip(),
            private_ip: default_ip(),
            max_servers: default_max_servers(),
        }
    }
}

impl IdentityConfig {
    /// Resolves the identity, stamping `created_at` now if unset.
    #[must_use]
    pub fn resolve(&self) -> WorkerIdentity {
        WorkerIdentity {
            id: WorkerId::new(self.id.trim()),
            host_id: self.host_id.clone(),
            created_at: self.created_at.unwrap_or_else(Utc::now),
            public_ip: self.public_ip.clone(),
            private_ip: self.private_ip.clone(),
            max_servers: self.max_servers,
        }
    }
}

/// Background loop timing.
#[derive(Debug, Clone, Deserialize)]
pub struct LoopConfig {
    /// Heartbeat interval in milliseconds.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Assignment polling interval in milliseconds.
    #[serde(default = "default_assignment_interval_ms")]
    pub assignment_interval_ms: u64,

    /// Bounded wait on the command queue, in seconds.
    #[serde(default = "default_command_wait_secs")]
    pub command_wait_secs: u64,
}

const fn default_heartbeat_interval_ms() -> u64 {
    1000
}

const fn default_assignment_interval_ms() -> u64 {
    500
}

const fn default_command_wait_secs() -> u64 {
    5
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            assignment_interval_ms: default_assignment_interval_ms(),
            command_wait_secs: default_command_wait_secs(),
        }
    }
}

impl LoopConfig {
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    #[must_use]
    pub const fn assignment_interval(&self) -> Duration {
        Duration::from_millis(self.assignment_interval_ms)
    }

    #[must_use]
    pub const fn command_wait(&self) -> Duration {
        Duration::from_secs(self.command_wait_secs)
    }
}
