//! Configuration for the controller.

use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use lotus_coord::ValkeyConfig;
use serde::Deserialize;

use crate::error::{ControlError, ControlResult};

/// Top-level controller configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ControllerConfig {
    /// Coordination store connection.
    #[serde(default)]
    pub valkey: ValkeyConfig,

    /// Worker selection.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl ControllerConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `controller.toml` in the current directory (if present)
    /// 3. Environment variables with `LOTUS_CONTROLLER_` prefix
    pub fn load() -> ControlResult<Self> {
        Self::extract(Figment::new().merge(Toml::file("controller.toml")))
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> ControlResult<Self> {
        Self::extract(Figment::new().merge(Toml::file(path.as_ref())))
    }

    fn extract(figment: Figment) -> ControlResult<Self> {
        let config: Self = figment
            .merge(Env::prefixed("LOTUS_CONTROLLER_").split("__"))
            .extract()
            .map_err(|e| ControlError::Config(e.to_string()))?;
        if config.scheduler.liveness_window_secs == 0 {
            return Err(ControlError::Config(
                "scheduler.liveness_window_secs must be non-zero".to_owned(),
            ));
        }
        Ok(config)
    }
}

/// Worker selection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// A worker is online while its last heartbeat is younger than this.
    #[serde(default = "default_liveness_window_secs")]
    pub liveness_window_secs: u64,
}

const fn default_liveness_window_secs() -> u64 {
    5
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            liveness_window_secs: default_liveness_window_secs(),
        }
    }
}

impl SchedulerConfig {
    #[must_use]
    pub const fn liveness_window(&self) -> Duration {
        Duration::from_secs(self.liveness_window_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.scheduler.liveness_window(), Duration::from_secs(5));
        assert_eq!(config.valkey.url, "redis://localhost:6379");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ControllerConfig = toml::from_str(
            r#"
            [valkey]
            namespace = "staging"
            "#,
        )
        .unwrap();
        assert_eq!(config.valkey.namespace.as_deref(), Some("staging"));
        assert_eq!(config.scheduler.liveness_window_secs, 5);
    }
}
