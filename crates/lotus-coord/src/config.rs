use serde::Deserialize;

/// Connection settings for the Valkey/Redis coordination store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValkeyConfig {
    /// Connection URL.
    pub url: String,
    /// Maximum pool connections.
    pub pool_size: usize,
    /// Optional key namespace, prepended as `{namespace}:`.
    pub namespace: Option<String>,
}

impl Default for ValkeyConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_owned(),
            pool_size: 10,
            namespace: None,
        }
    }
}
