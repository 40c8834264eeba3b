//! Persistent server records.
//!
//! The relational store that owns these rows lives outside this crate;
//! the orchestration service only needs to insert and look them up.

use std::sync::RwLock;

use async_trait::async_trait;
use lotus_coord::{ServerId, ServerPersistent, UserId};

use crate::error::{ControlError, ControlResult};

/// Read/append access to persistent server records.
#[async_trait]
pub trait ServerCatalog: Send + Sync {
    /// Appends a new server row.
    async fn insert(&self, server: &ServerPersistent) -> ControlResult<()>;

    /// Servers owned by `user_id`, oldest first.
    async fn list_for_user(&self, user_id: &UserId) -> ControlResult<Vec<ServerPersistent>>;

    /// One server, only if it is owned by `user_id`.
    async fn get(
        &self,
        user_id: &UserId,
        server_id: &ServerId,
    ) -> ControlResult<Option<ServerPersistent>>;
}

/// In-memory catalog for tests and single-process runs.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    servers: RwLock<Vec<ServerPersistent>>,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServerCatalog for MemoryCatalog {
    async fn insert(&self, server: &ServerPersistent) -> ControlResult<()> {
        let mut servers = self
            .servers
            .write()
            .map_err(|_| ControlError::catalog("lock poisoned"))?;

        if servers.iter().any(|s| s.id == server.id) {
            return Err(ControlError::catalog(format!(
                "server {} already exists",
                server.id
            )));
        }
        servers.push(server.clone());
        Ok(())
    }

    async fn list_for_user(&self, user_id: &UserId) -> ControlResult<Vec<ServerPersistent>> {
        let servers = self
            .servers
            .read()
            .map_err(|_| ControlError::catalog("lock poisoned"))?;

        Ok(servers
            .iter()
            .filter(|s| &s.user_id == user_id && s.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn get(
        &self,
        user_id: &UserId,
        server_id: &ServerId,
    ) -> ControlResult<Option<ServerPersistent>> {
        let servers = self
            .servers
            .read()
            .map_err(|_| ControlError::catalog("lock poisoned"))?;

        Ok(servers
            .iter()
            .find(|s| &s.id == server_id && &s.user_id == user_id && s.deleted_at.is_none())
            .cloned())
    }
}
