//! Server records: the persistent catalog entry and the dynamic record
//! kept under `server:dynamic:{id}`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ServerId, UserId, WorkerId};

/// Lifecycle status of a server.
///
/// ```text
/// Scheduled ──▶ Starting ──▶ Running ──▶ Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    /// Capacity reserved on a worker, launch not yet started.
    Scheduled,
    /// The worker picked up the assignment and is launching it.
    Starting,
    /// Promoted to running on its worker.
    Running,
    /// Stopped, or never scheduled.
    Stopped,
}

impl ServerStatus {
    /// Status name as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistent server fields, owned by the relational catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPersistent {
    pub id: ServerId,
    pub user_id: UserId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Persistent fields plus live placement and status.
///
/// Absence of a dynamic record means the server is stopped and unbound;
/// [`ServerDynamic::unscheduled`] builds that view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDynamic {
    pub id: ServerId,
    pub user_id: UserId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Address the server is reachable at.
    #[serde(default)]
    pub address: Option<String>,
    pub status: ServerStatus,
    /// Worker the server is bound to.
    #[serde(default)]
    pub worker_id: Option<WorkerId>,
}

impl ServerDynamic {
    /// Builds a dynamic record placed on `worker_id`.
    #[must_use]
    pub fn placed(
        server: &ServerPersistent,
        address: impl Into<String>,
        status: ServerStatus,
        worker_id: WorkerId,
    ) -> Self {
        Self {
            address: Some(address.into()),
            status,
            worker_id: Some(worker_id),
            ..Self::unscheduled(server)
        }
    }

    /// The view of a server that has no dynamic record.
    #[must_use]
    pub fn unscheduled(server: &ServerPersistent) -> Self {
        Self {
            id: server.id.clone(),
            user_id: server.user_id.clone(),
            name: server.name.clone(),
            kind: server.kind.clone(),
            version: server.version.clone(),
            created_at: server.created_at,
            updated_at: server.updated_at,
            deleted_at: server.deleted_at,
            address: None,
            status: ServerStatus::Stopped,
            worker_id: None,
        }
    }

    /// Sets a new status and bumps `updated_at`.
    pub fn transition(&mut self, status: ServerStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
