//! The per-worker state record stored under `worker:state:{id}`.
//!
//! The record has split ownership: the `assigned` set belongs to the
//! controller (written only by capacity reservation and promotion), every
//! other field belongs to the worker process (written by heartbeats).

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ServerId, WorkerId};

/// Worker state record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerState {
    /// Worker identifier.
    pub id: WorkerId,
    /// Identifier of the host (cloud instance) running the worker.
    #[serde(default)]
    pub host_id: String,
    /// When the worker was first brought up.
    pub created_at: DateTime<Utc>,
    /// Address clients use to reach servers on this worker.
    #[serde(default)]
    pub public_ip: String,
    /// Address used inside the fleet.
    #[serde(default)]
    pub private_ip: String,
    /// Maximum number of assigned plus running servers.
    pub max_servers: u32,
    /// Time of the last heartbeat written by the worker.
    pub last_heartbeat: DateTime<Utc>,
    /// Servers confirmed running on this worker.
    #[serde(rename = "running_servers", default, with = "server_set")]
    pub running: BTreeSet<ServerId>,
    /// Servers reserved on this worker but not yet promoted.
    #[serde(rename = "assigned_servers", default, with = "server_set")]
    pub assigned: BTreeSet<ServerId>,
}

impl WorkerState {
    /// Current load: assigned plus running servers.
    #[must_use]
    pub fn load(&self) -> usize {
        self.assigned.len() + self.running.len()
    }

    /// Remaining capacity, zero when full or over-subscribed.
    #[must_use]
    pub fn free_slots(&self) -> usize {
        usize::try_from(self.max_servers)
            .unwrap_or(usize::MAX)
            .saturating_sub(self.load())
    }

    /// Returns true if another server can be reserved here.
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        self.free_slots() > 0
    }

    /// Returns true if the last heartbeat is younger than `window`.
    ///
    /// A heartbeat stamped in the future (clock skew) counts as fresh.
    #[must_use]
    pub fn is_online(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match (now - self.last_heartbeat).to_std() {
            Ok(age) => age < window,
            Err(_) => true,
        }
    }

    /// Online and with at least one free slot.
    #[must_use]
    pub fn is_free(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.is_online(now, window) && self.has_capacity()
    }
}

/// Serde helper storing a set of server IDs as a JSON object `{id: id}`.
///
/// This is the shape the Lua mutators produce with `cjson`. Arrays and
/// `null` are accepted on input.
pub(crate) mod server_set {
    use std::collections::{BTreeMap, BTreeSet};

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::types::ServerId;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Map(BTreeMap<ServerId, serde_json::Value>),
        List(Vec<ServerId>),
    }

    pub fn serialize<S>(set: &BTreeSet<ServerId>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let map: BTreeMap<&ServerId, &ServerId> = set.iter().map(|id| (id, id)).collect();
        map.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeSet<ServerId>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let repr = Option::<Repr>::deserialize(deserializer)?;
        Ok(match repr {
            None => BTreeSet::new(),
            Some(Repr::Map(map)) => map.into_keys().collect(),
            Some(Repr::List(list)) => list.into_iter().collect(),
        })
    }
}
