//! Test fixtures for controller integration tests.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use lotus_coord::{ServerId, WorkerId, WorkerState};
use lotus_worker::WorkerIdentity;

/// Builder for worker identities.
pub struct IdentityBuilder {
    id: String,
    public_ip: String,
    max_servers: u32,
}

impl IdentityBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            public_ip: "203.0.113.10".to_owned(),
            max_servers: 1,
        }
    }

    pub fn max_servers(mut self, max_servers: u32) -> Self {
        self.max_servers = max_servers;
        self
    }

    pub fn build(self) -> WorkerIdentity {
        WorkerIdentity {
            id: WorkerId::new(self.id),
            host_id: "ocid1.instance.test".to_owned(),
            created_at: Utc::now(),
            public_ip: self.public_ip,
            private_ip: "10.0.0.10".to_owned(),
            max_servers: self.max_servers,
        }
    }
}

/// Builder for worker records inserted straight into the store.
pub struct WorkerStateBuilder {
    id: String,
    max_servers: u32,
    running: BTreeSet<ServerId>,
    last_heartbeat: DateTime<Utc>,
}

impl WorkerStateBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            max_servers: 1,
            running: BTreeSet::new(),
            last_heartbeat: Utc::now(),
        }
    }

    pub fn max_servers(mut self, max_servers: u32) -> Self {
        self.max_servers = max_servers;
        self
    }

    pub fn running(mut self, ids: &[&str]) -> Self {
        self.running = ids.iter().map(|id| ServerId::new(*id)).collect();
        self
    }

    pub fn heartbeat_age(mut self, age: Duration) -> Self {
        self.last_heartbeat = Utc::now() - age;
        self
    }

    pub fn build(self) -> WorkerState {
        WorkerState {
            id: WorkerId::new(self.id),
            host_id: String::new(),
            created_at: self.last_heartbeat,
            public_ip: "198.51.100.20".to_owned(),
            private_ip: String::new(),
            max_servers: self.max_servers,
            last_heartbeat: self.last_heartbeat,
            running: self.running,
            assigned: BTreeSet::new(),
        }
    }
}
