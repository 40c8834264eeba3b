//! Valkey/Redis coordination store.
//!
//! Records are JSON strings. The three worker mutators run as Lua scripts so
//! that each read-modify-write is a single atomic step on the server.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::{Config, Connection, Pool, Runtime};

use crate::command::ServerCommand;
use crate::config::ValkeyConfig;
use crate::error::{Result, StoreError};
use crate::keys::KeySpace;
use crate::server::ServerDynamic;
use crate::traits::{CoordinationStore, WorkerPage};
use crate::types::{ServerId, WorkerId};
use crate::worker::WorkerState;

/// Normalises a decoded set into `{id = id}` form. Tolerates `null` and
/// array-shaped sets written by other clients.
const SET_HELPERS: &str = r"
local function as_set(value)
    local set = {}
    if type(value) ~= 'table' then
        return set
    end
    for k, v in pairs(value) do
        if type(k) == 'number' then
            set[v] = v
        else
            set[k] = k
        end
    end
    return set
end

local function size(set)
    local n = 0
    for _ in pairs(set) do
        n = n + 1
    end
    return n
end
";

/// KEYS[1] worker key, ARGV[1] server id.
/// Returns `{code, max_servers}`: code -1 (no worker), -2 (at capacity) or
/// the new assigned count.
const RESERVE_SCRIPT: &str = r"
local data = redis.call('GET', KEYS[1])
if not data then
    return {-1, 0}
end

local worker = cjson.decode(data)
local assigned = as_set(worker.assigned_servers)
local running = as_set(worker.running_servers)
local max_servers = tonumber(worker.max_servers) or 0

local assigned_count = size(assigned)
if assigned_count + size(running) >= max_servers then
    return {-2, max_servers}
end

assigned[ARGV[1]] = ARGV[1]
worker.assigned_servers = assigned
worker.running_servers = running
redis.call('SET', KEYS[1], cjson.encode(worker))
return {assigned_count + 1, max_servers}
";

/// KEYS[1] worker key, ARGV[1] server id.
/// Returns -1 (no worker), -2 (not assigned) or 1.
const PROMOTE_SCRIPT: &str = r"
local data = redis.call('GET', KEYS[1])
if not data then
    return -1
end

local worker = cjson.decode(data)
local assigned = as_set(worker.assigned_servers)
if not assigned[ARGV[1]] then
    return -2
end

local running = as_set(worker.running_servers)
assigned[ARGV[1]] = nil
running[ARGV[1]] = ARGV[1]

worker.assigned_servers = assigned
worker.running_servers = running
redis.call('SET', KEYS[1], cjson.encode(worker))
return 1
";

/// KEYS[1] worker key, ARGV[1] snapshot JSON.
/// Returns 1 when the record was created, 2 when merged.
const HEARTBEAT_SCRIPT: &str = r"
local incoming = cjson.decode(ARGV[1])
incoming.running_servers = as_set(incoming.running_servers)

local data = redis.call('GET', KEYS[1])
if not data then
    incoming.assigned_servers = {}
    redis.call('SET', KEYS[1], cjson.encode(incoming))
    return 1
end

local existing = cjson.decode(data)
incoming.assigned_servers = as_set(existing.assigned_servers)
redis.call('SET', KEYS[1], cjson.encode(incoming))
return 2
";

/// Valkey/Redis coordination store.
#[derive(Clone)]
pub struct ValkeyStore {
    pool: Pool,
    keys: KeySpace,
    reserve: redis::Script,
    promote: redis::Script,
    heartbeat: redis::Script,
}

impl ValkeyStore {
    /// Connects and verifies the store answers `PING`.
    pub async fn connect(config: &ValkeyConfig) -> Result<Self> {
        let pool = Config::from_url(&config.url)
            .builder()
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .max_size(config.pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self {
            pool,
            keys: KeySpace::new(config.namespace.clone()),
            reserve: redis::Script::new(&format!("{SET_HELPERS}{RESERVE_SCRIPT}")),
            promote: redis::Script::new(&format!("{SET_HELPERS}{PROMOTE_SCRIPT}")),
            heartbeat: redis::Script::new(&format!("{SET_HELPERS}{HEARTBEAT_SCRIPT}")),
        };

        let mut conn = store.conn().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(store)
    }

    async fn conn(&self) -> Result<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

fn backend(e: redis::RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Backend(e.to_string())
    }
}

#[async_trait]
impl CoordinationStore for ValkeyStore {
    async fn get_worker(&self, worker_id: &WorkerId) -> Result<Option<WorkerState>> {
        let mut conn = self.conn().await?;
        let data: Option<String> = conn
            .get(self.keys.worker_state(worker_id))
            .await
            .map_err(backend)?;

        data.map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .transpose()
    }

    async fn scan_workers(&self, cursor: u64, count: usize) -> Result<WorkerPage> {
        let mut conn = self.conn().await?;

        let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(self.keys.worker_state_pattern())
            .arg("COUNT")
            .arg(count)
            .query_async(&mut *conn)
            .await
            .map_err(backend)?;

        let mut workers = Vec::with_capacity(keys.len());
        if !keys.is_empty() {
            let values: Vec<Option<String>> = redis::cmd("MGET")
                .arg(&keys)
                .query_async(&mut *conn)
                .await
                .map_err(backend)?;

            // A key can vanish between SCAN and MGET.
            for json in values.into_iter().flatten() {
                workers.push(serde_json::from_str(&json)?);
            }
        }

        Ok(WorkerPage {
            workers,
            next_cursor: (next_cursor != 0).then_some(next_cursor),
        })
    }

    async fn reserve_capacity(&self, worker_id: &WorkerId, server_id: &ServerId) -> Result<usize> {
        let mut conn = self.conn().await?;
        let (code, max_servers): (i64, u32) = self
            .reserve
            .key(self.keys.worker_state(worker_id))
            .arg(server_id.as_str())
            .invoke_async(&mut *conn)
            .await
            .map_err(backend)?;

        match code {
            -1 => Err(StoreError::WorkerNotFound(worker_id.clone())),
            -2 => Err(StoreError::CapacityExceeded {
                worker_id: worker_id.clone(),
                max_servers,
            }),
            n => usize::try_from(n)
                .map_err(|_| StoreError::Backend(format!("unexpected reserve result {n}"))),
        }
    }

    async fn promote_assignment(&self, worker_id: &WorkerId, server_id: &ServerId) -> Result<()> {
        let mut conn = self.conn().await?;
        let code: i64 = self
            .promote
            .key(self.keys.worker_state(worker_id))
            .arg(server_id.as_str())
            .invoke_async(&mut *conn)
            .await
            .map_err(backend)?;

        match code {
            1 => Ok(()),
            -1 => Err(StoreError::WorkerNotFound(worker_id.clone())),
            -2 => Err(StoreError::NotAssigned {
                worker_id: worker_id.clone(),
                server_id: server_id.clone(),
            }),
            n => Err(StoreError::Backend(format!("unexpected promote result {n}"))),
        }
    }

    async fn merge_heartbeat(&self, snapshot: &WorkerState) -> Result<bool> {
        let json = serde_json::to_string(snapshot)?;
        let mut conn = self.conn().await?;
        let code: i64 = self
            .heartbeat
            .key(self.keys.worker_state(&snapshot.id))
            .arg(json)
            .invoke_async(&mut *conn)
            .await
            .map_err(backend)?;

        Ok(code == 1)
    }

    async fn get_server(&self, server_id: &ServerId) -> Result<Option<ServerDynamic>> {
        let mut conn = self.conn().await?;
        let data: Option<String> = conn
            .get(self.keys.server_dynamic(server_id))
            .await
            .map_err(backend)?;

        data.map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .transpose()
    }

    async fn set_server(&self, record: &ServerDynamic) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let mut conn = self.conn().await?;
        conn.set::<_, _, ()>(self.keys.server_dynamic(&record.id), json)
            .await
            .map_err(backend)
    }

    async fn push_command(&self, worker_id: &WorkerId, command: &ServerCommand) -> Result<()> {
        let json = serde_json::to_string(command)?;
        let mut conn = self.conn().await?;
        conn.rpush::<_, _, ()>(self.keys.worker_command(worker_id), json)
            .await
            .map_err(backend)
    }

    async fn pop_command(
        &self,
        worker_id: &WorkerId,
        timeout: Duration,
    ) -> Result<Option<ServerCommand>> {
        let mut conn = self.conn().await?;

        // BLPOP treats 0 as "block forever".
        let wait = timeout.as_secs_f64().max(0.01);
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(self.keys.worker_command(worker_id))
            .arg(wait)
            .query_async(&mut *conn)
            .await
            .map_err(backend)?;

        popped
            .map(|(_, json)| serde_json::from_str(&json).map_err(StoreError::from))
            .transpose()
    }

    async fn command_queue_len(&self, worker_id: &WorkerId) -> Result<usize> {
        let mut conn = self.conn().await?;
        conn.llen(self.keys.worker_command(worker_id))
            .await
            .map_err(backend)
    }
}

impl std::fmt::Debug for ValkeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValkeyStore")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;

    use super::*;
    use crate::command::CommandAction;

    // Integration tests require a running Valkey/Redis instance
    // Run with: cargo test -p lotus-coord -- --ignored

    async fn connect(namespace: &str) -> ValkeyStore {
        let config = ValkeyConfig {
            url: "redis://127.0.0.1:6379".to_owned(),
            pool_size: 5,
            namespace: Some(format!("lotus-test-{namespace}-{}", uuid::Uuid::new_v4())),
        };
        ValkeyStore::connect(&config)
            .await
            .expect("Failed to connect to Valkey")
    }

    fn snapshot(id: &str, max_servers: u32) -> WorkerState {
        WorkerState {
            id: WorkerId::new(id),
            host_id: "host".to_owned(),
            created_at: Utc::now(),
            public_ip: "203.0.113.1".to_owned(),
            private_ip: "10.0.0.1".to_owned(),
            max_servers,
            last_heartbeat: Utc::now(),
            running: BTreeSet::new(),
            assigned: BTreeSet::new(),
        }
    }

    #[tokio::test]
    #[ignore = "requires Valkey/Redis instance at 127.0.0.1:6379"]
    async fn reserve_promote_and_merge() {
        let store = connect("mutators").await;
        let worker = snapshot("w1", 1);
        let s1 = ServerId::new("s1");

        assert!(store.merge_heartbeat(&worker).await.unwrap());
        assert_eq!(store.reserve_capacity(&worker.id, &s1).await.unwrap(), 1);
        assert!(matches!(
            store.reserve_capacity(&worker.id, &ServerId::new("s2")).await,
            Err(StoreError::CapacityExceeded { max_servers: 1, .. })
        ));

        // Heartbeat must not clobber the controller-owned assigned set.
        assert!(!store.merge_heartbeat(&worker).await.unwrap());
        let stored = store.get_worker(&worker.id).await.unwrap().unwrap();
        assert_eq!(stored.assigned, BTreeSet::from([s1.clone()]));

        store.promote_assignment(&worker.id, &s1).await.unwrap();
        assert!(matches!(
            store.promote_assignment(&worker.id, &s1).await,
            Err(StoreError::NotAssigned { .. })
        ));

        let stored = store.get_worker(&worker.id).await.unwrap().unwrap();
        assert!(stored.assigned.is_empty());
        assert_eq!(stored.running, BTreeSet::from([s1]));
    }

    #[tokio::test]
    #[ignore = "requires Valkey/Redis instance at 127.0.0.1:6379"]
    async fn scan_and_queue() {
        let store = connect("scan").await;
        for i in 0..5 {
            store
                .merge_heartbeat(&snapshot(&format!("w{i}"), 1))
                .await
                .unwrap();
        }
        assert_eq!(store.list_workers().await.unwrap().len(), 5);

        let w0 = WorkerId::new("w0");
        store
            .push_command(&w0, &ServerCommand::new(ServerId::new("s1"), CommandAction::Stop))
            .await
            .unwrap();
        assert_eq!(store.command_queue_len(&w0).await.unwrap(), 1);

        let popped = store
            .pop_command(&w0, Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(popped.server_id.as_str(), "s1");
        assert!(store
            .pop_command(&w0, Duration::from_millis(100))
            .await
            .unwrap()
            .is_none());
    }
}
