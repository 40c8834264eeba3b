//! Lotus coordination core: the records the controller and the workers
//! share through the coordination store, and the store itself.
//!
//! Three kinds of keys live in the store:
//!
//! - `worker:state:{id}`: the [`WorkerState`] record, mutated only through
//!   the atomic [`CoordinationStore::reserve_capacity`],
//!   [`CoordinationStore::promote_assignment`] and
//!   [`CoordinationStore::merge_heartbeat`] operations
//! - `server:dynamic:{id}`: the [`ServerDynamic`] record, plain get/set
//! - `worker:command:{id}`: a FIFO list of [`ServerCommand`] payloads
//!
//! Two backends implement [`CoordinationStore`]: [`ValkeyStore`] for
//! deployments and [`MemoryStore`] for tests and single-process runs.

pub mod command;
pub mod config;
pub mod error;
pub mod keys;
mod memory;
pub mod server;
mod traits;
pub mod types;
#[cfg(feature = "valkey")]
mod valkey;
pub mod worker;

pub use command::{CommandAction, ServerCommand, UnknownAction};
pub use config::ValkeyConfig;
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use server::{ServerDynamic, ServerPersistent, ServerStatus};
pub use traits::{CoordinationStore, WorkerPage, DEFAULT_SCAN_COUNT};
pub use types::{ServerId, UserId, WorkerId};
#[cfg(feature = "valkey")]
pub use valkey::ValkeyStore;
pub use worker::WorkerState;
