//! Lotus worker agent.
//!
//! A worker hosts a bounded number of servers. It runs three independent
//! loops against the coordination store:
//!
//! - [`HeartbeatPublisher`]: merges the local view into `worker:state:{id}`
//!   once per interval, keeping the worker online
//! - [`AssignmentProcessor`]: launches servers the controller reserved on
//!   this worker and promotes them to running
//! - [`CommandConsumer`]: takes lifecycle commands off
//!   `worker:command:{id}` in order
//!
//! All three share one [`LocalWorker`]. [`WorkerAgent`] starts them.

pub mod agent;
pub mod assignment;
pub mod commands;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod launcher;
pub mod state;

#[cfg(test)]
mod test_support;

pub use agent::{AgentHandle, LoopHandle, WorkerAgent};
pub use assignment::{AssignmentProcessor, Promotion};
pub use commands::{CommandConsumer, ServerUpdate};
pub use config::{IdentityConfig, LoopConfig, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use heartbeat::HeartbeatPublisher;
pub use launcher::{NoopLauncher, ServerLauncher};
pub use state::{LocalWorker, WorkerIdentity};
