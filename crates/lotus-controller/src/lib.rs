//! Lotus controller.
//!
//! Chooses workers for servers and drives their lifecycle through the
//! coordination store:
//!
//! - [`Scheduler`]: finds an online worker with a free slot and reserves
//!   capacity on it
//! - [`ServerService`]: create, list, get, start and stop, with ownership
//!   checked against a [`ServerCatalog`]

pub mod catalog;
pub mod config;
pub mod error;
pub mod scheduler;
pub mod service;

pub use catalog::{MemoryCatalog, ServerCatalog};
pub use config::{ControllerConfig, SchedulerConfig};
pub use error::{ControlError, ControlResult};
pub use scheduler::Scheduler;
pub use service::{NewServer, ServerService};
