//! Collaborator contracts for the gatherer engine.
//!
//! Provides the [`TabularStore`] and [`TriggerScheduler`] traits plus
//! in-memory implementations ([`MemoryStore`], [`MemoryScheduler`]) used by
//! tests and the CLI's JSON workbook mode.

#![warn(clippy::pedantic)]

pub mod backend;
pub mod error;
pub mod memory;
pub mod scheduler;

pub use backend::{TabularStore, WriteCall};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use scheduler::{MemoryScheduler, ScheduledTrigger, TriggerScheduler};
