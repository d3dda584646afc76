//! Shared gatherer data model: cells, records, dataset layout, fetch
//! contract types, and the fetch error taxonomy.
//!
//! This crate carries no I/O so the store, engine and CLI crates can share
//! it without circular dependencies.

#![warn(clippy::pedantic)]

pub mod cell;
pub mod dataset;
pub mod error;
pub mod fetch;
pub mod record;
pub mod state;

pub use cell::{CellValue, Grid};
pub use dataset::{DataAxis, DatasetConfig, DatasetId};
pub use error::{BackoffClass, FetchError, FetchErrorCategory};
pub use fetch::{FetchRequest, FetchResponse};
pub use record::Record;
pub use state::{RunStatus, TriggerId};
