//! Orchestration crate for gatherer runs.
//!
//! Reads configuration-described records from a tabular store, sends each
//! through a fetch capability and its extensions, and appends the results
//! to another dataset in bounded batches. Trigger bookkeeping lives in a
//! reserved system dataset.

pub mod config;
pub mod connector;
pub mod errors;
pub mod execution;
pub mod extension;
pub mod filter;
pub mod ledger;
pub mod logging;
pub mod orchestrator;
pub mod resolve;
pub mod result;
pub mod schema;

// Re-export public API for convenience
pub use connector::{ApiHandler, Connector, TabularConnector};
pub use errors::PipelineError;
pub use execution::{ExecutionOptions, RunRequest};
pub use extension::{Extension, ExtensionKind, ExtensionRegistry};
pub use orchestrator::Gatherer;
pub use resolve::{Collaborators, HelperKind};
pub use result::{InitReport, RunPhase, RunResult, RunSummary};
pub use tokio_util::sync::CancellationToken;
