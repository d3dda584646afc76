//! Run error model and fetch retry backoff policy.

use std::time::Duration;

use gatherer_state::StoreError;
use gatherer_types::{BackoffClass, FetchError};

const BACKOFF_FAST_BASE_MS: u64 = 100;
const BACKOFF_NORMAL_BASE_MS: u64 = 1_000;
const BACKOFF_SLOW_BASE_MS: u64 = 5_000;
const BACKOFF_MAX_MS: u64 = 60_000;

// ---------------------------------------------------------------------------
// PipelineError: fatal errors that abort a run
// ---------------------------------------------------------------------------

/// Errors that abort construction, `init()` or a run.
///
/// Per-record fetch failures never surface here; they become `Error`
/// results. Every variant is fatal and none is retried.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Invalid configuration, unresolved helper/extension, bad filter, or
    /// duplicate property names.
    #[error("configuration error: {0}")]
    Config(String),

    /// Header absent, or a batch that does not fit the destination header.
    #[error("schema mismatch in dataset '{dataset}': {message}")]
    SchemaMismatch { dataset: String, message: String },

    /// The sink rejected a batch. Earlier batches stay committed.
    #[error("write to dataset '{dataset}' failed after {flushed} flushed record(s): {source}")]
    Write {
        dataset: String,
        flushed: u64,
        #[source]
        source: StoreError,
    },

    /// Store or scheduler failure outside of a batch write.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Opaque host-side failure (config file I/O, task join, lock poisoning).
    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn schema(dataset: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            dataset: dataset.to_string(),
            message: message.into(),
        }
    }

    /// Records committed before a write failure, if this is a `Write` error.
    pub fn flushed_records(&self) -> Option<u64> {
        match self {
            Self::Write { flushed, .. } => Some(*flushed),
            _ => None,
        }
    }
}

/// Compute retry delay based on error hints and attempt number.
pub(crate) fn compute_backoff(err: &FetchError, attempt: u32) -> Duration {
    if let Some(ms) = err.retry_after_ms {
        return Duration::from_millis(ms);
    }

    let base_ms: u64 = match err.backoff_class {
        BackoffClass::Fast => BACKOFF_FAST_BASE_MS,
        BackoffClass::Normal => BACKOFF_NORMAL_BASE_MS,
        BackoffClass::Slow => BACKOFF_SLOW_BASE_MS,
    };

    let delay_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    Duration::from_millis(delay_ms.min(BACKOFF_MAX_MS))
}
