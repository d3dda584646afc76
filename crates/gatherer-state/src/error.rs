//! Store and scheduler error types.

use std::error::Error as StdError;

/// Errors produced by [`TabularStore`](crate::TabularStore) and
/// [`TriggerScheduler`](crate::TriggerScheduler) operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The named dataset does not exist in the store.
    #[error("dataset '{0}' not found")]
    DatasetNotFound(String),

    /// A write addressed cells outside the addressable range.
    #[error("invalid range for dataset '{dataset}': {message}")]
    InvalidRange { dataset: String, message: String },

    /// The sink refused the write (quota, rate limit, protection, ...).
    #[error("write to dataset '{dataset}' rejected: {message}")]
    Rejected { dataset: String, message: String },

    /// The scheduler has no trigger with this id.
    #[error("trigger '{0}' not found")]
    TriggerNotFound(String),

    /// File-system I/O failure (workbook files).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Workbook (de)serialization failure.
    #[error("workbook json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("store lock poisoned")]
    LockPoisoned,

    /// Opaque failure from an external store implementation.
    #[error("store backend error: {context}")]
    Backend {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },
}

impl StoreError {
    /// Wrap an implementation error with context.
    pub fn backend(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StoreError>;
