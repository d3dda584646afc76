//! Tabular store trait definition.
//!
//! [`TabularStore`] is the only way the engine touches dataset contents.
//! The engine never assumes a backing technology: spreadsheets, databases
//! and in-memory grids all fit behind it.

use async_trait::async_trait;
use gatherer_types::{DatasetId, Grid};

use crate::error;

/// Storage contract for 2-D datasets.
///
/// Positions are 1-based, matching spreadsheet addressing. Implementations
/// must be `Send + Sync` for use behind `Arc<dyn TabularStore>` and must make
/// each `write_range` call atomic with respect to concurrent reads of the
/// same range.
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// Read the full populated range of `dataset`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatasetNotFound`](crate::StoreError::DatasetNotFound)
    /// for unknown datasets, or a backend error.
    async fn read_range(&self, dataset: &DatasetId) -> error::Result<Grid>;

    /// Write `values` with its top-left cell at (`start_row`, `start_col`).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`](crate::StoreError) when the dataset is missing,
    /// the range is invalid, or the sink rejects the write.
    async fn write_range(
        &self,
        dataset: &DatasetId,
        start_row: usize,
        start_col: usize,
        values: Grid,
    ) -> error::Result<()>;

    /// Identifier of the backing store (spreadsheet id, database name, ...).
    fn store_id(&self) -> String;
}

/// One recorded `write_range` call, kept by stores that log their writes.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteCall {
    pub dataset: DatasetId,
    pub start_row: usize,
    pub start_col: usize,
    pub rows: usize,
    pub cols: usize,
}
