//! In-memory implementation of [`TabularStore`].
//!
//! Uses a single `Mutex` over all datasets so every write is atomic with
//! respect to reads. Can be loaded from and saved to a JSON workbook file.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use gatherer_types::{CellValue, DatasetId, Grid};
use serde::{Deserialize, Serialize};

use crate::backend::{TabularStore, WriteCall};
use crate::error::{self, StoreError};

/// On-disk workbook layout: `{"id": "...", "datasets": {"Sheet": [[...]]}}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Workbook {
    #[serde(default)]
    id: String,
    datasets: BTreeMap<DatasetId, Grid>,
}

/// In-memory grid store with a write log.
pub struct MemoryStore {
    id: String,
    datasets: Mutex<BTreeMap<DatasetId, Grid>>,
    writes: Mutex<Vec<WriteCall>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            datasets: Mutex::new(BTreeMap::new()),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Builder-style dataset registration.
    #[must_use]
    pub fn with_dataset(mut self, dataset: impl Into<DatasetId>, grid: Grid) -> Self {
        self.datasets
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(dataset.into(), grid);
        self
    }

    /// Create or replace a dataset.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if the lock is poisoned.
    pub fn insert_dataset(&self, dataset: impl Into<DatasetId>, grid: Grid) -> error::Result<()> {
        self.lock_datasets()?.insert(dataset.into(), grid);
        Ok(())
    }

    /// Snapshot of a dataset's cells.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if the lock is poisoned.
    pub fn dataset(&self, dataset: &DatasetId) -> error::Result<Option<Grid>> {
        Ok(self.lock_datasets()?.get(dataset).cloned())
    }

    /// Number of rows currently held by `dataset`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatasetNotFound`] for unknown datasets.
    pub fn row_count(&self, dataset: &DatasetId) -> error::Result<usize> {
        self.lock_datasets()?
            .get(dataset)
            .map(Vec::len)
            .ok_or_else(|| StoreError::DatasetNotFound(dataset.to_string()))
    }

    /// Every write call made so far, in order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if the lock is poisoned.
    pub fn writes(&self) -> error::Result<Vec<WriteCall>> {
        Ok(self.lock_writes()?.clone())
    }

    /// Write calls that targeted `dataset`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if the lock is poisoned.
    pub fn writes_to(&self, dataset: &DatasetId) -> error::Result<Vec<WriteCall>> {
        Ok(self
            .lock_writes()?
            .iter()
            .filter(|w| &w.dataset == dataset)
            .cloned()
            .collect())
    }

    /// Load a JSON workbook file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] or [`StoreError::Json`] on read/parse failure.
    pub fn load_workbook(path: &Path) -> error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let workbook: Workbook = serde_json::from_str(&content)?;
        let id = if workbook.id.is_empty() {
            path.display().to_string()
        } else {
            workbook.id
        };
        tracing::debug!(
            path = %path.display(),
            datasets = workbook.datasets.len(),
            "Loaded workbook"
        );
        Ok(Self {
            id,
            datasets: Mutex::new(workbook.datasets),
            writes: Mutex::new(Vec::new()),
        })
    }

    /// Save all datasets to a JSON workbook file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] or [`StoreError::Json`] on failure.
    pub fn save_workbook(&self, path: &Path) -> error::Result<()> {
        let workbook = Workbook {
            id: self.id.clone(),
            datasets: self.lock_datasets()?.clone(),
        };
        let json = serde_json::to_string_pretty(&workbook)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn lock_datasets(&self) -> error::Result<MutexGuard<'_, BTreeMap<DatasetId, Grid>>> {
        self.datasets.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn lock_writes(&self) -> error::Result<MutexGuard<'_, Vec<WriteCall>>> {
        self.writes.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

/// Copy `values` into `grid` at 0-based (`row0`, `col0`), growing the grid
/// with empty cells as needed.
fn paste(grid: &mut Grid, row0: usize, col0: usize, values: &Grid) {
    if grid.len() < row0 + values.len() {
        grid.resize_with(row0 + values.len(), Vec::new);
    }
    for (offset, source_row) in values.iter().enumerate() {
        let target = &mut grid[row0 + offset];
        if target.len() < col0 + source_row.len() {
            target.resize(col0 + source_row.len(), CellValue::Empty);
        }
        for (c, value) in source_row.iter().enumerate() {
            target[col0 + c] = value.clone();
        }
    }
}

#[async_trait]
impl TabularStore for MemoryStore {
    async fn read_range(&self, dataset: &DatasetId) -> error::Result<Grid> {
        self.lock_datasets()?
            .get(dataset)
            .cloned()
            .ok_or_else(|| StoreError::DatasetNotFound(dataset.to_string()))
    }

    async fn write_range(
        &self,
        dataset: &DatasetId,
        start_row: usize,
        start_col: usize,
        values: Grid,
    ) -> error::Result<()> {
        if start_row == 0 || start_col == 0 {
            return Err(StoreError::InvalidRange {
                dataset: dataset.to_string(),
                message: format!("positions are 1-based, got ({start_row}, {start_col})"),
            });
        }

        {
            let mut datasets = self.lock_datasets()?;
            let grid = datasets
                .get_mut(dataset)
                .ok_or_else(|| StoreError::DatasetNotFound(dataset.to_string()))?;
            paste(grid, start_row - 1, start_col - 1, &values);
        }

        self.lock_writes()?.push(WriteCall {
            dataset: dataset.clone(),
            start_row,
            start_col,
            rows: values.len(),
            cols: values.iter().map(Vec::len).max().unwrap_or(0),
        });
        Ok(())
    }

    fn store_id(&self) -> String {
        self.id.clone()
    }
}
