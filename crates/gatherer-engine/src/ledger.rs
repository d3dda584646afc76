//! Trigger and init-timestamp bookkeeping in the system dataset.
//!
//! Each ledger key is a property of the system dataset's header; its value
//! sits in the first record slot. Keys missing from the header are appended
//! after its last property. The ledger reads cells directly instead of via
//! `to_records` because a fresh ledger record is blank.

use std::sync::Arc;

use gatherer_state::{StoreError, TabularStore, TriggerScheduler};
use gatherer_types::{CellValue, DatasetConfig, DatasetId, Grid, TriggerId};

use crate::errors::PipelineError;
use crate::result::TriggerEntry;
use crate::schema::{strategy, Header};

/// Ledger key of the last-init timestamp (epoch ms).
pub const LAST_INIT_TIMESTAMP: &str = "lastInitTimestamp";

/// A trigger the ledger keeps alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerSpec {
    /// Entry point invoked when the trigger fires.
    pub handler: &'static str,
    /// Ledger key storing the trigger id.
    pub key: &'static str,
    /// Schedule passed to the scheduler.
    pub schedule: &'static str,
}

pub const TRIGGERS: [TriggerSpec; 2] = [
    TriggerSpec {
        handler: "submitRecurringSources",
        key: "RETRIEVE_TRIGGER_ID",
        schedule: "recurring",
    },
    TriggerSpec {
        handler: "onEditFunc",
        key: "ONEDIT_TRIGGER_ID",
        schedule: "on_edit",
    },
];

fn trigger_spec(name: &str) -> Result<&'static TriggerSpec, PipelineError> {
    TRIGGERS
        .iter()
        .find(|t| t.handler == name || t.key == name)
        .ok_or_else(|| PipelineError::config(format!("unknown trigger '{name}'")))
}

/// Reads and mutates ledger entries. Only `init()` drives it.
pub struct TriggerLedger {
    store: Arc<dyn TabularStore>,
    scheduler: Arc<dyn TriggerScheduler>,
    dataset: DatasetId,
    config: DatasetConfig,
}

impl TriggerLedger {
    pub fn new(
        store: Arc<dyn TabularStore>,
        scheduler: Arc<dyn TriggerScheduler>,
        dataset: DatasetId,
        config: DatasetConfig,
    ) -> Self {
        Self {
            store,
            scheduler,
            dataset,
            config,
        }
    }

    async fn snapshot(&self) -> Result<(Grid, Header), PipelineError> {
        let grid = self.store.read_range(&self.dataset).await?;
        let header = Header::scan(&self.dataset, &grid, &self.config)?;
        Ok((grid, header))
    }

    fn value_line(&self) -> usize {
        strategy(self.config.data_axis).line_skip(&self.config)
    }

    /// Current value of `key`, blank values read as `None`.
    ///
    /// # Errors
    ///
    /// Returns store errors and header configuration errors.
    pub async fn get(&self, key: &str) -> Result<Option<CellValue>, PipelineError> {
        let (grid, header) = self.snapshot().await?;
        Ok(header.position_of(key).and_then(|pos| {
            let cell = strategy(self.config.data_axis).value(&grid, self.value_line(), pos);
            (!cell.is_blank()).then(|| cell.clone())
        }))
    }

    /// Write `value` under `key`, adding `key` to the header if missing.
    ///
    /// # Errors
    ///
    /// Returns store errors and header configuration errors.
    pub async fn set(&self, key: &str, value: CellValue) -> Result<(), PipelineError> {
        let (_, header) = self.snapshot().await?;
        let s = strategy(self.config.data_axis);
        let pos = if let Some(pos) = header.position_of(key) {
            pos
        } else {
            let pos = header.next_position(&self.config);
            let lookup = self.config.property_lookup_row.saturating_sub(1);
            let (row, col) = s.cell(lookup, pos);
            self.store
                .write_range(&self.dataset, row + 1, col + 1, vec![vec![CellValue::from(key)]])
                .await?;
            tracing::debug!(dataset = %self.dataset, key, "Added ledger key");
            pos
        };
        let (row, col) = s.cell(self.value_line(), pos);
        self.store
            .write_range(&self.dataset, row + 1, col + 1, vec![vec![value]])
            .await?;
        Ok(())
    }

    /// Stored id of the trigger named by handler or ledger key.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for an unknown trigger name.
    pub async fn get_trigger(&self, name: &str) -> Result<Option<TriggerId>, PipelineError> {
        let spec = trigger_spec(name)?;
        Ok(self
            .get(spec.key)
            .await?
            .map(|cell| TriggerId::new(cell.to_string())))
    }

    /// Reuse stored trigger ids, creating and persisting missing ones.
    ///
    /// # Errors
    ///
    /// Returns store or scheduler errors.
    pub async fn ensure_triggers(&self) -> Result<Vec<TriggerEntry>, PipelineError> {
        let mut entries = Vec::with_capacity(TRIGGERS.len());
        for spec in &TRIGGERS {
            if let Some(id) = self.get_trigger(spec.key).await? {
                tracing::debug!(key = spec.key, trigger = %id, "Reusing trigger");
                entries.push(TriggerEntry {
                    key: spec.key,
                    handler: spec.handler,
                    id,
                    created: false,
                });
                continue;
            }
            let id = self
                .scheduler
                .create_trigger(spec.schedule, spec.handler)
                .await?;
            self.set(spec.key, CellValue::from(id.as_str())).await?;
            tracing::info!(key = spec.key, trigger = %id, "Created trigger");
            entries.push(TriggerEntry {
                key: spec.key,
                handler: spec.handler,
                id,
                created: true,
            });
        }
        Ok(entries)
    }

    /// Delete a trigger and blank its stored id. Returns the removed id.
    ///
    /// # Errors
    ///
    /// Returns store or scheduler errors; a trigger the scheduler no longer
    /// knows is only logged.
    pub async fn clear_trigger(&self, name: &str) -> Result<Option<TriggerId>, PipelineError> {
        let spec = trigger_spec(name)?;
        let Some(id) = self.get_trigger(spec.key).await? else {
            return Ok(None);
        };
        match self.scheduler.delete_trigger(&id).await {
            Ok(()) => {}
            Err(StoreError::TriggerNotFound(_)) => {
                tracing::warn!(key = spec.key, trigger = %id, "Trigger already gone");
            }
            Err(e) => return Err(e.into()),
        }
        self.set(spec.key, CellValue::Empty).await?;
        Ok(Some(id))
    }

    /// Last recorded init timestamp.
    ///
    /// # Errors
    ///
    /// Returns store errors.
    #[allow(clippy::cast_possible_truncation)]
    pub async fn last_init(&self) -> Result<Option<i64>, PipelineError> {
        Ok(self
            .get(LAST_INIT_TIMESTAMP)
            .await?
            .and_then(|cell| cell.as_f64())
            .map(|ms| ms as i64))
    }

    /// Store `timestamp`, bumped so the stored value strictly increases and
    /// stays positive. Returns the stored value.
    ///
    /// # Errors
    ///
    /// Returns store errors.
    #[allow(clippy::cast_precision_loss)]
    pub async fn record_init(&self, timestamp: i64) -> Result<i64, PipelineError> {
        let previous = self.last_init().await?.unwrap_or(0);
        let stored = timestamp.max(previous.saturating_add(1)).max(1);
        self.set(LAST_INIT_TIMESTAMP, CellValue::Number(stored as f64))
            .await?;
        tracing::debug!(timestamp = stored, "Recorded init timestamp");
        Ok(stored)
    }
}
