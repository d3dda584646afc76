//! Run results, summaries and init reports.

use std::fmt;

use gatherer_types::{DatasetId, FetchError, Record, RunStatus, TriggerId};

/// Pipeline phase of a run. `Failed` is reachable from any other phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Loading,
    Filtering,
    Fetching,
    Batching,
    Flushing,
    Done,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Loading => "loading",
            Self::Filtering => "filtering",
            Self::Fetching => "fetching",
            Self::Batching => "batching",
            Self::Flushing => "flushing",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

/// One source record after the fetch stage.
///
/// `record` is what gets written: the source properties plus the status
/// property, the error property and any derived fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub record: Record,
    pub status: RunStatus,
    pub error: Option<FetchError>,
    pub attempts: u32,
}

impl RunResult {
    pub(crate) fn retrieved(
        mut record: Record,
        status_property: &str,
        error_property: &str,
        attempts: u32,
    ) -> Self {
        record.set(status_property, RunStatus::Retrieved.as_str());
        if record.contains(error_property) {
            record.set(error_property, "");
        }
        Self {
            record,
            status: RunStatus::Retrieved,
            error: None,
            attempts,
        }
    }

    pub(crate) fn failed(
        mut record: Record,
        error: FetchError,
        status_property: &str,
        error_property: &str,
        attempts: u32,
    ) -> Self {
        record.set(status_property, RunStatus::Error.as_str());
        record.set(error_property, error.to_string());
        Self {
            record,
            status: RunStatus::Error,
            error: Some(error),
            attempts,
        }
    }

    /// A record whose retry was cut short. The error property stays empty
    /// so the next run picks it up again.
    pub(crate) fn pending(
        mut record: Record,
        error: FetchError,
        status_property: &str,
        error_property: &str,
        attempts: u32,
    ) -> Self {
        record.set(status_property, RunStatus::Pending.as_str());
        if record.contains(error_property) {
            record.set(error_property, "");
        }
        Self {
            record,
            status: RunStatus::Pending,
            error: Some(error),
            attempts,
        }
    }

    pub fn is_retrieved(&self) -> bool {
        self.status == RunStatus::Retrieved
    }
}

/// Outcome of a completed (or cancelled) run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub src_dataset_id: DatasetId,
    pub dest_dataset_id: DatasetId,
    pub records_read: u64,
    pub records_selected: u64,
    pub records_retrieved: u64,
    pub records_failed: u64,
    pub records_pending: u64,
    pub records_written: u64,
    pub records_discarded: u64,
    pub write_calls: u64,
    pub dry_run: bool,
    pub cancelled: bool,
    pub phase: RunPhase,
    pub duration_secs: f64,
}

impl RunSummary {
    pub(crate) fn new(src: &DatasetId, dest: &DatasetId, dry_run: bool) -> Self {
        Self {
            src_dataset_id: src.clone(),
            dest_dataset_id: dest.clone(),
            records_read: 0,
            records_selected: 0,
            records_retrieved: 0,
            records_failed: 0,
            records_pending: 0,
            records_written: 0,
            records_discarded: 0,
            write_calls: 0,
            dry_run,
            cancelled: false,
            phase: RunPhase::Loading,
            duration_secs: 0.0,
        }
    }
}

/// A ledger trigger after `ensure_triggers`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEntry {
    pub key: &'static str,
    pub handler: &'static str,
    pub id: TriggerId,
    /// False when an existing id was reused.
    pub created: bool,
}

/// Result of `init()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub triggers: Vec<TriggerEntry>,
    /// Stored last-init timestamp in epoch milliseconds.
    pub init_timestamp: i64,
}
