//! Extension hooks, built-in extensions and the runtime registry.
//!
//! Extensions are dispatched sequentially in declaration order at each
//! stage of a run. They may veto records at the filter stage and annotate
//! results after a fetch, but they only observe flushed batches.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use gatherer_types::{CellValue, DatasetId, FetchRequest, FetchResponse, Record, RunStatus};

use crate::config::types::GathererConfig;
use crate::errors::PipelineError;
use crate::result::{RunResult, RunSummary};

/// Stage hooks. Every hook has a no-op default.
pub trait Extension: Send + Sync {
    fn name(&self) -> &str;

    /// Called once with every record read from the source.
    fn after_load(&self, _dataset: &DatasetId, _records: &mut Vec<Record>) {}

    /// Filter-stage veto, applied after the run's filters.
    fn retain(&self, _record: &Record) -> bool {
        true
    }

    fn before_fetch(&self, _request: &mut FetchRequest) {}

    /// `response` is `None` when no response was received.
    fn after_fetch(&self, _response: Option<&FetchResponse>, _result: &mut RunResult) {}

    fn on_flush(&self, _dataset: &DatasetId, _batch: &[RunResult]) {}

    fn after_run(&self, _summary: &RunSummary) {}
}

/// Built-in extension identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionKind {
    Timestamp,
    HttpStatus,
    SkipBlankUrl,
    BatchLog,
}

impl ExtensionKind {
    pub const ALL: [Self; 4] = [
        Self::Timestamp,
        Self::HttpStatus,
        Self::SkipBlankUrl,
        Self::BatchLog,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::HttpStatus => "http-status",
            Self::SkipBlankUrl => "skip-blank-url",
            Self::BatchLog => "batch-log",
        }
    }

    /// Instantiate the built-in for `config`.
    pub fn build(self, config: &GathererConfig) -> Arc<dyn Extension> {
        match self {
            Self::Timestamp => Arc::new(TimestampExtension),
            Self::HttpStatus => Arc::new(HttpStatusExtension),
            Self::SkipBlankUrl => Arc::new(SkipBlankUrlExtension {
                url_property: config.url_property.clone(),
            }),
            Self::BatchLog => Arc::new(BatchLogExtension),
        }
    }
}

impl FromStr for ExtensionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stamps `timestamp` (epoch ms) on every result.
struct TimestampExtension;

impl Extension for TimestampExtension {
    fn name(&self) -> &str {
        ExtensionKind::Timestamp.as_str()
    }

    #[allow(clippy::cast_precision_loss)]
    fn after_fetch(&self, _response: Option<&FetchResponse>, result: &mut RunResult) {
        let now = chrono::Utc::now().timestamp_millis();
        result.record.set("timestamp", CellValue::Number(now as f64));
    }
}

/// Copies the response status code into `statusCode`.
struct HttpStatusExtension;

impl Extension for HttpStatusExtension {
    fn name(&self) -> &str {
        ExtensionKind::HttpStatus.as_str()
    }

    fn after_fetch(&self, response: Option<&FetchResponse>, result: &mut RunResult) {
        if let Some(response) = response {
            result
                .record
                .set("statusCode", CellValue::Number(f64::from(response.status_code)));
        }
    }
}

/// Drops records whose URL property is blank.
struct SkipBlankUrlExtension {
    url_property: String,
}

impl Extension for SkipBlankUrlExtension {
    fn name(&self) -> &str {
        ExtensionKind::SkipBlankUrl.as_str()
    }

    fn retain(&self, record: &Record) -> bool {
        !record.value(&self.url_property).is_blank()
    }
}

/// Logs each flushed batch.
struct BatchLogExtension;

impl Extension for BatchLogExtension {
    fn name(&self) -> &str {
        ExtensionKind::BatchLog.as_str()
    }

    fn on_flush(&self, dataset: &DatasetId, batch: &[RunResult]) {
        let failed = batch.iter().filter(|r| r.status == RunStatus::Error).count();
        tracing::info!(
            dataset = %dataset,
            records = batch.len(),
            failed,
            "Batch flushed"
        );
    }

    fn after_run(&self, summary: &RunSummary) {
        tracing::info!(
            dataset = %summary.dest_dataset_id,
            written = summary.records_written,
            write_calls = summary.write_calls,
            "Run finished"
        );
    }
}

/// Custom extensions registered at runtime, owned by one engine instance.
#[derive(Default)]
pub struct ExtensionRegistry {
    custom: BTreeMap<String, Arc<dyn Extension>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom extension under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] when `id` is a built-in name or is
    /// already registered.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        extension: Arc<dyn Extension>,
    ) -> Result<(), PipelineError> {
        let id = id.into();
        if id.parse::<ExtensionKind>().is_ok() {
            return Err(PipelineError::config(format!(
                "extension id '{id}' is reserved for a built-in"
            )));
        }
        if self.custom.contains_key(&id) {
            return Err(PipelineError::config(format!(
                "extension '{id}' is already registered"
            )));
        }
        self.custom.insert(id, extension);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        id.parse::<ExtensionKind>().is_ok() || self.custom.contains_key(id)
    }

    /// Resolve `ids` in order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] naming every unknown id.
    pub fn resolve(
        &self,
        ids: &[String],
        config: &GathererConfig,
    ) -> Result<Vec<Arc<dyn Extension>>, PipelineError> {
        let mut resolved = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            if let Ok(kind) = id.parse::<ExtensionKind>() {
                resolved.push(kind.build(config));
            } else if let Some(ext) = self.custom.get(id) {
                resolved.push(Arc::clone(ext));
            } else {
                missing.push(id.as_str());
            }
        }
        if !missing.is_empty() {
            return Err(PipelineError::config(format!(
                "unknown extension(s): {}",
                missing.join(", ")
            )));
        }
        Ok(resolved)
    }
}
