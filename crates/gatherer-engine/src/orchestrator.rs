//! Run orchestration: load, filter, fetch, batch and flush.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{FuturesOrdered, StreamExt};
use gatherer_types::{CellValue, FetchError, FetchRequest, FetchResponse, Record, RunStatus};
use tokio_util::sync::CancellationToken;

use crate::config::types::GathererConfig;
use crate::config::validator;
use crate::connector::{Connector, Destination};
use crate::errors::{compute_backoff, PipelineError};
use crate::execution::{ExecutionOptions, RunRequest};
use crate::extension::{Extension, ExtensionRegistry};
use crate::filter::FilterSet;
use crate::resolve::{resolve, Collaborators, Resolved};
use crate::result::{InitReport, RunPhase, RunResult, RunSummary};

/// One engine instance. Runs on the same instance are serialized; use
/// separate instances for parallel work.
pub struct Gatherer {
    config: GathererConfig,
    connector: Arc<dyn Connector>,
    extensions: Vec<Arc<dyn Extension>>,
    run_guard: tokio::sync::Mutex<()>,
}

impl Gatherer {
    /// Validate `config` and resolve built-in capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] when validation or resolution fails.
    pub fn new(config: GathererConfig, collaborators: Collaborators) -> Result<Self, PipelineError> {
        Self::with_registry(config, collaborators, &ExtensionRegistry::new())
    }

    /// Like [`Gatherer::new`], also resolving custom extensions from
    /// `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] when validation or resolution fails.
    pub fn with_registry(
        config: GathererConfig,
        collaborators: Collaborators,
        registry: &ExtensionRegistry,
    ) -> Result<Self, PipelineError> {
        validator::validate_config(&config).map_err(|e| PipelineError::Config(e.to_string()))?;
        let Resolved {
            connector,
            extensions,
        } = resolve(&config, collaborators, registry)?;
        tracing::info!(
            helper = connector.id(),
            extensions = extensions.len(),
            batch_update_buffer = config.batch_update_buffer,
            fetch_concurrency = config.fetch_concurrency,
            "Gatherer constructed"
        );
        Ok(Self {
            config,
            connector,
            extensions,
            run_guard: tokio::sync::Mutex::new(()),
        })
    }

    pub fn config(&self) -> &GathererConfig {
        &self.config
    }

    pub fn connector(&self) -> &dyn Connector {
        self.connector.as_ref()
    }

    /// Set up the environment: ensure triggers, record the init timestamp.
    ///
    /// # Errors
    ///
    /// Returns store or scheduler errors from the connector.
    pub async fn init(&self) -> Result<InitReport, PipelineError> {
        let _guard = self.run_guard.lock().await;
        self.connector.init().await
    }

    /// Run with default options and no cancellation.
    ///
    /// # Errors
    ///
    /// See [`Gatherer::run_with`].
    pub async fn run(&self, request: RunRequest) -> Result<RunSummary, PipelineError> {
        self.run_with(request, &ExecutionOptions::default(), &CancellationToken::new())
            .await
    }

    /// Run `request`. Per-record fetch failures are recorded as `Error`
    /// results; everything returned as `Err` aborted the run.
    ///
    /// On cancellation in-flight fetches finish, nothing new is dispatched,
    /// and a batch below the buffer size is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] or [`PipelineError::SchemaMismatch`]
    /// before anything is written, and [`PipelineError::Write`] (carrying the
    /// count of records already flushed) when the sink rejects a batch.
    pub async fn run_with(
        &self,
        request: RunRequest,
        options: &ExecutionOptions,
        cancel: &CancellationToken,
    ) -> Result<RunSummary, PipelineError> {
        let _guard = self.run_guard.lock().await;
        let start = Instant::now();
        let mut summary = RunSummary::new(
            &request.src_dataset_id,
            &request.dest_dataset_id,
            options.dry_run,
        );
        tracing::info!(
            src = %request.src_dataset_id,
            dest = %request.dest_dataset_id,
            filters = ?request.filters,
            dry_run = options.dry_run,
            "Starting run"
        );

        match self.execute(&request, options, cancel, &mut summary).await {
            Ok(()) => {
                summary.phase = RunPhase::Done;
                summary.duration_secs = start.elapsed().as_secs_f64();
                for ext in &self.extensions {
                    ext.after_run(&summary);
                }
                tracing::info!(
                    dest = %summary.dest_dataset_id,
                    read = summary.records_read,
                    selected = summary.records_selected,
                    retrieved = summary.records_retrieved,
                    failed = summary.records_failed,
                    pending = summary.records_pending,
                    written = summary.records_written,
                    write_calls = summary.write_calls,
                    cancelled = summary.cancelled,
                    duration_secs = summary.duration_secs,
                    "Run complete"
                );
                Ok(summary)
            }
            Err(err) => {
                tracing::error!(
                    phase = %summary.phase,
                    dest = %summary.dest_dataset_id,
                    flushed = summary.records_written,
                    "Run failed: {}",
                    err
                );
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        request: &RunRequest,
        options: &ExecutionOptions,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        let src = &request.src_dataset_id;

        summary.phase = RunPhase::Loading;
        let filters = FilterSet::parse(&request.filters)?;
        let loaded = self.connector.load(src).await?;
        let mut records = loaded.records;
        for ext in &self.extensions {
            ext.after_load(src, &mut records);
        }
        summary.records_read = records.len() as u64;

        summary.phase = RunPhase::Filtering;
        filters.check_properties(&loaded.header)?;
        let mut selected: Vec<Record> = records
            .into_iter()
            .filter(|r| filters.matches(r) && self.extensions.iter().all(|e| e.retain(r)))
            .collect();
        if let Some(limit) = options.limit {
            selected.truncate(limit);
        }
        summary.records_selected = selected.len() as u64;
        tracing::info!(
            dataset = %src,
            read = summary.records_read,
            selected = summary.records_selected,
            "Records selected"
        );

        let mut destination = self.connector.open_destination(&request.dest_dataset_id).await?;
        let env = self.connector.env_vars().await?;
        let batch_size = self.config.batch_update_buffer.max(1);

        for (batch, chunk) in selected.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            summary.phase = RunPhase::Fetching;
            let results = self.fetch_chunk(chunk, &env, cancel).await;
            for result in &results {
                match result.status {
                    RunStatus::Retrieved => summary.records_retrieved += 1,
                    RunStatus::Error => summary.records_failed += 1,
                    RunStatus::Pending => summary.records_pending += 1,
                }
            }

            summary.phase = RunPhase::Batching;
            if cancel.is_cancelled() && results.len() < batch_size {
                summary.cancelled = true;
                summary.records_discarded += results.len() as u64;
                tracing::warn!(
                    dataset = %request.dest_dataset_id,
                    batch,
                    discarded = results.len(),
                    "Run cancelled, discarding partial batch"
                );
                break;
            }

            summary.phase = RunPhase::Flushing;
            self.flush(&mut destination, &results, options, summary)
                .await?;
            tracing::debug!(dataset = %request.dest_dataset_id, batch, records = results.len(), "Batch done");

            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
        }
        Ok(())
    }

    /// Fetch `chunk` with bounded concurrency. Results come back in source
    /// order. Stops dispatching on cancellation but drains in-flight work.
    async fn fetch_chunk(
        &self,
        chunk: &[Record],
        env: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> Vec<RunResult> {
        let concurrency = self.config.fetch_concurrency.max(1);
        let mut queue = chunk.iter();
        let mut pending = FuturesOrdered::new();
        let mut results = Vec::with_capacity(chunk.len());

        loop {
            while pending.len() < concurrency && !cancel.is_cancelled() {
                let Some(record) = queue.next() else {
                    break;
                };
                pending.push_back(self.process_record(record.clone(), env, cancel));
            }
            match pending.next().await {
                Some(result) => results.push(result),
                None => break,
            }
        }
        results
    }

    async fn process_record(
        &self,
        record: Record,
        env: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> RunResult {
        let status_property = self.config.status_property.as_str();
        let error_property = self.config.error_property.as_str();

        let url = record.value(&self.config.url_property);
        if url.is_blank() {
            let err = FetchError::data(
                "MISSING_URL",
                format!("record has no '{}' value", self.config.url_property),
            );
            let mut result = RunResult::failed(record, err, status_property, error_property, 0);
            for ext in &self.extensions {
                ext.after_fetch(None, &mut result);
            }
            return result;
        }

        let mut request = FetchRequest::get(url.to_string());
        request.env = env.clone();
        request.record = record.clone();
        for ext in &self.extensions {
            ext.before_fetch(&mut request);
        }

        let mut attempt = 0u32;
        let (response, outcome) = loop {
            attempt += 1;
            let (response, error) = match self.connector.fetch(&request).await {
                Ok(resp) if resp.is_success() => break (Some(resp), Ok(())),
                Ok(resp) => {
                    let err = FetchError::from_status(resp.status_code, &resp.body);
                    (Some(resp), err)
                }
                Err(err) => (None, err),
            };

            let retry = error.retryable && attempt <= self.config.fetch_retries;
            if retry && !cancel.is_cancelled() {
                let delay = compute_backoff(&error, attempt);
                #[allow(clippy::cast_possible_truncation)]
                let delay_ms = delay.as_millis() as u64;
                tracing::warn!(
                    url = %request.url,
                    attempt,
                    max_retries = self.config.fetch_retries,
                    delay_ms,
                    category = %error.category,
                    code = %error.code,
                    "Retryable fetch error, will retry"
                );
                let cancelled = tokio::select! {
                    () = tokio::time::sleep(delay) => false,
                    () = cancel.cancelled() => true,
                };
                if !cancelled {
                    continue;
                }
            }
            break (response, Err((error, retry)));
        };

        let mut result = match outcome {
            Ok(()) => {
                let mut record = record;
                if let Some(ref resp) = response {
                    apply_derived_fields(&mut record, resp);
                }
                RunResult::retrieved(record, status_property, error_property, attempt)
            }
            Err((err, true)) => {
                tracing::warn!(
                    url = %request.url,
                    attempts = attempt,
                    code = %err.code,
                    "Retry interrupted by cancellation, leaving record pending"
                );
                RunResult::pending(record, err, status_property, error_property, attempt)
            }
            Err((err, false)) => {
                tracing::warn!(
                    url = %request.url,
                    attempts = attempt,
                    category = %err.category,
                    code = %err.code,
                    "Fetch failed, recording error result"
                );
                RunResult::failed(record, err, status_property, error_property, attempt)
            }
        };
        for ext in &self.extensions {
            ext.after_fetch(response.as_ref(), &mut result);
        }
        result
    }

    async fn flush(
        &self,
        destination: &mut Destination,
        results: &[RunResult],
        options: &ExecutionOptions,
        summary: &mut RunSummary,
    ) -> Result<(), PipelineError> {
        if results.is_empty() {
            return Ok(());
        }
        if options.dry_run {
            tracing::info!(
                dataset = %destination.dataset,
                records = results.len(),
                "Dry run, skipping write"
            );
            return Ok(());
        }

        let records: Vec<Record> = results.iter().map(|r| r.record.clone()).collect();
        match self.connector.write_batch(destination, &records).await {
            Ok(()) => {}
            Err(PipelineError::Store(source)) => {
                return Err(PipelineError::Write {
                    dataset: destination.dataset.to_string(),
                    flushed: summary.records_written,
                    source,
                });
            }
            Err(e) => return Err(e),
        }
        summary.records_written += records.len() as u64;
        summary.write_calls += 1;

        for ext in &self.extensions {
            ext.on_flush(&destination.dataset, results);
        }
        Ok(())
    }
}

/// Copy scalar fields of the response body onto the record. Fields come
/// from the body's `data` object when present, else from the top level.
fn apply_derived_fields(record: &mut Record, response: &FetchResponse) {
    let body = match response.json() {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!(error = %e, "Response body is not JSON, no derived fields");
            return;
        }
    };
    let fields = match body.get("data") {
        Some(serde_json::Value::Object(map)) => map,
        _ => match body {
            serde_json::Value::Object(ref map) => map,
            _ => return,
        },
    };
    for (name, value) in fields {
        if let Some(cell) = CellValue::from_json(value) {
            record.set(name.as_str(), cell);
        }
    }
}
