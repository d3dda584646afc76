//! Shared fixtures for engine integration tests: an in-memory workbook laid
//! out like a gatherer spreadsheet and scripted fetch capabilities.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gatherer_engine::config::parser;
use gatherer_engine::config::types::GathererConfig;
use gatherer_engine::{ApiHandler, Collaborators};
use gatherer_state::{MemoryScheduler, MemoryStore, StoreError, TabularStore};
use gatherer_types::{CellValue, DatasetId, FetchError, FetchRequest, FetchResponse, Grid};
use tokio_util::sync::CancellationToken;

pub fn fixture_path(relative: &str) -> PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("tests/fixtures")
        .join(relative)
}

pub fn config() -> GathererConfig {
    parser::parse_config(&fixture_path("configs/tabular_bundle.yaml")).expect("fixture parses")
}

pub fn ds(name: &str) -> DatasetId {
    DatasetId::new(name)
}

pub fn text_row(values: &[&str]) -> Vec<CellValue> {
    values.iter().map(|v| CellValue::from(*v)).collect()
}

/// Source dataset: title row, header row, description row, then data.
pub fn sources_grid(rows: &[(bool, &str)]) -> Grid {
    let mut grid = vec![
        text_row(&["Sources"]),
        text_row(&["selected", "id", "label", "url"]),
        text_row(&["", "", "Shown in results", "Page to retrieve"]),
    ];
    for (i, (selected, url)) in rows.iter().enumerate() {
        let id = i64::try_from(i + 1).unwrap();
        grid.push(vec![
            CellValue::Bool(*selected),
            CellValue::from(id),
            CellValue::from(format!("Label {}", i + 1)),
            CellValue::from(*url),
        ]);
    }
    grid
}

/// `n` selected sources with urls `site-1.dev` .. `site-n.dev`.
pub fn selected_sources(n: usize) -> Grid {
    let urls: Vec<String> = (1..=n).map(|i| format!("site-{i}.dev")).collect();
    let rows: Vec<(bool, &str)> = urls.iter().map(|u| (true, u.as_str())).collect();
    sources_grid(&rows)
}

/// Destination dataset with its three header rows and no data.
pub fn results_grid() -> Grid {
    vec![
        text_row(&["Results"]),
        text_row(&["selected", "id", "label", "status", "url"]),
        text_row(&["", "", "", "Retrieved or Error", ""]),
    ]
}

pub fn settings_grid() -> Grid {
    vec![
        text_row(&["Name", "key", "value"]),
        text_row(&["API key", "apiKey", "k-123"]),
    ]
}

pub fn system_grid() -> Grid {
    vec![
        text_row(&["Name", "key", "value"]),
        text_row(&["Retrieve Trigger ID", "RETRIEVE_TRIGGER_ID", ""]),
    ]
}

pub fn store(sources_1: Grid, sources_2: Grid) -> Arc<MemoryStore> {
    Arc::new(
        MemoryStore::new("test-workbook")
            .with_dataset("Sources-1", sources_1)
            .with_dataset("Sources-2", sources_2)
            .with_dataset("Results-1", results_grid())
            .with_dataset("Results-2", results_grid())
            .with_dataset("Settings", settings_grid())
            .with_dataset("System", system_grid()),
    )
}

pub fn collaborators(
    store: Arc<dyn TabularStore>,
    scheduler: Arc<MemoryScheduler>,
    api: Arc<dyn ApiHandler>,
) -> Collaborators {
    Collaborators {
        store,
        scheduler,
        api,
    }
}

/// Cell text of column `col` for every data row of `grid`.
pub fn column(grid: &Grid, col: usize) -> Vec<String> {
    grid.iter()
        .skip(3)
        .map(|row| row.get(col).map(ToString::to_string).unwrap_or_default())
        .collect()
}

/// Echoes the requested url back as `{"data": {"url": ...}}`.
///
/// Tracks call counts and peak concurrency. Urls listed in `failing`
/// answer 500. Later ids respond faster so completion order differs from
/// dispatch order.
#[derive(Default)]
pub struct EchoApi {
    pub failing: Vec<String>,
    pub cancel_after: Option<(usize, CancellationToken)>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: Mutex<Vec<FetchRequest>>,
}

impl EchoApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(urls: &[&str]) -> Self {
        Self {
            failing: urls.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    /// Cancel `token` while serving call number `n`.
    pub fn cancelling(n: usize, token: CancellationToken) -> Self {
        Self {
            cancel_after: Some((n, token)),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApiHandler for EchoApi {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some((n, ref token)) = self.cancel_after {
            if call == n {
                token.cancel();
            }
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let id = request.record.value("id").as_f64().unwrap_or(0.0) as u64;
        tokio::time::sleep(Duration::from_millis(2 + (12 - id % 12) * 2)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.iter().any(|u| *u == request.url) {
            return Ok(FetchResponse::new(500, "upstream exploded"));
        }
        let body = serde_json::json!({ "data": { "url": request.url } });
        Ok(FetchResponse::new(200, body.to_string()))
    }
}

/// Throttles the first attempt for every url, then succeeds.
#[derive(Default)]
pub struct FlakyApi {
    attempts: Mutex<HashMap<String, usize>>,
}

impl FlakyApi {
    pub fn attempts(&self, url: &str) -> usize {
        self.attempts.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ApiHandler for FlakyApi {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let entry = attempts.entry(request.url.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        if attempt == 1 {
            return Err(FetchError::rate_limit("THROTTLED", "slow down", Some(5)));
        }
        Ok(FetchResponse::new(200, "{}"))
    }
}

/// Store wrapper that rejects the `reject_on`-th write to `dataset`.
pub struct RejectingStore {
    pub inner: Arc<MemoryStore>,
    pub dataset: DatasetId,
    pub reject_on: usize,
    writes: AtomicUsize,
}

impl RejectingStore {
    pub fn new(inner: Arc<MemoryStore>, dataset: &str, reject_on: usize) -> Self {
        Self {
            inner,
            dataset: DatasetId::new(dataset),
            reject_on,
            writes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TabularStore for RejectingStore {
    async fn read_range(&self, dataset: &DatasetId) -> Result<Grid, StoreError> {
        self.inner.read_range(dataset).await
    }

    async fn write_range(
        &self,
        dataset: &DatasetId,
        start_row: usize,
        start_col: usize,
        values: Grid,
    ) -> Result<(), StoreError> {
        if *dataset == self.dataset {
            let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.reject_on {
                return Err(StoreError::Rejected {
                    dataset: dataset.to_string(),
                    message: "write quota exceeded".into(),
                });
            }
        }
        self.inner.write_range(dataset, start_row, start_col, values).await
    }

    fn store_id(&self) -> String {
        self.inner.store_id()
    }
}

/// Ordered log shared by a store and an API handler.
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Echo handler that records `fetch <url>` in a shared log.
pub struct LoggingApi {
    pub events: EventLog,
}

#[async_trait]
impl ApiHandler for LoggingApi {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        self.events
            .lock()
            .unwrap()
            .push(format!("fetch {}", request.url));
        tokio::time::sleep(Duration::from_millis(1)).await;
        let body = serde_json::json!({ "data": { "url": request.url } });
        Ok(FetchResponse::new(200, body.to_string()))
    }
}

/// Store wrapper whose writes take `delay` and are logged as
/// `write-start N` / `write-end N`.
pub struct SlowStore {
    pub inner: Arc<MemoryStore>,
    pub events: EventLog,
    pub delay: Duration,
    writes: AtomicUsize,
}

impl SlowStore {
    pub fn new(inner: Arc<MemoryStore>, events: EventLog, delay: Duration) -> Self {
        Self {
            inner,
            events,
            delay,
            writes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TabularStore for SlowStore {
    async fn read_range(&self, dataset: &DatasetId) -> Result<Grid, StoreError> {
        self.inner.read_range(dataset).await
    }

    async fn write_range(
        &self,
        dataset: &DatasetId,
        start_row: usize,
        start_col: usize,
        values: Grid,
    ) -> Result<(), StoreError> {
        let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        self.events.lock().unwrap().push(format!("write-start {n}"));
        tokio::time::sleep(self.delay).await;
        let result = self.inner.write_range(dataset, start_row, start_col, values).await;
        self.events.lock().unwrap().push(format!("write-end {n}"));
        result
    }

    fn store_id(&self) -> String {
        self.inner.store_id()
    }
}

/// Never answers for urls in `hanging`; echoes everything else.
pub struct HangingApi {
    pub hanging: Vec<String>,
}

#[async_trait]
impl ApiHandler for HangingApi {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        if self.hanging.iter().any(|u| *u == request.url) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        let body = serde_json::json!({ "data": { "url": request.url } });
        Ok(FetchResponse::new(200, body.to_string()))
    }
}

/// Always throttles with a long `retry_after`. Cancels `token` while
/// serving call number `cancel_on`.
pub struct ThrottledApi {
    pub token: CancellationToken,
    pub cancel_on: usize,
    calls: AtomicUsize,
}

impl ThrottledApi {
    pub fn new(token: CancellationToken, cancel_on: usize) -> Self {
        Self {
            token,
            cancel_on,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApiHandler for ThrottledApi {
    async fn fetch(&self, _request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.cancel_on {
            self.token.cancel();
        }
        Err(FetchError::rate_limit("THROTTLED", "slow down", Some(10_000)))
    }
}
