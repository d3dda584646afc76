//! End-to-end runs against an in-memory workbook.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::*;
use gatherer_engine::{
    CancellationToken, ExecutionOptions, Extension, ExtensionRegistry, Gatherer, PipelineError,
    RunRequest, RunResult,
};
use gatherer_state::{MemoryScheduler, MemoryStore};
use gatherer_types::{CellValue, DatasetId, FetchResponse, Record};

fn gatherer(store: &Arc<MemoryStore>, api: Arc<EchoApi>) -> Gatherer {
    Gatherer::new(
        config(),
        collaborators(store.clone(), Arc::new(MemoryScheduler::new()), api),
    )
    .unwrap()
}

fn results(store: &MemoryStore, name: &str) -> Vec<Vec<CellValue>> {
    store.dataset(&ds(name)).unwrap().unwrap()
}

#[tokio::test]
async fn selected_sources_land_in_their_own_results() {
    let store = store(
        sources_grid(&[(true, "google.com"), (true, "web.dev"), (false, "example.com")]),
        sources_grid(&[(true, "rust-lang.org")]),
    );
    let api = Arc::new(EchoApi::new());
    let gatherer = gatherer(&store, api.clone());

    let summary = gatherer
        .run(RunRequest::new("Sources-1", "Results-1").with_filter("selected"))
        .await
        .unwrap();

    assert_eq!(summary.records_read, 3);
    assert_eq!(summary.records_selected, 2);
    assert_eq!(summary.records_retrieved, 2);
    assert_eq!(summary.records_written, 2);
    assert_eq!(summary.write_calls, 1);
    assert!(!summary.cancelled);
    assert_eq!(api.calls(), 2);

    let written = results(&store, "Results-1");
    assert_eq!(written.len(), 5);
    assert_eq!(CellValue::at(&written, 3, 3), &CellValue::from("Retrieved"));
    assert_eq!(CellValue::at(&written, 4, 3), &CellValue::from("Retrieved"));
    assert_eq!(CellValue::at(&written, 3, 4), &CellValue::from("google.com"));
    assert_eq!(CellValue::at(&written, 4, 4), &CellValue::from("web.dev"));
    assert_eq!(CellValue::at(&written, 3, 2), &CellValue::from("Label 1"));

    assert_eq!(results(&store, "Results-2"), results_grid());
    assert_eq!(
        results(&store, "Sources-1"),
        sources_grid(&[(true, "google.com"), (true, "web.dev"), (false, "example.com")])
    );
}

#[tokio::test]
async fn env_values_reach_every_request() {
    let store = store(selected_sources(2), selected_sources(0));
    let api = Arc::new(EchoApi::new());
    gatherer(&store, api.clone())
        .run(RunRequest::new("Sources-1", "Results-1"))
        .await
        .unwrap();

    let requests = api.requests();
    assert_eq!(requests.len(), 2);
    for request in requests {
        assert_eq!(request.env.get("apiKey").map(String::as_str), Some("k-123"));
        assert!(request.record.contains("label"));
    }
}

#[tokio::test]
async fn batches_are_bounded_by_the_buffer() {
    let store = store(selected_sources(25), selected_sources(0));
    let summary = gatherer(&store, Arc::new(EchoApi::new()))
        .run(RunRequest::new("Sources-1", "Results-1"))
        .await
        .unwrap();

    assert_eq!(summary.records_written, 25);
    assert_eq!(summary.write_calls, 3);
    let writes = store.writes_to(&ds("Results-1")).unwrap();
    let sizes: Vec<usize> = writes.iter().map(|w| w.rows).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
    let starts: Vec<usize> = writes.iter().map(|w| w.start_row).collect();
    assert_eq!(starts, vec![4, 14, 24]);
}

#[tokio::test]
async fn fetch_failures_become_error_rows() {
    let store = store(selected_sources(5), selected_sources(0));
    let api = Arc::new(EchoApi::failing(&["site-3.dev"]));
    let summary = gatherer(&store, api)
        .run(RunRequest::new("Sources-1", "Results-1"))
        .await
        .unwrap();

    assert_eq!(summary.records_retrieved, 4);
    assert_eq!(summary.records_failed, 1);
    assert_eq!(summary.records_written, 5);
    let statuses = column(&results(&store, "Results-1"), 3);
    assert_eq!(
        statuses,
        vec!["Retrieved", "Retrieved", "Error", "Retrieved", "Retrieved"]
    );
}

#[tokio::test]
async fn concurrent_fetches_keep_source_order() {
    let store = store(selected_sources(12), selected_sources(0));
    let api = Arc::new(EchoApi::new());
    gatherer(&store, api.clone())
        .run(RunRequest::new("Sources-1", "Results-1"))
        .await
        .unwrap();

    assert!(api.max_in_flight() <= 4);
    assert!(api.max_in_flight() > 1);
    let urls = column(&results(&store, "Results-1"), 4);
    let expected: Vec<String> = (1..=12).map(|i| format!("site-{i}.dev")).collect();
    assert_eq!(urls, expected);
}

fn sequential_config() -> gatherer_engine::config::types::GathererConfig {
    let mut config = config();
    config.fetch_concurrency = 1;
    config
}

#[tokio::test]
async fn cancellation_discards_the_partial_batch() {
    let store = store(selected_sources(15), selected_sources(0));
    let cancel = CancellationToken::new();
    let api = Arc::new(EchoApi::cancelling(12, cancel.clone()));
    let gatherer = Gatherer::new(
        sequential_config(),
        collaborators(store.clone(), Arc::new(MemoryScheduler::new()), api.clone()),
    )
    .unwrap();

    let summary = gatherer
        .run_with(
            RunRequest::new("Sources-1", "Results-1"),
            &ExecutionOptions::default(),
            &cancel,
        )
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.records_written, 10);
    assert_eq!(summary.records_discarded, 2);
    assert_eq!(api.calls(), 12);
    assert_eq!(store.writes_to(&ds("Results-1")).unwrap().len(), 1);
    assert_eq!(results(&store, "Results-1").len(), 13);
}

#[tokio::test]
async fn cancellation_still_flushes_a_full_batch() {
    let store = store(selected_sources(15), selected_sources(0));
    let cancel = CancellationToken::new();
    let api = Arc::new(EchoApi::cancelling(10, cancel.clone()));
    let gatherer = Gatherer::new(
        sequential_config(),
        collaborators(store.clone(), Arc::new(MemoryScheduler::new()), api.clone()),
    )
    .unwrap();

    let summary = gatherer
        .run_with(
            RunRequest::new("Sources-1", "Results-1"),
            &ExecutionOptions::default(),
            &cancel,
        )
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.records_written, 10);
    assert_eq!(summary.records_discarded, 0);
    assert_eq!(api.calls(), 10);
}

#[tokio::test]
async fn dry_run_fetches_without_writing() {
    let store = store(selected_sources(3), selected_sources(0));
    let api = Arc::new(EchoApi::new());
    let options = ExecutionOptions {
        dry_run: true,
        limit: None,
    };
    let summary = gatherer(&store, api.clone())
        .run_with(
            RunRequest::new("Sources-1", "Results-1"),
            &options,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(summary.dry_run);
    assert_eq!(summary.records_retrieved, 3);
    assert_eq!(summary.records_written, 0);
    assert_eq!(api.calls(), 3);
    assert!(store.writes().unwrap().is_empty());
}

#[tokio::test]
async fn limit_caps_selected_records() {
    let store = store(selected_sources(8), selected_sources(0));
    let options = ExecutionOptions {
        dry_run: false,
        limit: Some(3),
    };
    let summary = gatherer(&store, Arc::new(EchoApi::new()))
        .run_with(
            RunRequest::new("Sources-1", "Results-1"),
            &options,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.records_read, 8);
    assert_eq!(summary.records_selected, 3);
    assert_eq!(summary.records_written, 3);
}

#[tokio::test]
async fn rejected_write_reports_flushed_records() {
    let inner = store(selected_sources(25), selected_sources(0));
    let rejecting = Arc::new(RejectingStore::new(inner.clone(), "Results-1", 2));
    let gatherer = Gatherer::new(
        config(),
        collaborators(rejecting, Arc::new(MemoryScheduler::new()), Arc::new(EchoApi::new())),
    )
    .unwrap();

    let err = gatherer
        .run(RunRequest::new("Sources-1", "Results-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Write { flushed: 10, .. }));
    assert_eq!(err.flushed_records(), Some(10));
    assert_eq!(results(&inner, "Results-1").len(), 13);
}

#[tokio::test]
async fn missing_destination_header_writes_nothing() {
    let store = store(selected_sources(2), selected_sources(0));
    store
        .insert_dataset("Results-1", vec![text_row(&["Results"])])
        .unwrap();
    let api = Arc::new(EchoApi::new());

    let err = gatherer(&store, api.clone())
        .run(RunRequest::new("Sources-1", "Results-1"))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::SchemaMismatch { ref dataset, .. } if dataset == "Results-1"));
    assert!(store.writes().unwrap().is_empty());
    assert_eq!(api.calls(), 0);
}

#[tokio::test]
async fn unknown_filter_property_is_rejected() {
    let store = store(selected_sources(2), selected_sources(0));
    let api = Arc::new(EchoApi::new());
    let err = gatherer(&store, api.clone())
        .run(RunRequest::new("Sources-1", "Results-1").with_filter("chosen"))
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Config(ref m) if m.contains("chosen")));
    assert_eq!(api.calls(), 0);
}

#[tokio::test]
async fn equality_and_negated_filters_combine() {
    let store = store(
        sources_grid(&[(true, "a.dev"), (false, "b.dev"), (false, "c.dev")]),
        selected_sources(0),
    );
    let summary = gatherer(&store, Arc::new(EchoApi::new()))
        .run(
            RunRequest::new("Sources-1", "Results-1")
                .with_filter("!selected")
                .with_filter("url=c.dev"),
        )
        .await
        .unwrap();

    assert_eq!(summary.records_selected, 1);
    assert_eq!(column(&results(&store, "Results-1"), 4), vec!["c.dev"]);
}

#[tokio::test]
async fn retryable_errors_are_retried() {
    let store = store(selected_sources(3), selected_sources(0));
    let api = Arc::new(FlakyApi::default());
    let mut config = config();
    config.fetch_retries = 1;
    let gatherer = Gatherer::new(
        config,
        collaborators(store.clone(), Arc::new(MemoryScheduler::new()), api.clone()),
    )
    .unwrap();

    let summary = gatherer
        .run(RunRequest::new("Sources-1", "Results-1"))
        .await
        .unwrap();

    assert_eq!(summary.records_retrieved, 3);
    assert_eq!(api.attempts("site-2.dev"), 2);
}

#[tokio::test]
async fn retryable_errors_fail_without_retry_budget() {
    let store = store(selected_sources(2), selected_sources(0));
    let api = Arc::new(FlakyApi::default());
    let gatherer = Gatherer::new(
        config(),
        collaborators(store.clone(), Arc::new(MemoryScheduler::new()), api.clone()),
    )
    .unwrap();

    let summary = gatherer
        .run(RunRequest::new("Sources-1", "Results-1"))
        .await
        .unwrap();

    assert_eq!(summary.records_failed, 2);
    assert_eq!(api.attempts("site-1.dev"), 1);
    assert_eq!(column(&results(&store, "Results-1"), 3), vec!["Error", "Error"]);
}

#[tokio::test]
async fn runs_never_touch_the_ledger() {
    let store = store(selected_sources(3), selected_sources(0));
    let scheduler = Arc::new(MemoryScheduler::new());
    let gatherer = Gatherer::new(
        config(),
        collaborators(store.clone(), scheduler.clone(), Arc::new(EchoApi::new())),
    )
    .unwrap();

    gatherer
        .run(RunRequest::new("Sources-1", "Results-1"))
        .await
        .unwrap();

    assert_eq!(results(&store, "System"), system_grid());
    assert!(scheduler.triggers().unwrap().is_empty());
    assert!(store.writes_to(&ds("System")).unwrap().is_empty());
}

#[tokio::test]
async fn missing_url_is_an_error_row_without_fetch() {
    let store = store(
        sources_grid(&[(true, "a.dev"), (true, ""), (true, "c.dev")]),
        selected_sources(0),
    );
    let api = Arc::new(EchoApi::new());
    let summary = gatherer(&store, api.clone())
        .run(RunRequest::new("Sources-1", "Results-1"))
        .await
        .unwrap();

    assert_eq!(api.calls(), 2);
    assert_eq!(summary.records_failed, 1);
    assert_eq!(
        column(&results(&store, "Results-1"), 3),
        vec!["Retrieved", "Error", "Retrieved"]
    );
}

/// Vetoes id 2, relabels fetched records and counts flushes.
#[derive(Default)]
struct Auditor {
    flushes: AtomicUsize,
    runs: AtomicUsize,
}

impl Extension for Auditor {
    fn name(&self) -> &str {
        "auditor"
    }

    fn retain(&self, record: &Record) -> bool {
        record.value("id") != CellValue::Number(2.0)
    }

    fn after_fetch(&self, response: Option<&FetchResponse>, result: &mut RunResult) {
        if response.is_some_and(FetchResponse::is_success) {
            result.record.set("label", "audited");
        }
    }

    fn on_flush(&self, _dataset: &DatasetId, _batch: &[RunResult]) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }

    fn after_run(&self, _summary: &gatherer_engine::RunSummary) {
        self.runs.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn custom_extension_hooks_run_in_order() {
    let store = store(selected_sources(3), selected_sources(0));
    let auditor = Arc::new(Auditor::default());
    let mut registry = ExtensionRegistry::new();
    registry.register("auditor", auditor.clone()).unwrap();
    let mut config = config();
    config.extensions = vec!["auditor".into(), "batch-log".into()];

    let gatherer = Gatherer::with_registry(
        config,
        collaborators(store.clone(), Arc::new(MemoryScheduler::new()), Arc::new(EchoApi::new())),
        &registry,
    )
    .unwrap();
    let summary = gatherer
        .run(RunRequest::new("Sources-1", "Results-1"))
        .await
        .unwrap();

    assert_eq!(summary.records_selected, 2);
    assert_eq!(auditor.flushes.load(Ordering::SeqCst), 1);
    assert_eq!(auditor.runs.load(Ordering::SeqCst), 1);
    let written = results(&store, "Results-1");
    assert_eq!(column(&written, 2), vec!["audited", "audited"]);
    assert_eq!(column(&written, 4), vec!["site-1.dev", "site-3.dev"]);
}

#[test]
fn unregistered_extension_fails_construction() {
    let store = store(selected_sources(1), selected_sources(0));
    let mut config = config();
    config.extensions = vec!["auditor".into()];
    let result = Gatherer::new(
        config,
        collaborators(store, Arc::new(MemoryScheduler::new()), Arc::new(EchoApi::new())),
    );
    assert!(matches!(result, Err(PipelineError::Config(ref m)) if m.contains("auditor")));
}

#[tokio::test]
async fn sample_workbook_round_trips_through_a_run() {
    let store = Arc::new(
        MemoryStore::load_workbook(&fixture_path("workbooks/sample.json")).unwrap(),
    );
    let summary = gatherer(&store, Arc::new(EchoApi::new()))
        .run(RunRequest::new("Sources-1", "Results-1").with_filter("selected"))
        .await
        .unwrap();
    assert_eq!(summary.records_written, 2);

    let dir = tempfile::tempdir().unwrap();
    let saved = dir.path().join("after.json");
    store.save_workbook(&saved).unwrap();
    let reloaded = MemoryStore::load_workbook(&saved).unwrap();
    let written = reloaded.dataset(&ds("Results-1")).unwrap().unwrap();
    assert_eq!(column(&written, 4), vec!["google.com", "web.dev"]);
    assert_eq!(column(&written, 2), vec!["Google", "Web"]);
}

#[tokio::test]
async fn consecutive_runs_to_different_destinations_stay_apart() {
    let store = store(
        sources_grid(&[(true, "google.com"), (true, "web.dev")]),
        sources_grid(&[(true, "rust-lang.org"), (false, "crates.io"), (true, "docs.rs")]),
    );
    let gatherer = gatherer(&store, Arc::new(EchoApi::new()));

    gatherer
        .run(RunRequest::new("Sources-1", "Results-1").with_filter("selected"))
        .await
        .unwrap();
    gatherer
        .run(RunRequest::new("Sources-2", "Results-2").with_filter("selected"))
        .await
        .unwrap();

    assert_eq!(
        column(&results(&store, "Results-1"), 4),
        vec!["google.com", "web.dev"]
    );
    assert_eq!(
        column(&results(&store, "Results-2"), 4),
        vec!["rust-lang.org", "docs.rs"]
    );
    assert_eq!(store.row_count(&ds("Sources-2")).unwrap(), 6);
}

#[tokio::test]
async fn next_chunk_waits_for_the_previous_write() {
    let events: EventLog = Arc::default();
    let inner = store(selected_sources(25), selected_sources(0));
    let slow = Arc::new(SlowStore::new(
        inner.clone(),
        events.clone(),
        std::time::Duration::from_millis(30),
    ));
    let gatherer = Gatherer::new(
        config(),
        collaborators(
            slow,
            Arc::new(MemoryScheduler::new()),
            Arc::new(LoggingApi {
                events: events.clone(),
            }),
        ),
    )
    .unwrap();

    let summary = gatherer
        .run(RunRequest::new("Sources-1", "Results-1"))
        .await
        .unwrap();
    assert_eq!(summary.write_calls, 3);

    let events = events.lock().unwrap().clone();
    let at = |event: &str| events.iter().position(|e| e == event).unwrap();
    assert!(at("fetch site-11.dev") > at("write-end 1"));
    assert!(at("fetch site-21.dev") > at("write-end 2"));
    assert!(at("write-start 1") > at("fetch site-10.dev"));
    let fetches_before_first_write = events[..at("write-start 1")]
        .iter()
        .filter(|e| e.starts_with("fetch"))
        .count();
    assert_eq!(fetches_before_first_write, 10);
}

#[tokio::test]
async fn fetch_timeout_becomes_an_error_row() {
    let store = store(selected_sources(3), selected_sources(0));
    let mut config = config();
    config.fetch_timeout_ms = Some(50);
    let gatherer = Gatherer::new(
        config,
        collaborators(
            store.clone(),
            Arc::new(MemoryScheduler::new()),
            Arc::new(HangingApi {
                hanging: vec!["site-2.dev".into()],
            }),
        ),
    )
    .unwrap();

    let summary = gatherer
        .run(RunRequest::new("Sources-1", "Results-1"))
        .await
        .unwrap();

    assert_eq!(summary.records_retrieved, 2);
    assert_eq!(summary.records_failed, 1);
    assert_eq!(summary.records_written, 3);
    assert_eq!(
        column(&results(&store, "Results-1"), 3),
        vec!["Retrieved", "Error", "Retrieved"]
    );
}

#[tokio::test]
async fn cancelled_retry_leaves_records_pending() {
    let store = store(selected_sources(2), selected_sources(0));
    let cancel = CancellationToken::new();
    let api = Arc::new(ThrottledApi::new(cancel.clone(), 2));
    let mut config = config();
    config.batch_update_buffer = 2;
    config.fetch_concurrency = 2;
    config.fetch_retries = 3;
    let gatherer = Gatherer::new(
        config,
        collaborators(store.clone(), Arc::new(MemoryScheduler::new()), api.clone()),
    )
    .unwrap();

    let summary = gatherer
        .run_with(
            RunRequest::new("Sources-1", "Results-1"),
            &ExecutionOptions::default(),
            &cancel,
        )
        .await
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(api.calls(), 2);
    assert_eq!(summary.records_pending, 2);
    assert_eq!(summary.records_failed, 0);
    assert_eq!(summary.records_written, 2);
    assert_eq!(
        column(&results(&store, "Results-1"), 3),
        vec!["Pending", "Pending"]
    );
}
