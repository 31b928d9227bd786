use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use chrono::NaiveDate;
use factstore::{
    config::StoreConfig,
    errors::StorageError,
    facts::{Literal, Object},
    fetch::Fetcher,
    gateway::{MemoryGraphStore, OperationKind},
    models::ApplyMode,
    sync::DataSynchronizer,
    vocab::Predicate,
    FactStore,
};
use nvdfetcher::{
    error::{FeedError, Result},
    mapper,
    models::NvdPage,
    window_requests, DateWindow, NvdFetcher, NvdService, RetryPolicy,
};
use serde_json::{json, Value};
use tempfile::TempDir;

fn vulnerability(id: &str, criteria: &str) -> Value {
    json!({
        "cve": {
            "id": id,
            "published": "2024-01-10T10:15:00.000",
            "descriptions": [{ "lang": "en", "value": format!("{id} description") }],
            "metrics": {
                "cvssMetricV31": [{
                    "cvssData": { "version": "3.1", "baseScore": 5.5, "baseSeverity": "MEDIUM",
                                  "vectorString": "CVSS:3.1/AV:L/AC:L/PR:L/UI:N/S:U/C:N/I:N/A:H" }
                }]
            },
            "references": [{ "url": format!("https://example.org/{id}"), "source": "cve@mitre.org" }],
            "configurations": [{ "nodes": [{ "cpeMatch": [{ "criteria": criteria }] }] }]
        }
    })
}

/// Serves a fixed list of vulnerabilities, paged by the requested size.
struct MockNvdService {
    vulnerabilities: Vec<Value>,
    failures_before_success: AtomicU32,
    permanent_status: Option<u16>,
    calls: Mutex<Vec<(String, usize, usize)>>,
}

impl MockNvdService {
    fn new(vulnerabilities: Vec<Value>) -> Self {
        Self {
            vulnerabilities,
            failures_before_success: AtomicU32::new(0),
            permanent_status: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing_first(self, failures: u32) -> Self {
        self.failures_before_success.store(failures, Ordering::SeqCst);
        self
    }

    fn always_status(mut self, status: u16) -> Self {
        self.permanent_status = Some(status);
        self
    }

    fn calls(&self) -> Vec<(String, usize, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NvdService for MockNvdService {
    async fn fetch_page(
        &self,
        window: &DateWindow,
        start_index: usize,
        results_per_page: usize,
    ) -> Result<NvdPage> {
        self.calls
            .lock()
            .unwrap()
            .push((window.key(), start_index, results_per_page));

        if let Some(status) = self.permanent_status {
            return Err(FeedError::ApiError {
                status,
                body: "unavailable".into(),
            });
        }
        let remaining = self.failures_before_success.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_before_success.store(remaining - 1, Ordering::SeqCst);
            return Err(FeedError::RateLimited { retry_after: None });
        }

        let page: Vec<Value> = self
            .vulnerabilities
            .iter()
            .skip(start_index)
            .take(results_per_page)
            .cloned()
            .collect();
        Ok(serde_json::from_value(json!({
            "resultsPerPage": results_per_page,
            "startIndex": start_index,
            "totalResults": self.vulnerabilities.len(),
            "vulnerabilities": page
        }))?)
    }
}

fn mixed_feed() -> Vec<Value> {
    vec![
        vulnerability("CVE-2024-0001", "cpe:2.3:o:debian:debian_linux:12.0:*:*:*:*:*:*:*"),
        vulnerability("CVE-2024-0002", "cpe:2.3:o:microsoft:windows_10:-:*:*:*:*:*:*:*"),
        vulnerability("CVE-2024-0003", "cpe:2.3:a:openssl:openssl:3.0.2:*:*:*:*:*:*:*"),
        vulnerability("CVE-2024-0004", "cpe:2.3:o:linux:linux_kernel:6.1:*:*:*:*:*:*:*"),
        vulnerability("CVE-2024-0005", "cpe:2.3:a:acme:driver:1.0:*:*:*:*:*:linux_kernel:*"),
    ]
}

fn params(linux_only: bool) -> Value {
    json!({
        "start": "2024-01-01T00:00:00",
        "end": "2024-01-31T23:59:59",
        "linux_only": linux_only,
        "results_per_page": 2
    })
}

#[tokio::test]
async fn pages_until_total_results_are_read() {
    let service = Arc::new(MockNvdService::new(mixed_feed()));
    let fetcher = NvdFetcher::new(service.clone(), RetryPolicy::no_delay(3));

    let response = fetcher.fetch(params(false)).await.unwrap();

    assert_eq!(response.units.len(), 5);
    assert_eq!(response.skipped, 0);
    assert_eq!(
        response.checkpoint.as_deref(),
        Some("2024-01-01T00:00:00..2024-01-31T23:59:59")
    );
    assert!(response.units.iter().all(|u| u.mode == ApplyMode::InsertOnly));
    assert!(response.units.iter().all(|u| u.batch.retract.is_empty()));

    let starts: Vec<usize> = service.calls().iter().map(|(_, start, _)| *start).collect();
    assert_eq!(starts, vec![0, 2, 4]);
}

#[tokio::test]
async fn linux_filter_counts_dropped_records_as_skipped() {
    let service = Arc::new(MockNvdService::new(mixed_feed()));
    let fetcher = NvdFetcher::new(service, RetryPolicy::no_delay(3));

    let response = fetcher.fetch(params(true)).await.unwrap();

    let labels: Vec<&str> = response.units.iter().map(|u| u.label.as_str()).collect();
    assert_eq!(labels, vec!["CVE-2024-0001", "CVE-2024-0004", "CVE-2024-0005"]);
    assert_eq!(response.skipped, 2);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let service = Arc::new(MockNvdService::new(mixed_feed()).failing_first(2));
    let fetcher = NvdFetcher::new(service.clone(), RetryPolicy::no_delay(3));

    let response = fetcher.fetch(params(false)).await.unwrap();
    assert_eq!(response.units.len(), 5);
    // Two failed attempts on the first page plus three successful pages.
    assert_eq!(service.calls().len(), 5);
}

#[tokio::test]
async fn exhausted_retries_fail_the_window() {
    let service = Arc::new(MockNvdService::new(mixed_feed()).always_status(503));
    let fetcher = NvdFetcher::new(service.clone(), RetryPolicy::no_delay(3));

    let err = fetcher.fetch(params(false)).await.unwrap_err();
    match err {
        StorageError::SourceUnavailable(message) => {
            assert!(message.contains("after 3 attempts"), "{message}");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(service.calls().len(), 3);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let service = Arc::new(MockNvdService::new(mixed_feed()).always_status(404));
    let fetcher = NvdFetcher::new(service.clone(), RetryPolicy::no_delay(3));

    assert!(fetcher.fetch(params(false)).await.is_err());
    assert_eq!(service.calls().len(), 1);
}

#[tokio::test]
async fn oversized_window_is_invalid() {
    let fetcher = NvdFetcher::new(Arc::new(MockNvdService::new(Vec::new())), RetryPolicy::no_delay(1));
    let err = fetcher
        .fetch(json!({ "start": "2024-01-01T00:00:00", "end": "2024-12-31T00:00:00" }))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidArg(_)));
}

#[tokio::test]
async fn windows_are_checkpointed_and_skipped_on_rerun() {
    let dir = TempDir::new().unwrap();
    let graph = Arc::new(MemoryGraphStore::new());
    let mut store = FactStore::with_graph(StoreConfig::new(dir.path()), graph.clone())
        .await
        .unwrap();
    let service = Arc::new(MockNvdService::new(mixed_feed()));
    store.synchronizer.register_fetcher(Arc::new(
        NvdFetcher::new(service.clone(), RetryPolicy::no_delay(3)).with_results_per_page(10),
    ));

    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let windows = window_requests(start, end, true);
    assert_eq!(windows.len(), 2);

    let summary = store
        .synchronizer
        .sync_windows("nvdfetcher", windows.clone())
        .await
        .unwrap();
    // The mock serves the same records for every window.
    assert_eq!(summary.processed, 6);
    assert_eq!(summary.skipped, 4);
    assert_eq!(summary.failed, 0);
    assert_eq!(store.catalog.completed_windows("nvdfetcher").unwrap().len(), 2);

    // Vulnerability facts are inserted without any ASK or DELETE.
    assert!(graph
        .operations()
        .iter()
        .all(|op| op.kind == OperationKind::Insert));

    let cve = mapper::cve_node("CVE-2024-0001");
    assert_eq!(
        graph.objects(&cve, Predicate::BaseScore),
        vec![Object::Literal(Literal::Decimal(5.5))]
    );

    let calls_before = service.calls().len();
    let rerun = store
        .synchronizer
        .sync_windows("nvdfetcher", windows)
        .await
        .unwrap();
    assert_eq!(rerun.processed, 0);
    assert_eq!(service.calls().len(), calls_before);
}
