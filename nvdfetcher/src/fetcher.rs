use async_trait::async_trait;
use factstore::{
    errors::{Result as StorageResult, StorageError},
    fetch::{FetchResponse, Fetcher, FetcherCapability},
    interval::IntervalRegistry,
    models::{ApplyMode, FactUnit},
    vocab::Class,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    client::{NvdService, RetryPolicy, MAX_RESULTS_PER_PAGE},
    error::FeedError,
    mapper,
    models::CveRecord,
    params::FeedParams,
    window::DateWindow,
};

/// Pages through one publication window of the CVE feed.
pub struct NvdFetcher {
    service: Arc<dyn NvdService>,
    retry: RetryPolicy,
    results_per_page: usize,
}

impl NvdFetcher {
    pub fn new(service: Arc<dyn NvdService>, retry: RetryPolicy) -> Self {
        Self {
            service,
            retry,
            results_per_page: MAX_RESULTS_PER_PAGE,
        }
    }

    pub fn with_results_per_page(mut self, results_per_page: usize) -> Self {
        self.results_per_page = results_per_page.clamp(1, MAX_RESULTS_PER_PAGE);
        self
    }

    fn capability_descriptor() -> FetcherCapability {
        FetcherCapability {
            name: "nvdfetcher",
            description: "Derives vulnerability facts from the NVD CVE API for one publication window",
            param_schema: json!({
                "type": "object",
                "required": ["start", "end"],
                "properties": {
                    "start": { "type": "string", "description": "Window start, %Y-%m-%dT%H:%M:%S" },
                    "end": { "type": "string", "description": "Window end, at most 119 days after start" },
                    "linux_only": { "type": "boolean", "default": false },
                    "results_per_page": { "type": "integer", "maximum": MAX_RESULTS_PER_PAGE }
                }
            }),
            produces: vec![
                Class::Cve,
                Class::Reference,
                Class::Vendor,
                Class::Product,
                Class::VersionInterval,
            ],
            apply_mode: ApplyMode::InsertOnly,
            examples: vec![json!({
                "start": "2024-01-01T00:00:00",
                "end": "2024-03-31T23:59:59",
                "linux_only": true
            })],
        }
    }

    fn parse_params(value: serde_json::Value) -> StorageResult<FeedParams> {
        FeedParams::from_value(value)
            .map_err(|err| StorageError::InvalidArg(format!("invalid fetch params: {err}")))
    }

    /// Every record published in `window`, in feed order.
    pub async fn fetch_window(
        &self,
        window: &DateWindow,
        results_per_page: usize,
    ) -> Result<Vec<CveRecord>, FeedError> {
        let mut records = Vec::new();
        let mut start_index = 0;
        loop {
            let page = self
                .retry
                .run(|| self.service.fetch_page(window, start_index, results_per_page))
                .await
                .map_err(|(err, attempts)| FeedError::WindowFetch {
                    window: window.key(),
                    attempts,
                    message: err.to_string(),
                })?;

            let received = page.vulnerabilities.len();
            log::debug!(
                "window {}: page at {} returned {} of {} records",
                window.key(),
                start_index,
                received,
                page.total_results
            );
            records.extend(
                page.vulnerabilities
                    .into_iter()
                    .map(|vulnerability| CveRecord::from(vulnerability.cve)),
            );

            start_index += results_per_page;
            if received == 0 || start_index >= page.total_results {
                break;
            }
        }
        Ok(records)
    }

    pub fn units_from_records(records: &[CveRecord]) -> Vec<FactUnit> {
        records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                let mut intervals = IntervalRegistry::new();
                FactUnit {
                    sequence: index as u64 + 1,
                    label: record.id.clone(),
                    batch: mapper::cve_to_facts(record, &mut intervals),
                    mode: ApplyMode::InsertOnly,
                }
            })
            .collect()
    }
}

#[async_trait]
impl Fetcher for NvdFetcher {
    fn name(&self) -> &'static str {
        "nvdfetcher"
    }

    fn capability(&self) -> FetcherCapability {
        Self::capability_descriptor()
    }

    async fn fetch(&self, params: serde_json::Value) -> StorageResult<FetchResponse> {
        let params = Self::parse_params(params)?;
        let window = params
            .window()
            .map_err(|err| StorageError::InvalidArg(err.to_string()))?;
        let results_per_page = params
            .results_per_page
            .unwrap_or(self.results_per_page)
            .min(MAX_RESULTS_PER_PAGE);

        let records = self
            .fetch_window(&window, results_per_page)
            .await
            .map_err(|err| StorageError::SourceUnavailable(err.to_string()))?;

        let total = records.len();
        let records: Vec<CveRecord> = if params.linux_only {
            records.into_iter().filter(CveRecord::affects_linux).collect()
        } else {
            records
        };
        let skipped = total - records.len();
        log::info!(
            "window {}: {} records, {} kept, {} filtered",
            window.key(),
            total,
            records.len(),
            skipped
        );

        Ok(FetchResponse {
            units: Self::units_from_records(&records),
            skipped,
            checkpoint: Some(window.key()),
        })
    }
}
