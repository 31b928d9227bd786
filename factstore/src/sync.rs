use crate::catalog::Catalog;
use crate::errors::{Result, StorageError};
use crate::fetch::{FetchResponse, Fetcher, FetcherCapability};
use crate::models::{ApplyMode, RunSummary};
use crate::upsert::UpsertCoordinator;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// One resumable slice of a long ingestion.
#[derive(Debug, Clone)]
pub struct WindowRequest {
    pub key: String,
    pub params: serde_json::Value,
}

/// Defines the core interface for running fetchers into the graph store.
#[async_trait]
pub trait DataSynchronizer {
    /// Registers a concrete fetcher implementation with the synchronizer.
    fn register_fetcher(&mut self, fetcher: Arc<dyn Fetcher>);

    /// Runs one fetch with the named fetcher and applies every unit it returns.
    async fn sync(&self, fetcher_name: &str, params: serde_json::Value) -> Result<RunSummary>;

    /// Runs the named fetcher once per window, skipping checkpointed windows.
    /// A failed window is recorded and the run moves on.
    async fn sync_windows(&self, fetcher_name: &str, windows: Vec<WindowRequest>) -> Result<RunSummary>;
}

pub struct FactSynchronizer {
    catalog: Arc<Catalog>,
    coordinator: Arc<UpsertCoordinator>,
    fetchers: HashMap<&'static str, Arc<dyn Fetcher>>,
}

impl FactSynchronizer {
    pub fn new(catalog: Arc<Catalog>, coordinator: Arc<UpsertCoordinator>) -> Self {
        Self {
            catalog,
            coordinator,
            fetchers: HashMap::new(),
        }
    }

    pub fn list_fetchers(&self) -> Vec<FetcherCapability> {
        let mut capabilities: Vec<_> = self.fetchers.values().map(|f| f.capability()).collect();
        capabilities.sort_by_key(|c| c.name);
        capabilities
    }

    fn fetcher(&self, name: &str) -> Result<&Arc<dyn Fetcher>> {
        self.fetchers
            .get(name)
            .ok_or_else(|| StorageError::Config(format!("Fetcher '{}' not registered.", name)))
    }

    async fn apply_response(&self, source: &str, response: FetchResponse) -> Result<RunSummary> {
        let mut summary = RunSummary {
            skipped: response.skipped,
            ..RunSummary::default()
        };

        for unit in &response.units {
            let outcome = match unit.mode {
                ApplyMode::Upsert => {
                    self.coordinator
                        .apply(unit.sequence, &unit.label, &unit.batch)
                        .await
                }
                ApplyMode::InsertOnly => {
                    self.coordinator
                        .insert_only(unit.sequence, &unit.label, &unit.batch)
                        .await
                }
            };
            match outcome {
                Ok(outcome) => {
                    summary.processed += 1;
                    summary.retracted += outcome.retracted;
                    summary.inserted_triples += outcome.inserted_triples;
                }
                Err(err) => {
                    log::warn!("{}: unit #{} ({}) failed: {}", source, unit.sequence, unit.label, err);
                    summary.record_failure(unit.sequence, &unit.label, err.to_string());
                }
            }
        }

        if let Some(key) = response.checkpoint {
            if summary.failed == 0 {
                self.catalog.mark_window_complete(source, &key, summary.processed)?;
            } else {
                log::warn!(
                    "{}: window {} left unchecked after {} failed units",
                    source,
                    key,
                    summary.failed
                );
            }
        }

        Ok(summary)
    }
}

#[async_trait]
impl DataSynchronizer for FactSynchronizer {
    fn register_fetcher(&mut self, fetcher: Arc<dyn Fetcher>) {
        self.fetchers.insert(fetcher.name(), fetcher);
    }

    async fn sync(&self, fetcher_name: &str, params: serde_json::Value) -> Result<RunSummary> {
        let fetcher = Arc::clone(self.fetcher(fetcher_name)?);
        let task_name = format!("sync_with_{}", fetcher_name);
        let task_id = self.catalog.create_task_log(&task_name)?;

        let response = match fetcher.fetch(params).await {
            Ok(response) => response,
            Err(err) => {
                self.catalog
                    .update_task_log_status(task_id, "FAILED", &err.to_string())?;
                return Err(err);
            }
        };

        log::info!(
            "{}: applying {} units ({} skipped)",
            fetcher_name,
            response.units.len(),
            response.skipped
        );
        let summary = self.apply_response(fetcher_name, response).await?;

        let details = serde_json::to_string(&summary)?;
        self.catalog
            .update_task_log_status(task_id, summary.status(), &details)?;
        log::info!(
            "{}: processed={} skipped={} failed={}",
            fetcher_name,
            summary.processed,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }

    async fn sync_windows(&self, fetcher_name: &str, windows: Vec<WindowRequest>) -> Result<RunSummary> {
        self.fetcher(fetcher_name)?;
        let mut total = RunSummary::default();

        for window in windows {
            if self.catalog.is_window_complete(fetcher_name, &window.key)? {
                log::info!("{}: window {} already complete, skipping", fetcher_name, window.key);
                continue;
            }
            match self.sync(fetcher_name, window.params).await {
                Ok(summary) => total.merge(summary),
                Err(err) => {
                    log::error!("{}: window {} failed: {}", fetcher_name, window.key, err);
                    total.record_failure(0, window.key, err.to_string());
                }
            }
        }

        Ok(total)
    }
}
