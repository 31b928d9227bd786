//! Access to the external triple store.
//!
//! [`SparqlGateway`] talks SPARQL 1.1 Protocol over HTTP. [`MemoryGraphStore`]
//! keeps facts in process and records every operation; it backs tests and
//! dry runs.

use crate::config::StoreConfig;
use crate::errors::{Result, StorageError};
use crate::facts::{Object, Resource, Retraction, Triple};
use crate::sparql::QueryBuilder;
use crate::vocab::Predicate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Whether any fact matches the retraction's pattern.
    async fn exists(&self, retraction: &Retraction) -> Result<bool>;
    async fn retract(&self, retraction: &Retraction) -> Result<()>;
    async fn insert(&self, triples: &[Triple]) -> Result<()>;
}

/// `base * 2^attempt`, saturating instead of overflowing.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

#[derive(Debug, Deserialize)]
struct AskResponse {
    boolean: bool,
}

pub struct SparqlGateway {
    client: reqwest::Client,
    queries: QueryBuilder,
    config: StoreConfig,
}

impl SparqlGateway {
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            queries: QueryBuilder::new(config.graph.clone()),
            config,
        })
    }

    pub fn queries(&self) -> &QueryBuilder {
        &self.queries
    }

    async fn post_form(&self, endpoint: &str, field: &str, text: &str) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .post(endpoint)
            .header(reqwest::header::ACCEPT, "application/sparql-results+json")
            .form(&[(field, text)]);
        if let Some(user) = &self.config.username {
            request = request.basic_auth(user, self.config.password.as_deref());
        }
        let response = request.send().await?.error_for_status()?;
        Ok(response)
    }

    /// Runs `op`, retrying transient failures with exponential backoff.
    async fn with_retry<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let base_delay = self.config.retry_base_delay();
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt + 1 < self.config.max_attempts => {
                    let delay = backoff_delay(base_delay, attempt);
                    log::warn!(
                        "{} attempt {} failed: {}; retrying in {:?}",
                        operation,
                        attempt + 1,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(StorageError::store(operation, err.to_string()));
                }
            }
        }
    }
}

#[async_trait]
impl GraphStore for SparqlGateway {
    async fn exists(&self, retraction: &Retraction) -> Result<bool> {
        let text = self.queries.ask(retraction);
        let text = text.as_str();
        self.with_retry("ASK", move || async move {
            let response = self
                .post_form(&self.config.query_endpoint, "query", text)
                .await?;
            let answer: AskResponse = response.json().await?;
            Ok(answer.boolean)
        })
        .await
    }

    async fn retract(&self, retraction: &Retraction) -> Result<()> {
        let text = self.queries.delete(retraction);
        let text = text.as_str();
        self.with_retry("DELETE", move || async move {
            self.post_form(&self.config.update_endpoint, "update", text)
                .await
                .map(|_| ())
        })
        .await
    }

    async fn insert(&self, triples: &[Triple]) -> Result<()> {
        if triples.is_empty() {
            return Ok(());
        }
        let text = self.queries.insert_data(triples);
        let text = text.as_str();
        self.with_retry("INSERT", move || async move {
            self.post_form(&self.config.update_endpoint, "update", text)
                .await
                .map(|_| ())
        })
        .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperationKind {
    Ask,
    Delete,
    Insert,
}

/// One operation observed by [`MemoryGraphStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedOperation {
    pub kind: OperationKind,
    /// Retraction subject id, or the number of triples for inserts.
    pub target: String,
}

#[derive(Default)]
struct MemoryState {
    triples: Vec<Triple>,
    operations: Vec<RecordedOperation>,
    failing: Option<OperationKind>,
}

#[derive(Default)]
pub struct MemoryGraphStore {
    state: Mutex<MemoryState>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later operation of `kind` fail.
    pub fn fail_on(&self, kind: Option<OperationKind>) {
        if let Ok(mut state) = self.state.lock() {
            state.failing = kind;
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> Result<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StorageError::store("lock", "memory store mutex poisoned"))?;
        Ok(f(&mut state))
    }

    pub fn triples(&self) -> Vec<Triple> {
        self.with_state(|s| s.triples.clone()).unwrap_or_default()
    }

    pub fn operations(&self) -> Vec<RecordedOperation> {
        self.with_state(|s| s.operations.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.with_state(|s| s.triples.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Objects currently stored for `(subject, predicate)`.
    pub fn objects(&self, subject: &Resource, predicate: Predicate) -> Vec<Object> {
        self.with_state(|s| {
            s.triples
                .iter()
                .filter(|t| &t.subject == subject && t.predicate == predicate)
                .map(|t| t.object.clone())
                .collect()
        })
        .unwrap_or_default()
    }

    fn record(state: &mut MemoryState, kind: OperationKind, target: String) -> Result<()> {
        state.operations.push(RecordedOperation { kind, target });
        if state.failing == Some(kind) {
            return Err(StorageError::store(
                match kind {
                    OperationKind::Ask => "ASK",
                    OperationKind::Delete => "DELETE",
                    OperationKind::Insert => "INSERT",
                },
                "injected failure",
            ));
        }
        Ok(())
    }
}

fn pattern_matches(triple: &Triple, retraction: &Retraction) -> bool {
    triple.subject == retraction.subject
        && retraction.predicate.is_none_or(|p| p == triple.predicate)
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn exists(&self, retraction: &Retraction) -> Result<bool> {
        self.with_state(|state| {
            Self::record(state, OperationKind::Ask, retraction.subject.id().to_string())?;
            Ok(state.triples.iter().any(|t| pattern_matches(t, retraction)))
        })?
    }

    async fn retract(&self, retraction: &Retraction) -> Result<()> {
        self.with_state(|state| {
            Self::record(state, OperationKind::Delete, retraction.subject.id().to_string())?;
            state.triples.retain(|t| !pattern_matches(t, retraction));
            Ok(())
        })?
    }

    async fn insert(&self, triples: &[Triple]) -> Result<()> {
        self.with_state(|state| {
            Self::record(state, OperationKind::Insert, triples.len().to_string())?;
            for triple in triples {
                if !state.triples.contains(triple) {
                    state.triples.push(triple.clone());
                }
            }
            Ok(())
        })?
    }
}
