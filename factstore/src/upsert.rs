//! Existence check, retraction and assertion of one fact batch at a time.
//!
//! The coordinator keeps no state about the graph between units; whatever it
//! needs to know is asked from the store. Units touching the same identifier
//! are serialized with per-identifier async locks.

use crate::errors::{Result, StorageError};
use crate::facts::FactBatch;
use crate::gateway::GraphStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    /// Retractions that found facts and deleted them.
    pub retracted: usize,
    pub inserted_triples: usize,
}

type KeyedLocks = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

pub struct UpsertCoordinator {
    store: Arc<dyn GraphStore>,
    batch_size: usize,
    locks: KeyedLocks,
}

impl UpsertCoordinator {
    pub fn new(store: Arc<dyn GraphStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> Arc<dyn GraphStore> {
        Arc::clone(&self.store)
    }

    /// Applies one unit: every retraction (ASK, then DELETE WHERE when
    /// present) strictly before any assertion.
    ///
    /// A failed ASK or DELETE aborts the unit before anything is asserted.
    pub async fn apply(&self, sequence: u64, label: &str, batch: &FactBatch) -> Result<UpsertOutcome> {
        let mut keys: Vec<String> = batch
            .retract
            .iter()
            .map(|r| r.subject.id().to_string())
            .collect();
        keys.sort();
        keys.dedup();

        let guards = self.lock_keys(&keys).await?;
        let result = self.apply_locked(sequence, label, batch).await;
        drop(guards);
        self.prune_idle();
        result
    }

    async fn apply_locked(&self, sequence: u64, label: &str, batch: &FactBatch) -> Result<UpsertOutcome> {
        let mut outcome = UpsertOutcome::default();

        for retraction in &batch.retract {
            let tag = |source: StorageError| StorageError::Upsert {
                sequence,
                identifier: retraction.subject.id().to_string(),
                source: Box::new(source),
            };
            if self.store.exists(retraction).await.map_err(tag)? {
                self.store.retract(retraction).await.map_err(tag)?;
                outcome.retracted += 1;
                log::debug!("event #{} retracted {}", sequence, retraction.subject);
            }
        }

        outcome.inserted_triples = self.insert_chunks(sequence, label, batch).await?;
        Ok(outcome)
    }

    /// Applies assertions directly; used for append-only records.
    pub async fn insert_only(&self, sequence: u64, label: &str, batch: &FactBatch) -> Result<UpsertOutcome> {
        Ok(UpsertOutcome {
            retracted: 0,
            inserted_triples: self.insert_chunks(sequence, label, batch).await?,
        })
    }

    async fn insert_chunks(&self, sequence: u64, label: &str, batch: &FactBatch) -> Result<usize> {
        let mut inserted = 0;
        for chunk in batch.chunks(self.batch_size) {
            self.store
                .insert(chunk)
                .await
                .map_err(|source| StorageError::Upsert {
                    sequence,
                    identifier: label.to_string(),
                    source: Box::new(source),
                })?;
            inserted += chunk.len();
        }
        Ok(inserted)
    }

    async fn lock_keys(&self, keys: &[String]) -> Result<Vec<OwnedMutexGuard<()>>> {
        let handles: Vec<Arc<AsyncMutex<()>>> = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| StorageError::SyncError("upsert lock table poisoned".into()))?;
            keys.iter()
                .map(|key| Arc::clone(locks.entry(key.clone()).or_default()))
                .collect()
        };

        // `keys` is sorted, so concurrent units always lock in the same order.
        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }
        Ok(guards)
    }

    fn prune_idle(&self) {
        if let Ok(mut locks) = self.locks.lock() {
            locks.retain(|_, handle| Arc::strong_count(handle) > 1);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or_default()
    }
}
