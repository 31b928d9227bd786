use crate::facts::FactBatch;
use serde::{Deserialize, Serialize};

/// How the coordinator applies a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyMode {
    /// Existence check, retraction, then assertion.
    Upsert,
    /// Append-only records; assertions only.
    InsertOnly,
}

/// One independently applied group of facts, typically derived from a single
/// event or record.
#[derive(Debug, Clone)]
pub struct FactUnit {
    pub sequence: u64,
    /// Human-readable handle for logs and failure reports.
    pub label: String,
    pub batch: FactBatch,
    pub mode: ApplyMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub sequence: u64,
    pub label: String,
    pub reason: String,
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub retracted: usize,
    pub inserted_triples: usize,
    #[serde(default)]
    pub failures: Vec<UnitFailure>,
}

impl RunSummary {
    pub fn record_failure(&mut self, sequence: u64, label: impl Into<String>, reason: impl Into<String>) {
        self.failed += 1;
        self.failures.push(UnitFailure {
            sequence,
            label: label.into(),
            reason: reason.into(),
        });
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.retracted += other.retracted;
        self.inserted_triples += other.inserted_triples;
        self.failures.extend(other.failures);
    }

    pub fn status(&self) -> &'static str {
        if self.failed == 0 {
            "SUCCESS"
        } else if self.processed > 0 {
            "PARTIAL"
        } else {
            "FAILED"
        }
    }
}

// --- Metadata Catalog (SQLite) Models ---

#[derive(Debug)]
pub struct TaskLog {
    pub task_id: i64,
    pub task_name: Option<String>,
    pub start_time: i64, // Unix timestamp
    pub end_time: Option<i64>,
    pub status: Option<String>,
    pub details: Option<String>, // JSON string
}
