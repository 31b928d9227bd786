use crate::errors::Result;
use crate::models::{ApplyMode, FactUnit};
use crate::vocab::Class;
use async_trait::async_trait;
use serde::Serialize;

/// Describes what a fetcher accepts and what it produces.
#[derive(Debug, Clone, Serialize)]
pub struct FetcherCapability {
    pub name: &'static str,
    pub description: &'static str,
    pub param_schema: serde_json::Value,
    pub produces: Vec<Class>,
    pub apply_mode: ApplyMode,
    pub examples: Vec<serde_json::Value>,
}

/// Everything a single fetch produced.
#[derive(Debug, Default)]
pub struct FetchResponse {
    /// Fact units in the order they must be applied.
    pub units: Vec<FactUnit>,
    /// Input items that could not be turned into units (unparsable lines,
    /// filtered records).
    pub skipped: usize,
    /// Window key to checkpoint once every unit has been applied.
    pub checkpoint: Option<String>,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    fn name(&self) -> &'static str;

    fn capability(&self) -> FetcherCapability;

    async fn fetch(&self, params: serde_json::Value) -> Result<FetchResponse>;
}
