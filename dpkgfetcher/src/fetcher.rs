use async_trait::async_trait;
use factstore::{
    errors::{Result as StorageResult, StorageError},
    fetch::{FetchResponse, Fetcher, FetcherCapability},
    models::{ApplyMode, FactUnit},
    vocab::Class,
};
use serde_json::json;

use crate::{error::DpkgError, mapper, params::LogParams, parser};

/// Reads a dpkg log and turns every recognized line into an upsert unit.
#[derive(Debug, Default)]
pub struct DpkgFetcher;

impl DpkgFetcher {
    pub fn new() -> Self {
        Self
    }

    fn capability_descriptor() -> FetcherCapability {
        FetcherCapability {
            name: "dpkgfetcher",
            description: "Derives package lifecycle facts from a dpkg.log file",
            param_schema: json!({
                "type": "object",
                "required": ["path"],
                "properties": {
                    "path": { "type": "string", "description": "Path to a dpkg.log file" }
                }
            }),
            produces: vec![
                Class::Package,
                Class::ActionEvent,
                Class::StatusEvent,
                Class::ConffileEvent,
                Class::StartupEvent,
            ],
            apply_mode: ApplyMode::Upsert,
            examples: vec![json!({ "path": "/var/log/dpkg.log" })],
        }
    }

    fn parse_params(value: serde_json::Value) -> StorageResult<LogParams> {
        LogParams::from_value(value)
            .map_err(|err| StorageError::InvalidArg(format!("invalid fetch params: {err}")))
    }

    pub fn units_from_report(report: &parser::ParseReport) -> Vec<FactUnit> {
        report
            .events
            .iter()
            .map(|event| FactUnit {
                sequence: event.sequence,
                label: event.label(),
                batch: mapper::event_to_facts(event),
                mode: ApplyMode::Upsert,
            })
            .collect()
    }
}

#[async_trait]
impl Fetcher for DpkgFetcher {
    fn name(&self) -> &'static str {
        "dpkgfetcher"
    }

    fn capability(&self) -> FetcherCapability {
        Self::capability_descriptor()
    }

    async fn fetch(&self, params: serde_json::Value) -> StorageResult<FetchResponse> {
        let params = Self::parse_params(params)?;
        let content = tokio::fs::read(&params.path)
            .await
            .map_err(|source| DpkgError::SourceUnavailable {
                path: params.path.clone(),
                source,
            })
            .map_err(|err| StorageError::SourceUnavailable(err.to_string()))?;

        let report = parser::parse_bytes(&content);
        log::info!(
            "{}: {} events, {} unrecognized lines",
            params.path.display(),
            report.events.len(),
            report.skipped
        );

        Ok(FetchResponse {
            units: Self::units_from_report(&report),
            skipped: report.skipped,
            checkpoint: None,
        })
    }
}
