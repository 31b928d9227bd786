use crate::errors::{Result, StorageError};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_QUERY_ENDPOINT: &str = "http://localhost:8890/sparql";
pub const DEFAULT_GRAPH: &str = "http://localhost:8890/linpack";
pub const DEFAULT_BATCH_SIZE: usize = 50;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub query_endpoint: String,
    pub update_endpoint: String,
    pub graph: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    pub catalog_path: PathBuf,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_ms() -> u64 {
    500
}

impl StoreConfig {
    /// Local defaults with the run catalog kept under `state_dir`.
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        Self {
            query_endpoint: DEFAULT_QUERY_ENDPOINT.to_string(),
            update_endpoint: DEFAULT_QUERY_ENDPOINT.to_string(),
            graph: DEFAULT_GRAPH.to_string(),
            username: None,
            password: None,
            batch_size: DEFAULT_BATCH_SIZE,
            max_attempts: default_max_attempts(),
            retry_base_ms: default_retry_base_ms(),
            catalog_path: state_dir.join("catalog.sqlite"),
        }
    }

    /// Reads `LINPACK_*` variables, loading `.env` first when present.
    ///
    /// `LINPACK_STATE_DIR` (default `.linpack`), `LINPACK_SPARQL_ENDPOINT`,
    /// `LINPACK_UPDATE_ENDPOINT` (defaults to the query endpoint),
    /// `LINPACK_GRAPH`, `LINPACK_STORE_USER`, `LINPACK_STORE_PASSWORD`,
    /// `LINPACK_BATCH_SIZE`, `LINPACK_STORE_MAX_ATTEMPTS`.
    pub fn from_env() -> Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(StorageError::Config(format!("failed to load .env: {err}")));
            }
        }

        let state_dir = env::var("LINPACK_STATE_DIR").unwrap_or_else(|_| ".linpack".to_string());
        let mut config = Self::new(state_dir);

        if let Ok(endpoint) = env::var("LINPACK_SPARQL_ENDPOINT") {
            config.query_endpoint = endpoint.clone();
            config.update_endpoint = endpoint;
        }
        if let Ok(endpoint) = env::var("LINPACK_UPDATE_ENDPOINT") {
            config.update_endpoint = endpoint;
        }
        if let Ok(graph) = env::var("LINPACK_GRAPH") {
            config.graph = graph;
        }
        config.username = env::var("LINPACK_STORE_USER").ok();
        config.password = env::var("LINPACK_STORE_PASSWORD").ok();
        if let Some(size) = parse_var("LINPACK_BATCH_SIZE")? {
            config.batch_size = size;
        }
        if let Some(attempts) = parse_var("LINPACK_STORE_MAX_ATTEMPTS")? {
            config.max_attempts = attempts;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(StorageError::Config("batch_size must be positive".into()));
        }
        if self.max_attempts == 0 {
            return Err(StorageError::Config("max_attempts must be positive".into()));
        }
        for endpoint in [&self.query_endpoint, &self.update_endpoint] {
            url::Url::parse(endpoint).map_err(|err| {
                StorageError::Config(format!("invalid endpoint `{endpoint}`: {err}"))
            })?;
        }
        Ok(())
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }
}

fn parse_var<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| StorageError::Config(format!("{key} has invalid value `{raw}`"))),
        Err(_) => Ok(None),
    }
}
