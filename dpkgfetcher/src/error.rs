use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DpkgError {
    #[error("log source {path} unavailable: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DpkgError>;
