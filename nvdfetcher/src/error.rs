use std::time::Duration;
use thiserror::Error;

/// Custom error types for NVD feed operations
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("rate limited by the feed (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("feed returned HTTP {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("JSON deserialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("window {window} failed after {attempts} attempts: {message}")]
    WindowFetch {
        window: String,
        attempts: u32,
        message: String,
    },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FeedError {
    /// Network failures, 429 and 5xx responses.
    pub fn is_retryable(&self) -> bool {
        match self {
            FeedError::RequestError(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            FeedError::RateLimited { .. } => true,
            FeedError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type for feed operations
pub type Result<T> = std::result::Result<T, FeedError>;
