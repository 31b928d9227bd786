use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite operation failed: {0}")]
    SQLite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Graph store {operation} failed: {message}")]
    StoreOperation {
        operation: &'static str,
        message: String,
    },

    #[error("Upsert of event #{sequence} ({identifier}) aborted: {source}")]
    Upsert {
        sequence: u64,
        identifier: String,
        #[source]
        source: Box<StorageError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArg(String),

    #[error("Synchronization failed: {0}")]
    SyncError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StorageError {
    pub fn store(operation: &'static str, message: impl Into<String>) -> Self {
        StorageError::StoreOperation {
            operation,
            message: message.into(),
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Http(err) => {
                err.is_timeout()
                    || err.is_connect()
                    || err.is_request()
                    || err.status().is_some_and(|s| s.is_server_error())
            }
            StorageError::Io(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
