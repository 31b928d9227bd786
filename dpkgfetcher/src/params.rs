use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{DpkgError, Result};

/// Parameters accepted by [`crate::DpkgFetcher`].
#[derive(Debug, Deserialize, Clone)]
pub struct LogParams {
    pub path: PathBuf,
}

impl LogParams {
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let params: LogParams = serde_json::from_value(value)?;
        if params.path.as_os_str().is_empty() {
            return Err(DpkgError::InvalidParam("path must not be empty".into()));
        }
        Ok(params)
    }
}
