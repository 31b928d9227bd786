use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::error::{FeedError, Result};
use crate::window::DateWindow;

/// Parameters accepted by [`crate::NvdFetcher`]: one publication window.
#[derive(Debug, Deserialize, Clone)]
pub struct FeedParams {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    #[serde(default)]
    pub linux_only: bool,
    #[serde(default)]
    pub results_per_page: Option<usize>,
}

impl FeedParams {
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let params: FeedParams = serde_json::from_value(value)?;
        if params.results_per_page == Some(0) {
            return Err(FeedError::InvalidParameters(
                "results_per_page must be positive".into(),
            ));
        }
        Ok(params)
    }

    pub fn window(&self) -> Result<DateWindow> {
        DateWindow::new(self.start, self.end)
    }
}
