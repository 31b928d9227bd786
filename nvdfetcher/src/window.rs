use chrono::{Duration, NaiveDateTime};
use factstore::sync::WindowRequest;
use serde_json::json;

use crate::error::{FeedError, Result};

/// Longest publication range the feed accepts in one query.
pub const MAX_WINDOW_DAYS: i64 = 119;

const KEY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// An inclusive publication-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if end < start {
            return Err(FeedError::InvalidParameters(format!(
                "window end {end} precedes start {start}"
            )));
        }
        if end - start > Duration::days(MAX_WINDOW_DAYS) {
            return Err(FeedError::InvalidParameters(format!(
                "window {start}..{end} exceeds {MAX_WINDOW_DAYS} days"
            )));
        }
        Ok(Self { start, end })
    }

    /// Cuts `[start, end]` into consecutive windows of at most
    /// [`MAX_WINDOW_DAYS`]; each window starts one second after the previous end.
    pub fn split(start: NaiveDateTime, end: NaiveDateTime) -> Vec<DateWindow> {
        let mut windows = Vec::new();
        let mut cursor = start;
        while cursor <= end {
            let window_end = (cursor + Duration::days(MAX_WINDOW_DAYS)).min(end);
            windows.push(DateWindow {
                start: cursor,
                end: window_end,
            });
            cursor = window_end + Duration::seconds(1);
        }
        windows
    }

    /// Stable key for checkpointing.
    pub fn key(&self) -> String {
        format!(
            "{}..{}",
            self.start.format(KEY_FORMAT),
            self.end.format(KEY_FORMAT)
        )
    }

    pub fn pub_start_date(&self) -> String {
        self.start.format("%Y-%m-%dT%H:%M:%S.000").to_string()
    }

    pub fn pub_end_date(&self) -> String {
        self.end.format("%Y-%m-%dT%H:%M:%S.999").to_string()
    }
}

/// One window request per feed window, each carrying the fetcher params.
pub fn window_requests(start: NaiveDateTime, end: NaiveDateTime, linux_only: bool) -> Vec<WindowRequest> {
    DateWindow::split(start, end)
        .into_iter()
        .map(|window| WindowRequest {
            key: window.key(),
            params: json!({
                "start": window.start.format(KEY_FORMAT).to_string(),
                "end": window.end.format(KEY_FORMAT).to_string(),
                "linux_only": linux_only,
            }),
        })
        .collect()
}
