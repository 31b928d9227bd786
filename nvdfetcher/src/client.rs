//! NVD CVE API 2.0 client.
//!
//! Requests are spaced by a `governor` rate limiter and capped by a semaphore
//! so that a whole ingest stays under the published rate limit. Transient failures are
//! retried with exponential backoff by [`RetryPolicy`].

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::error::{FeedError, Result};
use crate::models::NvdPage;
use crate::window::DateWindow;

/// Base URL for the CVE API
pub const NVD_CVE_URL: &str = "https://services.nvd.nist.gov/rest/json/cves/2.0";

/// Largest page the API serves.
pub const MAX_RESULTS_PER_PAGE: usize = 2000;

/// Source of CVE pages for one publication window.
#[async_trait]
pub trait NvdService: Send + Sync {
    async fn fetch_page(
        &self,
        window: &DateWindow,
        start_index: usize,
        results_per_page: usize,
    ) -> Result<NvdPage>;
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub results_per_page: usize,
    /// Minimum spacing between two requests.
    pub min_delay: Duration,
    pub max_in_flight: usize,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub user_agent: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: NVD_CVE_URL.to_string(),
            api_key: None,
            results_per_page: MAX_RESULTS_PER_PAGE,
            min_delay: Duration::from_secs(6),
            max_in_flight: 1,
            max_attempts: 3,
            base_backoff: Duration::from_secs(2),
            user_agent: concat!("linpack/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FeedConfig {
    /// Reads `NVD_API_KEY`, `NVD_BASE_URL`, `NVD_MIN_DELAY_MS` and
    /// `NVD_MAX_ATTEMPTS` on top of the defaults.
    pub fn from_env() -> Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(FeedError::Config(err.to_string()));
            }
        }
        let mut config = Self::default();
        if let Ok(key) = std::env::var("NVD_API_KEY") {
            if !key.trim().is_empty() {
                config.api_key = Some(key.trim().to_string());
            }
        }
        if let Ok(url) = std::env::var("NVD_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(raw) = std::env::var("NVD_MIN_DELAY_MS") {
            let millis: u64 = raw
                .parse()
                .map_err(|_| FeedError::Config(format!("NVD_MIN_DELAY_MS is not a number: {raw}")))?;
            config.min_delay = Duration::from_millis(millis);
        }
        if let Ok(raw) = std::env::var("NVD_MAX_ATTEMPTS") {
            config.max_attempts = raw
                .parse()
                .map_err(|_| FeedError::Config(format!("NVD_MAX_ATTEMPTS is not a number: {raw}")))?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.results_per_page == 0 || self.results_per_page > MAX_RESULTS_PER_PAGE {
            return Err(FeedError::Config(format!(
                "results_per_page must be within 1..={MAX_RESULTS_PER_PAGE}"
            )));
        }
        if self.max_in_flight == 0 {
            return Err(FeedError::Config("max_in_flight must be positive".into()));
        }
        if self.max_attempts == 0 {
            return Err(FeedError::Config("max_attempts must be positive".into()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.base_backoff,
        }
    }
}

/// One request per `min_delay`, no burst. A zero delay disables spacing.
fn request_limiter(min_delay: Duration) -> Option<Arc<DefaultDirectRateLimiter>> {
    Quota::with_period(min_delay).map(|quota| Arc::new(RateLimiter::direct(quota)))
}

/// Client for the live API
#[derive(Clone)]
pub struct HttpNvdService {
    http_client: reqwest::Client,
    config: FeedConfig,
    rate_limiter: Option<Arc<DefaultDirectRateLimiter>>,
    in_flight: Arc<Semaphore>,
}

impl HttpNvdService {
    pub fn new(config: FeedConfig) -> Result<Self> {
        config.validate()?;
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http_client,
            rate_limiter: request_limiter(config.min_delay),
            in_flight: Arc::new(Semaphore::new(config.max_in_flight)),
            config,
        })
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl NvdService for HttpNvdService {
    async fn fetch_page(
        &self,
        window: &DateWindow,
        start_index: usize,
        results_per_page: usize,
    ) -> Result<NvdPage> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| FeedError::Config("request limiter closed".into()))?;
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        log::debug!(
            "GET {} window={} startIndex={}",
            self.config.base_url,
            window.key(),
            start_index
        );
        let mut request = self.http_client.get(&self.config.base_url).query(&[
            ("pubStartDate", window.pub_start_date()),
            ("pubEndDate", window.pub_end_date()),
            ("startIndex", start_index.to_string()),
            ("resultsPerPage", results_per_page.to_string()),
        ]);
        if let Some(key) = &self.config.api_key {
            request = request.header("apiKey", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FeedError::RateLimited {
                retry_after: retry_after(&response),
            });
        }
        if !status.is_success() {
            return Err(FeedError::ApiError {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Bounded retry with exponential backoff: `base_delay * 2^attempt`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        FeedConfig::default().retry_policy()
    }
}

impl RetryPolicy {
    pub fn no_delay(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are spent. Returns the last error and the attempts made.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> std::result::Result<T, (FeedError, u32)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if !err.is_retryable() || attempt >= self.max_attempts {
                        return Err((err, attempt));
                    }
                    let delay = match &err {
                        FeedError::RateLimited {
                            retry_after: Some(wait),
                        } => (*wait).max(self.delay_for(attempt - 1)),
                        _ => self.delay_for(attempt - 1),
                    };
                    log::warn!("attempt {attempt} failed ({err}); retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result = RetryPolicy::no_delay(3)
            .run(move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FeedError::ApiError {
                        status: 503,
                        body: String::new(),
                    })
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: std::result::Result<(), _> = RetryPolicy::no_delay(5)
            .run(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(FeedError::ApiError {
                    status: 404,
                    body: "not found".into(),
                })
            })
            .await;
        let (_, attempts) = result.unwrap_err();
        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limiter_spaces_requests() {
        let limiter = request_limiter(Duration::from_millis(200)).unwrap();
        let started = std::time::Instant::now();
        limiter.until_ready().await;
        limiter.until_ready().await;
        limiter.until_ready().await;
        assert!(started.elapsed() >= Duration::from_millis(350));
    }

    #[test]
    fn zero_delay_disables_spacing() {
        assert!(request_limiter(Duration::ZERO).is_none());
    }

    #[test]
    fn config_validation() {
        let mut config = FeedConfig::default();
        assert!(config.validate().is_ok());
        config.results_per_page = 5000;
        assert!(config.validate().is_err());
    }

    mod http {
        use super::*;
        use chrono::NaiveDate;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        /// Serves one canned reply and hands back the raw request head.
        async fn stub_feed(reply: String) -> (String, tokio::task::JoinHandle<String>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}/rest/json/cves/2.0", listener.local_addr().unwrap());
            let handle = tokio::spawn(async move {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                stream.write_all(reply.as_bytes()).await.unwrap();
                stream.shutdown().await.ok();
                String::from_utf8_lossy(&buf).into_owned()
            });
            (url, handle)
        }

        fn reply(status: &str, headers: &str, body: &str) -> String {
            format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{headers}\r\n{body}",
                body.len()
            )
        }

        fn service(url: String) -> HttpNvdService {
            HttpNvdService::new(FeedConfig {
                base_url: url,
                api_key: Some("k-123".into()),
                min_delay: Duration::ZERO,
                ..FeedConfig::default()
            })
            .unwrap()
        }

        fn january() -> DateWindow {
            let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
            DateWindow::new(
                day.and_hms_opt(0, 0, 0).unwrap(),
                day.and_hms_opt(23, 59, 59).unwrap(),
            )
            .unwrap()
        }

        #[tokio::test]
        async fn too_many_requests_carries_retry_after() {
            let (url, server) = stub_feed(reply("429 Too Many Requests", "Retry-After: 30\r\n", "")).await;

            let err = service(url).fetch_page(&january(), 0, 10).await.unwrap_err();

            match err {
                FeedError::RateLimited { retry_after } => {
                    assert_eq!(retry_after, Some(Duration::from_secs(30)));
                }
                other => panic!("unexpected error {other:?}"),
            }
            server.await.unwrap();
        }

        #[tokio::test]
        async fn page_request_carries_window_and_key() {
            let body = r#"{"resultsPerPage":0,"startIndex":20,"totalResults":20,"vulnerabilities":[]}"#;
            let (url, server) = stub_feed(reply("200 OK", "", body)).await;

            let page = service(url).fetch_page(&january(), 20, 10).await.unwrap();

            assert_eq!(page.total_results, 20);
            let request = server.await.unwrap();
            let line = request.lines().next().unwrap();
            assert!(line.contains("pubStartDate=2024-01-01T00%3A00%3A00.000"), "{line}");
            assert!(line.contains("startIndex=20"));
            assert!(line.contains("resultsPerPage=10"));
            assert!(request.to_lowercase().contains("apikey: k-123"));
        }

        #[tokio::test]
        async fn server_errors_keep_status_and_body() {
            let (url, server) = stub_feed(reply("503 Service Unavailable", "", "maintenance")).await;

            let err = service(url).fetch_page(&january(), 0, 10).await.unwrap_err();

            assert!(err.is_retryable());
            match err {
                FeedError::ApiError { status, body } => {
                    assert_eq!(status, 503);
                    assert_eq!(body, "maintenance");
                }
                other => panic!("unexpected error {other:?}"),
            }
            server.await.unwrap();
        }
    }
}
