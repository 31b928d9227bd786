pub mod client;
pub mod cpe;
pub mod error;
pub mod fetcher;
pub mod mapper;
pub mod models;
pub mod params;
pub mod window;

pub use crate::client::{FeedConfig, HttpNvdService, NvdService, RetryPolicy};
pub use crate::fetcher::NvdFetcher;
pub use crate::params::FeedParams;
pub use crate::window::{window_requests, DateWindow};
