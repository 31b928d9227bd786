pub mod error;
pub mod fetcher;
pub mod mapper;
pub mod models;
pub mod params;
pub mod parser;

pub use crate::fetcher::DpkgFetcher;
pub use crate::params::LogParams;
pub use crate::parser::{parse_file, parse_lines, ParseReport};
