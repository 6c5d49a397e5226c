//! Award Harvester: a resilient award-notice exporter
//!
//! This crate walks a paginated public procurement API, flattens the nested
//! award/supplier structure of every response into flat records, and streams
//! those records to a CSV file while surviving retries, throttling, and
//! partial failures.

pub mod cache;
pub mod config;
pub mod extract;
pub mod harvest;
pub mod model;
pub mod output;

use std::fmt;
use thiserror::Error;

/// Main error type for harvest runs
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("Pagination discovery failed for {url}: {message}")]
    Discovery { url: String, message: String },

    #[error("Cache error: {0}")]
    Cache(#[from] cache::CacheError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Classification of a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// No response was received (connect failure, timeout, broken body)
    Network,

    /// 5xx, a throttling status, or an undecodable success body
    Server,

    /// The response decoded but the expected data was absent
    EmptyResult,

    /// 4xx other than a throttling status; never retried
    Client,

    /// The retry budget ran out on a retryable failure
    RetriesExhausted,
}

impl FetchErrorKind {
    /// Returns whether a failure of this kind may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Server | Self::EmptyResult)
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network error",
            Self::Server => "server error",
            Self::EmptyResult => "empty result",
            Self::Client => "client error",
            Self::RetriesExhausted => "retries exhausted",
        };
        f.write_str(name)
    }
}

/// Terminal failure of one logical request
#[derive(Debug, Clone)]
pub struct FetchError {
    /// What went wrong
    pub kind: FetchErrorKind,

    /// The request target
    pub url: String,

    /// Last HTTP status observed, if any response arrived
    pub last_status: Option<u16>,

    /// Number of network attempts made
    pub attempts: u32,

    /// Description of the last failure
    pub message: String,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} for {} after {} attempt(s)",
            self.kind, self.url, self.attempts
        )?;
        if let Some(status) = self.last_status {
            write!(f, " (last status {})", status)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for FetchError {}

/// Result type alias for harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

// Re-export commonly used types
pub use config::Config;
pub use harvest::{run_harvest, Coordinator, Fetcher, FetchPolicy};
pub use model::{FieldValue, Method, OutputRecord, Passthrough, Request, ResponseEnvelope};
