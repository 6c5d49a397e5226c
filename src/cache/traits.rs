//! Cache trait and error types
//!
//! The fetcher only ever talks to a [`ResponseCache`], so the on-disk store
//! can be swapped for an in-memory one in tests.

use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache entry {digest}: {message}")]
    Corrupt { digest: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid digest: {0}")]
    InvalidDigest(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Content-addressed store of decoded response payloads
///
/// Keys are request digests (see [`crate::model::Request::digest`]).
/// Implementations must tolerate concurrent writers to the same digest; the
/// last write wins.
pub trait ResponseCache: Send + Sync {
    /// Returns the payload stored for `digest`, if any
    fn get(&self, digest: &str) -> CacheResult<Option<Value>>;

    /// Stores `payload` under `digest`, replacing any previous entry
    fn put(&self, digest: &str, payload: &Value) -> CacheResult<()>;
}
