//! Data model shared by every pipeline stage
//!
//! - [`Request`]: one logical request, immutable once built
//! - [`ResponseEnvelope`]: a decoded response plus the request that produced it
//! - [`OutputRecord`]: one flattened award row

mod record;
mod request;

pub use record::{FieldValue, OutputRecord};
pub use request::{Method, Passthrough, Request};

use serde_json::Value;

/// A decoded response, owned by whichever stage consumes it
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    /// The request that produced this response
    pub request: Request,

    /// HTTP status of the final attempt (200 for cache hits)
    pub status: u16,

    /// Decoded JSON payload
    pub payload: Value,

    /// Network attempts made; zero when served from cache
    pub attempts: u32,

    /// Whether the payload came from the local cache
    pub from_cache: bool,
}

impl ResponseEnvelope {
    /// Returns the passthrough metadata carried by the originating request
    pub fn passthrough(&self) -> Option<&Passthrough> {
        self.request.passthrough()
    }

    /// Number of retries that preceded the successful attempt
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}
