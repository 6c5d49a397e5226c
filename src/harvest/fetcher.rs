//! Resilient fetcher
//!
//! This module turns one logical [`Request`] into a [`ResponseEnvelope`]:
//! - Serving cache hits without network I/O or rate-limit slots
//! - Taking a rate-limit slot for every network attempt
//! - Bounding each attempt with a wall-clock timeout
//! - Retrying network errors, 5xx, throttling statuses, and empty results
//!   after a fixed delay
//! - Writing successful payloads back to the cache

use crate::cache::{CacheError, ResponseCache};
use crate::config::FetcherConfig;
use crate::harvest::rate_limit::RateLimiter;
use crate::harvest::transport::Transport;
use crate::model::{Request, ResponseEnvelope};
use crate::{FetchError, FetchErrorKind};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Retry, timeout, and result-validation policy for the fetcher
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,

    /// Fixed delay between attempts
    pub retry_delay: Duration,

    /// Wall-clock bound on each individual attempt
    pub attempt_timeout: Duration,

    /// Statuses the provider uses for throttling; retried like 5xx
    pub throttle_statuses: Vec<u16>,

    /// Top-level payload key that signals an empty result when it holds an
    /// empty array
    pub empty_collection: Option<String>,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::from_config(&FetcherConfig::default())
    }
}

impl FetchPolicy {
    pub fn from_config(config: &FetcherConfig) -> Self {
        let empty_collection = Some(config.empty_collection.trim().to_string())
            .filter(|key| !key.is_empty());

        Self {
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            attempt_timeout: Duration::from_millis(config.timeout_ms),
            throttle_statuses: config.throttle_statuses.clone(),
            empty_collection,
        }
    }

    /// Whether `status` is a retryable server-side failure
    pub fn is_retryable_status(&self, status: u16) -> bool {
        status >= 500 || self.throttle_statuses.contains(&status)
    }

    /// Whether a decoded payload is semantically empty
    ///
    /// Only a present-but-empty array counts; a missing key does not.
    pub fn is_empty_result(&self, payload: &Value) -> bool {
        match &self.empty_collection {
            Some(key) => payload
                .get(key)
                .and_then(Value::as_array)
                .map(|items| items.is_empty())
                .unwrap_or(false),
            None => false,
        }
    }
}

/// Snapshot of fetcher activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchCounts {
    pub cache_hits: u64,
    pub attempts: u64,
    pub retries: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
struct FetchCounters {
    cache_hits: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
}

/// Outcome of a single network attempt
enum Attempt {
    Success {
        status: u16,
        payload: Value,
    },
    Failed {
        kind: FetchErrorKind,
        status: Option<u16>,
        code: String,
        message: String,
        payload: Option<Value>,
    },
}

/// Fetches requests under the configured policy
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    cache: Option<Arc<dyn ResponseCache>>,
    policy: FetchPolicy,
    counters: FetchCounters,
}

impl Fetcher {
    /// Creates a fetcher without a cache
    ///
    /// # Arguments
    ///
    /// * `transport` - Performs individual network attempts
    /// * `limiter` - Rate limiter shared by every caller of this fetcher
    /// * `policy` - Retry, timeout, and validation policy
    pub fn new(transport: Arc<dyn Transport>, limiter: Arc<RateLimiter>, policy: FetchPolicy) -> Self {
        Self {
            transport,
            limiter,
            cache: None,
            policy,
            counters: FetchCounters::default(),
        }
    }

    /// Attaches a response cache
    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn counts(&self) -> FetchCounts {
        FetchCounts {
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            attempts: self.counters.attempts.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Fetches one request
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Cache hit | Return cached payload, no network I/O |
    /// | No response / attempt timeout | Retry after delay |
    /// | HTTP 5xx or throttling status | Retry after delay |
    /// | 2xx with undecodable body | Retry after delay |
    /// | 2xx with empty result collection | Retry; accepted as empty once retries run out |
    /// | Other non-2xx | Fail immediately (`Client`) |
    /// | Retries exhausted | Fail (`RetriesExhausted`) |
    ///
    /// # Returns
    ///
    /// * `Ok(ResponseEnvelope)` - Decoded response (possibly from cache)
    /// * `Err(FetchError)` - Terminal failure for this request
    pub async fn fetch(&self, request: Request) -> Result<ResponseEnvelope, FetchError> {
        let label = request.label();
        let digest = request.digest();

        if let Some(payload) = self.cached(&digest, &label).await {
            return Ok(ResponseEnvelope {
                request,
                status: 200,
                payload,
                attempts: 0,
                from_cache: true,
            });
        }

        tracing::info!(url = %label, "Fetching {}...", label);

        let mut attempt: u32 = 0;
        let mut last_status = None;

        loop {
            attempt += 1;
            self.limiter.acquire().await;
            self.counters.attempts.fetch_add(1, Ordering::Relaxed);

            match self.attempt(&request).await {
                Attempt::Success { status, payload } => {
                    tracing::debug!(url = %label, status, attempt, "Fetched {}", label);
                    self.store(&digest, &payload).await;
                    return Ok(ResponseEnvelope {
                        request,
                        status,
                        payload,
                        attempts: attempt,
                        from_cache: false,
                    });
                }

                Attempt::Failed {
                    kind,
                    status,
                    code,
                    message,
                    payload,
                } => {
                    last_status = status.or(last_status);

                    if !kind.is_retryable() {
                        self.counters.failures.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(url = %label, code = %code, attempt, "Received code {}: {} (not retrying)", code, label);
                        return Err(FetchError {
                            kind,
                            url: label,
                            last_status,
                            attempts: attempt,
                            message,
                        });
                    }

                    if attempt > self.policy.max_retries {
                        if let (FetchErrorKind::EmptyResult, Some(payload)) = (kind, payload) {
                            // Persistently empty: the provider may simply have
                            // nothing for this request. Not cached.
                            tracing::warn!(url = %label, attempt, "Accepting empty result for {} after {} attempt(s)", label, attempt);
                            return Ok(ResponseEnvelope {
                                request,
                                status: status.unwrap_or(200),
                                payload,
                                attempts: attempt,
                                from_cache: false,
                            });
                        }

                        self.counters.failures.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(url = %label, code = %code, attempt, "Giving up on {} after {} attempt(s): {}", label, attempt, message);
                        return Err(FetchError {
                            kind: FetchErrorKind::RetriesExhausted,
                            url: label,
                            last_status,
                            attempts: attempt,
                            message: format!("{}: {}", kind, message),
                        });
                    }

                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    if attempt == 1 {
                        tracing::warn!(url = %label, code = %code, attempt, "Received code {}: {} (retrying...)", code, label);
                    } else {
                        tracing::warn!(url = %label, code = %code, attempt, "Received code {}: {} (retry {}...)", code, label, attempt);
                    }

                    tokio::time::sleep(self.policy.retry_delay).await;
                }
            }
        }
    }

    /// Performs and classifies one network attempt
    async fn attempt(&self, request: &Request) -> Attempt {
        let sent = tokio::time::timeout(self.policy.attempt_timeout, self.transport.send(request)).await;

        let response = match sent {
            Err(_) => {
                return Attempt::Failed {
                    kind: FetchErrorKind::Network,
                    status: None,
                    code: "ETIMEDOUT".to_string(),
                    message: format!("no response within {:?}", self.policy.attempt_timeout),
                    payload: None,
                }
            }
            Ok(Err(e)) => {
                return Attempt::Failed {
                    kind: FetchErrorKind::Network,
                    status: None,
                    code: e.code().to_string(),
                    message: e.to_string(),
                    payload: None,
                }
            }
            Ok(Ok(response)) => response,
        };

        let status = response.status;
        if self.policy.is_retryable_status(status) {
            return Attempt::Failed {
                kind: FetchErrorKind::Server,
                status: Some(status),
                code: status.to_string(),
                message: format!("HTTP {}", status),
                payload: None,
            };
        }

        if !(200..300).contains(&status) {
            return Attempt::Failed {
                kind: FetchErrorKind::Client,
                status: Some(status),
                code: status.to_string(),
                message: format!("HTTP {}", status),
                payload: None,
            };
        }

        let payload: Value = match serde_json::from_str(&response.body) {
            Ok(payload) => payload,
            Err(e) => {
                return Attempt::Failed {
                    kind: FetchErrorKind::Server,
                    status: Some(status),
                    code: status.to_string(),
                    message: format!("undecodable body: {}", e),
                    payload: None,
                }
            }
        };

        if self.policy.is_empty_result(&payload) {
            let key = self.policy.empty_collection.as_deref().unwrap_or_default();
            return Attempt::Failed {
                kind: FetchErrorKind::EmptyResult,
                status: Some(status),
                code: format!("{} (empty {})", status, key),
                message: format!("'{}' is empty", key),
                payload: Some(payload),
            };
        }

        Attempt::Success { status, payload }
    }

    /// Looks up a cached payload; unreadable entries count as misses
    ///
    /// Cache I/O runs on the blocking pool so concurrent hits do not stall
    /// runtime workers.
    async fn cached(&self, digest: &str, label: &str) -> Option<Value> {
        let cache = Arc::clone(self.cache.as_ref()?);
        let key = digest.to_string();
        let lookup = tokio::task::spawn_blocking(move || cache.get(&key))
            .await
            .unwrap_or_else(|e| Err(CacheError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))));

        match lookup {
            Ok(Some(payload)) => {
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                tracing::info!(url = %label, digest, "Using cache ({}) for {}...", digest, label);
                Some(payload)
            }
            Ok(None) => {
                tracing::debug!(url = %label, digest, "Cache miss for {}", label);
                None
            }
            Err(e) => {
                tracing::warn!(url = %label, digest, "Ignoring unreadable cache entry: {}", e);
                None
            }
        }
    }

    /// Writes a successful payload to the cache; failures are logged only
    async fn store(&self, digest: &str, payload: &Value) {
        let Some(cache) = self.cache.as_ref().map(Arc::clone) else {
            return;
        };
        let key = digest.to_string();
        let payload = payload.clone();
        let written = tokio::task::spawn_blocking(move || cache.put(&key, &payload))
            .await
            .unwrap_or_else(|e| Err(CacheError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))));

        if let Err(e) = written {
            tracing::warn!(digest, "Failed to write cache entry: {}", e);
        }
    }
}
