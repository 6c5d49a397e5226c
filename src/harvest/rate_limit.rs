//! Shared outbound rate limiter
//!
//! A sliding window: at most `max_requests` attempts may start within any
//! `window`. Callers that would exceed the rate wait for the oldest slot to
//! expire instead of failing. The state sits behind a FIFO-fair
//! `tokio::sync::Mutex`, so waiters are served in arrival order.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Rate limiter shared by every in-flight fetch
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum attempts per window
    max_requests: usize,

    /// Length of the window
    window: Duration,

    /// Start times of attempts still inside the window, oldest first
    issued: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter allowing `max_requests` per `window`
    ///
    /// A `max_requests` of zero is treated as one.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        let max_requests = max_requests.max(1) as usize;
        Self {
            max_requests,
            window,
            issued: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    /// Suspends until a slot is free, then takes it
    pub async fn acquire(&self) {
        // Holding the lock while sleeping keeps later callers queued behind
        // this one.
        let mut issued = self.issued.lock().await;

        loop {
            let now = Instant::now();
            while let Some(&oldest) = issued.front() {
                if now.duration_since(oldest) >= self.window {
                    issued.pop_front();
                } else {
                    break;
                }
            }

            if issued.len() < self.max_requests {
                issued.push_back(now);
                return;
            }

            let wait = match issued.front() {
                Some(&oldest) => self.window.saturating_sub(now.duration_since(oldest)),
                None => Duration::ZERO,
            };
            tracing::trace!("Rate limit reached, waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Number of slots currently taken within the window
    pub async fn in_window(&self) -> usize {
        let issued = self.issued.lock().await;
        let now = Instant::now();
        issued
            .iter()
            .filter(|&&t| now.duration_since(t) < self.window)
            .count()
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }
}
