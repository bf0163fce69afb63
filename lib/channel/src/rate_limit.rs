//! Rate limiting for reconnect attempts.
//!
//! Each ingestion task owns its limiter, so one misbehaving node stream
//! cannot starve another's reconnects.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Rate limit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum permits per window.
    pub max_requests: u32,
    /// Window duration in seconds.
    pub window_seconds: u32,
}

impl RateLimitConfig {
    /// Creates a new rate limit configuration.
    #[must_use]
    pub fn new(max_requests: u32, window_seconds: u32) -> Self {
        Self {
            max_requests,
            window_seconds,
        }
    }

    /// Common limit: permits per second.
    #[must_use]
    pub fn per_second(max_requests: u32) -> Self {
        Self::new(max_requests, 1)
    }

    /// Minimum spacing between two permits.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.window_seconds)) / self.max_requests.max(1)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_second(1)
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    /// A permit is available.
    Allowed,
    /// The next permit is available after `retry_after`.
    Exceeded { retry_after: Duration },
}

impl RateLimitResult {
    /// Returns true if a permit is available.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Spaces permits evenly so that at most `max_requests` are handed out per window.
///
/// The first permit is immediate.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a new rate limiter with the given configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            last: Mutex::new(None),
        }
    }

    fn evaluate(&self, last: Option<Instant>, now: Instant) -> RateLimitResult {
        match last {
            Some(last) if now < last + self.config.interval() => RateLimitResult::Exceeded {
                retry_after: last + self.config.interval() - now,
            },
            _ => RateLimitResult::Allowed,
        }
    }

    /// Checks whether a permit is available without taking it.
    pub async fn check(&self) -> RateLimitResult {
        let last = *self.last.lock().await;
        self.evaluate(last, Instant::now())
    }

    /// Takes a permit if one is available.
    pub async fn try_acquire(&self) -> RateLimitResult {
        let mut last = self.last.lock().await;
        let now = Instant::now();
        let result = self.evaluate(*last, now);
        if result.is_allowed() {
            *last = Some(now);
        }
        result
    }

    /// Waits for a permit.
    ///
    /// Returns false if `cancel` fires first; no permit is taken then.
    pub async fn take(&self, cancel: &CancellationToken) -> bool {
        loop {
            match self.try_acquire().await {
                RateLimitResult::Allowed => return true,
                RateLimitResult::Exceeded { retry_after } => {
                    tokio::select! {
                        () = cancel.cancelled() => return false,
                        () = tokio::time::sleep(retry_after) => {}
                    }
                }
            }
        }
    }

    /// Forgets the last permit, making the next one immediate.
    pub async fn reset(&self) {
        *self.last.lock().await = None;
    }

    /// Returns the current configuration.
    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
