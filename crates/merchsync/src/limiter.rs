//! Adaptive rate limiting for remote platform calls.
//!
//! A token bucket with discrete window refill: every window tick the bucket
//! is topped up to capacity rather than drip-fed, which matches how the
//! remote platform meters its own quota. An adaptive multiplier scales the
//! effective cost of each request: errors tighten it (each request burns
//! more of the bucket), successes relax it back toward 1.0.
//!
//! `acquire()` suspends the caller until a slot is available; it sleeps for
//! the remainder of the current window and re-evaluates, never busy-polls.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::SyncError;

/// Default request budgets for the remote platform.
pub mod rate_limits {
    /// Requests per window in live mode.
    pub const DEFAULT_REQUESTS_PER_WINDOW: u32 = 25;
    /// Window length in milliseconds.
    pub const WINDOW_MS: u64 = 1_000;
}

/// Multiplier growth factor applied on success.
const MULTIPLIER_GROWTH: f64 = 1.05;
/// Multiplier decay factor applied on a generic error.
const MULTIPLIER_DECAY: f64 = 0.7;
/// Steeper decay applied on a rate-limit-class error.
const MULTIPLIER_DECAY_RATE_LIMITED: f64 = 0.5;
/// Lower bound of the adaptive multiplier.
const MULTIPLIER_FLOOR: f64 = 0.1;

struct Bucket {
    /// Tokens remaining in the current window.
    tokens: f64,
    /// Start of the current window.
    window_started: Instant,
    /// Adaptive multiplier in (MULTIPLIER_FLOOR, 1.0].
    multiplier: f64,
}

/// Adaptive token-bucket rate limiter.
///
/// Cheap to clone; clones share the same bucket.
#[derive(Clone)]
pub struct AdaptiveRateLimiter {
    bucket: Arc<Mutex<Bucket>>,
    capacity: u32,
    window: Duration,
}

impl AdaptiveRateLimiter {
    /// Create a limiter allowing `requests_per_window` sends per window.
    ///
    /// A zero budget is clamped to 1 so the limiter can never deadlock.
    #[must_use]
    pub fn new(requests_per_window: u32, window: Duration) -> Self {
        let capacity = requests_per_window.max(1);
        Self {
            bucket: Arc::new(Mutex::new(Bucket {
                tokens: f64::from(capacity),
                window_started: Instant::now(),
                multiplier: 1.0,
            })),
            capacity,
            window,
        }
    }

    /// Limiter with the default live-mode budget.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(
            rate_limits::DEFAULT_REQUESTS_PER_WINDOW,
            Duration::from_millis(rate_limits::WINDOW_MS),
        )
    }

    /// Suspend until a send slot is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                let now = Instant::now();

                // Discrete refill: top up to capacity once per window tick.
                if now.duration_since(bucket.window_started) >= self.window {
                    bucket.tokens = f64::from(self.capacity);
                    bucket.window_started = now;
                }

                // A tightened multiplier makes each request cost more of
                // the bucket, shrinking the effective per-window budget.
                let cost = 1.0 / bucket.multiplier;
                if bucket.tokens >= cost {
                    bucket.tokens -= cost;
                    return;
                }

                self.window
                    .saturating_sub(now.duration_since(bucket.window_started))
            };

            // Sleep out the rest of the window, then re-evaluate.
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// Relax the multiplier toward 1.0 after a successful call.
    pub async fn on_success(&self) {
        let mut bucket = self.bucket.lock().await;
        bucket.multiplier = (bucket.multiplier * MULTIPLIER_GROWTH).min(1.0);
    }

    /// Tighten the multiplier after a failed call.
    ///
    /// Rate-limit-class errors decay steeper than generic failures.
    pub async fn on_error(&self, err: &SyncError) {
        let decay = if err.is_rate_limited() {
            MULTIPLIER_DECAY_RATE_LIMITED
        } else {
            MULTIPLIER_DECAY
        };
        let mut bucket = self.bucket.lock().await;
        bucket.multiplier = (bucket.multiplier * decay).max(MULTIPLIER_FLOOR);
    }

    /// Current multiplier, for reporting.
    pub async fn multiplier(&self) -> f64 {
        self.bucket.lock().await.multiplier
    }
}
