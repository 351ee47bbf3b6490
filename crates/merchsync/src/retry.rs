//! Retry handling for migration operations.
//!
//! [`execute_with_retry`] wraps a single fallible operation with bounded,
//! jittered exponential backoff. Before every attempt it acquires a rate
//! limiter slot; after every attempt it feeds the outcome back to the
//! limiter and the per-context circuit breaker. Non-retryable errors
//! (validation, authentication, malformed requests) return immediately.
//!
//! Exhausting retries returns the last error; whether that is fatal to the
//! batch or just to one record is the caller's decision.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use crate::breaker::{BreakerRegistry, CircuitState, OpContext};
use crate::error::{Result, SyncError};
use crate::limiter::AdaptiveRateLimiter;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;
/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30_000;
/// Default maximum retry attempts per operation.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Configuration for retry operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Minimum delay between retries. Also the mandatory floor applied to
    /// rate-limit-class errors: no retry ever fires sooner than this.
    pub min_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Maximum number of retry attempts.
    pub max_retries: usize,
    /// Whether to add jitter to delays (prevents thundering-herd across
    /// the concurrent record pipelines).
    pub with_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            with_jitter: true,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration, max_retries: usize) -> Self {
        Self {
            min_delay,
            max_delay,
            max_retries,
            with_jitter: true,
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    /// Build an exponential backoff strategy from this configuration.
    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }
}

/// Shared attempt counter, incremented once per underlying attempt.
///
/// A record pipeline creates one and threads it through every remote call
/// it makes, so the final outcome can report total attempts for the record.
#[derive(Debug, Clone, Default)]
pub struct AttemptCounter(Arc<AtomicU32>);

impl AttemptCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Execute `op` with retry, rate limiting, and circuit breaking.
///
/// The breaker for `ctx` is consulted once up front: an open breaker
/// short-circuits without any network call. Each attempt then acquires a
/// limiter slot, runs, and reports its outcome to both the limiter and the
/// breaker before backoff is considered.
pub async fn execute_with_retry<T, F, Fut>(
    ctx: OpContext,
    limiter: &AdaptiveRateLimiter,
    breakers: &BreakerRegistry,
    config: &RetryConfig,
    attempts: Option<&AttemptCounter>,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if breakers.admit(ctx) == CircuitState::Open {
        return Err(SyncError::network(format!(
            "circuit breaker open for {}",
            ctx.as_str()
        )));
    }

    let attempt_op = || {
        if let Some(counter) = attempts {
            counter.bump();
        }
        let fut = op();
        async move {
            limiter.acquire().await;
            match fut.await {
                Ok(value) => {
                    limiter.on_success().await;
                    breakers.record_success(ctx);
                    Ok(value)
                }
                Err(err) => {
                    limiter.on_error(&err).await;
                    breakers.record_failure(ctx);
                    Err(err)
                }
            }
        }
    };

    attempt_op
        .retry(config.clone().into_backoff())
        .when(SyncError::is_retryable)
        .notify(|err: &SyncError, dur| {
            tracing::debug!(
                context = ctx.as_str(),
                delay_ms = dur.as_millis() as u64,
                error = %err,
                "retrying after transient failure"
            );
        })
        .await
}
