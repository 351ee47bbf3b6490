//! Circuit breaking per operation class.
//!
//! Each remote operation class gets its own failure tally. Once failures
//! reach the threshold the breaker opens and further attempts for that
//! class short-circuit without touching the network, until a cool-down
//! elapses and a single half-open probe is admitted.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Operation classes tracked by the breaker registry.
///
/// A typed enum rather than free-form strings: the set of classes is closed
/// and a typo cannot silently create a fresh, always-closed breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpContext {
    SearchProduct,
    CreateProduct,
    SearchPrice,
    CreatePrice,
    FetchBatch,
    WriteBack,
}

impl OpContext {
    pub const ALL: [OpContext; 6] = [
        OpContext::SearchProduct,
        OpContext::CreateProduct,
        OpContext::SearchPrice,
        OpContext::CreatePrice,
        OpContext::FetchBatch,
        OpContext::WriteBack,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OpContext::SearchProduct => "search-product",
            OpContext::CreateProduct => "create-product",
            OpContext::SearchPrice => "search-price",
            OpContext::CreatePrice => "create-price",
            OpContext::FetchBatch => "fetch-batch",
            OpContext::WriteBack => "write-back",
        }
    }

    fn index(self) -> usize {
        match self {
            OpContext::SearchProduct => 0,
            OpContext::CreateProduct => 1,
            OpContext::SearchPrice => 2,
            OpContext::CreatePrice => 3,
            OpContext::FetchBatch => 4,
            OpContext::WriteBack => 5,
        }
    }
}

/// Breaker state as observed at admission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Healthy; calls pass through.
    Closed,
    /// Unhealthy; calls short-circuit until the cool-down elapses.
    Open,
    /// Cool-down elapsed; one probe call is in flight.
    HalfOpen,
}

#[derive(Debug)]
struct Breaker {
    failures: u32,
    state: CircuitState,
    opened_at: Option<Instant>,
}

impl Breaker {
    fn new() -> Self {
        Self {
            failures: 0,
            state: CircuitState::Closed,
            opened_at: None,
        }
    }
}

/// Consecutive failures before a breaker opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
/// How long an open breaker blocks before admitting a half-open probe.
pub const DEFAULT_COOL_DOWN: Duration = Duration::from_secs(30);

/// Registry of breakers, one per [`OpContext`].
///
/// Owned by the retry handler and injected where needed; state is shared
/// across the bounded-concurrency record pipelines through an internal mutex.
pub struct BreakerRegistry {
    breakers: Mutex<[Breaker; 6]>,
    threshold: u32,
    cool_down: Duration,
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOL_DOWN)
    }
}

impl BreakerRegistry {
    #[must_use]
    pub fn new(threshold: u32, cool_down: Duration) -> Self {
        Self {
            breakers: Mutex::new([
                Breaker::new(),
                Breaker::new(),
                Breaker::new(),
                Breaker::new(),
                Breaker::new(),
                Breaker::new(),
            ]),
            threshold: threshold.max(1),
            cool_down,
        }
    }

    /// Ask whether a call of this class may proceed.
    ///
    /// Open breakers transition to `HalfOpen` once the cool-down has
    /// elapsed, admitting exactly one probe; the probe's outcome decides
    /// whether the breaker closes again or re-opens.
    pub fn admit(&self, ctx: OpContext) -> CircuitState {
        let mut breakers = self.breakers.lock().expect("breaker lock poisoned");
        let breaker = &mut breakers[ctx.index()];

        match breaker.state {
            CircuitState::Closed => CircuitState::Closed,
            CircuitState::HalfOpen => CircuitState::Open, // probe already in flight
            CircuitState::Open => {
                let cooled = breaker
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.cool_down);
                if cooled {
                    breaker.state = CircuitState::HalfOpen;
                    CircuitState::HalfOpen
                } else {
                    CircuitState::Open
                }
            }
        }
    }

    /// Record a successful call of this class.
    pub fn record_success(&self, ctx: OpContext) {
        let mut breakers = self.breakers.lock().expect("breaker lock poisoned");
        let breaker = &mut breakers[ctx.index()];
        breaker.failures = 0;
        breaker.state = CircuitState::Closed;
        breaker.opened_at = None;
    }

    /// Record a failed call of this class.
    pub fn record_failure(&self, ctx: OpContext) {
        let mut breakers = self.breakers.lock().expect("breaker lock poisoned");
        let breaker = &mut breakers[ctx.index()];
        breaker.failures += 1;

        let failed_probe = breaker.state == CircuitState::HalfOpen;
        if failed_probe || breaker.failures >= self.threshold {
            if breaker.state != CircuitState::Open {
                tracing::warn!(
                    context = ctx.as_str(),
                    failures = breaker.failures,
                    "circuit breaker opened"
                );
            }
            breaker.state = CircuitState::Open;
            breaker.opened_at = Some(Instant::now());
        }
    }

    /// Current state of a breaker without side effects.
    pub fn state(&self, ctx: OpContext) -> CircuitState {
        self.breakers.lock().expect("breaker lock poisoned")[ctx.index()].state
    }
}
