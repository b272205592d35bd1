//! # Circuit breaker.
//!
//! ## State machine
//! ```text
//!            failures ≥ threshold
//!  [Closed] ───────────────────────► [Open] ◄──────────┐
//!     ▲                                │               │ trial fails
//!     │ trial succeeds                 │ cool-down     │
//!     │                                ▼ elapsed       │
//!     └───────────────────────── [HalfOpen] ───────────┘
//! ```
//!
//! ## Rules
//! - Every transition happens under one lock, held only for the O(1) update.
//! - In `Open`, [`allow`](CircuitBreaker::allow) rejects with [`FlowError::CircuitOpen`]
//!   until the cool-down deadline; the first call after it moves to `HalfOpen`.
//! - `HalfOpen` admits at most `half_open_trials` calls until one reports back.
//!   Trials still unreported one cool-down after the breaker half-opened are
//!   presumed lost, and a fresh trial round starts.
//! - Reports arriving while `Open` (stragglers from before the trip) are ignored.
//!
//! Callers must pair every admitted call with [`on_success`](CircuitBreaker::on_success)
//! or [`on_failure`](CircuitBreaker::on_failure); [`call`](CircuitBreaker::call) does it for you.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{ConfigError, FlowError};

/// Breaker position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through; failures are counted.
    Closed,
    /// Calls are rejected until the cool-down elapses.
    Open,
    /// A limited number of trial calls probe the dependency.
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failures: u32,
    /// Cool-down end while `Open`; trial round expiry while `HalfOpen`.
    open_until: Instant,
    trials: u32,
    round: u64,
}

/// Admission granted by `admit`: the trial round it belongs to, if any.
type Ticket = Option<u64>;

/// Consecutive-failure circuit breaker.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use flowvisor::{BreakerState, CircuitBreaker, FlowError};
///
/// let cb = CircuitBreaker::new(2, Duration::from_secs(1)).unwrap();
/// for _ in 0..2 {
///     cb.allow().unwrap();
///     cb.on_failure();
/// }
/// assert_eq!(cb.state(), BreakerState::Open);
/// assert!(matches!(cb.allow(), Err(FlowError::CircuitOpen { .. })));
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cool_down: Duration,
    half_open_trials: u32,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker that opens after `threshold` consecutive failures
    /// and stays open for `cool_down`. One trial call is admitted in `HalfOpen`.
    ///
    /// Returns [`ConfigError`] if `threshold == 0`.
    pub fn new(threshold: u32, cool_down: Duration) -> Result<Self, ConfigError> {
        if threshold == 0 {
            return Err(ConfigError::invalid("threshold", "must be at least 1"));
        }
        Ok(Self {
            threshold,
            cool_down,
            half_open_trials: 1,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failures: 0,
                open_until: Instant::now(),
                trials: 0,
                round: 0,
            }),
        })
    }

    /// Sets how many trial calls `HalfOpen` admits concurrently (minimum 1).
    pub fn with_half_open_trials(mut self, trials: u32) -> Self {
        self.half_open_trials = trials.max(1);
        self
    }

    /// Current position. An expired `Open` is reported as `Open` until the next `allow`.
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Consecutive failures counted in `Closed`.
    pub fn failures(&self) -> u32 {
        self.lock().failures
    }

    /// Asks permission for one guarded call.
    pub fn allow(&self) -> Result<(), FlowError> {
        self.admit().map(|_| ())
    }

    fn admit(&self) -> Result<Ticket, FlowError> {
        let mut inner = self.lock();
        let now = Instant::now();
        match inner.state {
            BreakerState::Closed => Ok(None),
            BreakerState::Open if now >= inner.open_until => {
                inner.state = BreakerState::HalfOpen;
                inner.failures = 0;
                debug!("breaker half-open; admitting trial call");
                Ok(Some(self.start_round(&mut inner, now)))
            }
            BreakerState::Open => Err(FlowError::CircuitOpen {
                retry_in: inner.open_until - now,
            }),
            BreakerState::HalfOpen if inner.trials < self.half_open_trials => {
                inner.trials += 1;
                Ok(Some(inner.round))
            }
            BreakerState::HalfOpen if now >= inner.open_until => {
                warn!(trials = inner.trials, "half-open trials never reported; starting a new round");
                Ok(Some(self.start_round(&mut inner, now)))
            }
            BreakerState::HalfOpen => Err(FlowError::CircuitOpen {
                retry_in: inner.open_until - now,
            }),
        }
    }

    fn start_round(&self, inner: &mut Inner, now: Instant) -> u64 {
        inner.round = inner.round.wrapping_add(1);
        inner.trials = 1;
        inner.open_until = now.checked_add(self.cool_down).unwrap_or(now);
        inner.round
    }

    /// Reports that an admitted call succeeded.
    pub fn on_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => inner.failures = 0,
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Closed;
                inner.failures = 0;
                inner.trials = 0;
                debug!("breaker closed");
            }
            BreakerState::Open => {}
        }
    }

    /// Reports that an admitted call failed.
    pub fn on_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.threshold {
                    warn!(failures = inner.failures, cool_down = ?self.cool_down, "breaker opened");
                    self.trip(&mut inner);
                }
            }
            BreakerState::HalfOpen => {
                warn!(cool_down = ?self.cool_down, "trial call failed; breaker re-opened");
                self.trip(&mut inner);
            }
            BreakerState::Open => {}
        }
    }

    /// Runs `fut` behind the breaker, reporting its outcome.
    ///
    /// [`FlowError::Canceled`] is not counted as a failure, and neither is dropping the
    /// returned future before it finishes: in both cases a trial slot it held is returned.
    pub async fn call<T, F>(&self, fut: F) -> Result<T, FlowError>
    where
        F: Future<Output = Result<T, FlowError>>,
    {
        let trial = Trial {
            breaker: self,
            ticket: self.admit()?,
            reported: false,
        };
        let res = fut.await;
        trial.report(&res);
        res
    }

    fn release_trial(&self, ticket: Ticket) {
        let Some(round) = ticket else {
            return;
        };
        let mut inner = self.lock();
        if inner.state == BreakerState::HalfOpen && inner.round == round {
            inner.trials = inner.trials.saturating_sub(1);
        }
    }

    fn trip(&self, inner: &mut Inner) {
        let now = Instant::now();
        inner.state = BreakerState::Open;
        inner.open_until = now.checked_add(self.cool_down).unwrap_or(now);
        inner.trials = 0;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admission held by [`CircuitBreaker::call`]; returns its trial slot if dropped unreported.
struct Trial<'a> {
    breaker: &'a CircuitBreaker,
    ticket: Ticket,
    reported: bool,
}

impl Trial<'_> {
    fn report<T>(mut self, res: &Result<T, FlowError>) {
        self.reported = true;
        match res {
            Ok(_) => self.breaker.on_success(),
            Err(FlowError::Canceled) => self.breaker.release_trial(self.ticket),
            Err(_) => self.breaker.on_failure(),
        }
    }
}

impl Drop for Trial<'_> {
    fn drop(&mut self) {
        if !self.reported {
            self.breaker.release_trial(self.ticket);
        }
    }
}
