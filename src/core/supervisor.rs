//! # SupervisorLoop: keep one task alive.
//!
//! Runs a restartable [`Task`](crate::Task) forever:
//! - success → backoff resets, the task restarts immediately;
//! - failure → sleep per [`BackoffPolicy`] (growing, capped), then restart;
//! - cancellation → terminal stop, no further restarts.
//!
//! ## State machine
//! ```text
//!            ┌───────── Ok ─────────┐
//!            ▼                      │
//!  ──► [Running] ── run_once() ─────┤
//!            ▲                      │ Err(op failure / timeout / panic)
//!            │                      ▼
//!            └── sleep done ── [Backoff]
//!
//!  token cancelled or Err(Canceled) from any state ──► [Stopped] (terminal)
//! ```
//!
//! ## Rules
//! - Attempts run **sequentially** (never two at once)
//! - Each attempt gets a **child token**; a per-attempt timeout cancels only that child
//! - Panics inside the task are caught and counted as failures
//! - The consecutive-failure counter **resets on success**

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::{sync::watch, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cancel::sleep_cancellable;
use crate::core::config::Config;
use crate::error::FlowError;
use crate::policies::BackoffPolicy;
use crate::tasks::{Task, TaskRef};

/// Observable lifecycle state of a [`SupervisorLoop`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    /// Not started yet.
    Idle,
    /// An attempt is executing.
    Running,
    /// Waiting before the next restart.
    Backoff,
    /// Terminal: cancellation was observed.
    Stopped,
}

/// Counters reported when a [`SupervisorLoop`] stops.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RunSummary {
    /// Attempts started over the loop's lifetime.
    pub attempts: u64,
    /// Attempts that ended in an operational failure.
    pub failures: u64,
}

/// Supervises a single task with restart and backoff.
pub struct SupervisorLoop {
    task: TaskRef,
    backoff: BackoffPolicy,
    timeout: Option<Duration>,
    state: watch::Sender<SupervisorState>,
    attempts: AtomicU64,
    failures: AtomicU64,
}

impl SupervisorLoop {
    /// Creates a loop for `task` restarting with `backoff` and no per-attempt timeout.
    pub fn new(task: TaskRef, backoff: BackoffPolicy) -> Self {
        let (state, _rx) = watch::channel(SupervisorState::Idle);
        Self {
            task,
            backoff,
            timeout: None,
            state,
            attempts: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Creates a loop using `cfg.backoff` and `cfg.attempt_timeout()`.
    pub fn with_config(task: TaskRef, cfg: &Config) -> Self {
        Self::new(task, cfg.backoff).with_timeout(cfg.attempt_timeout())
    }

    /// Sets the per-attempt timeout (`None` = unbounded attempts).
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|d| *d > Duration::ZERO);
        self
    }

    /// Current state.
    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// Subscribes to state changes.
    pub fn watch(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Operational failures so far.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Runs until `token` is cancelled (or the task reports [`FlowError::Canceled`]).
    ///
    /// Operational errors are logged and swallowed; only cancellation ends the loop.
    pub async fn run(&self, token: &CancellationToken) -> RunSummary {
        let mut consecutive: u32 = 0;

        loop {
            if token.is_cancelled() {
                break;
            }
            self.state.send_replace(SupervisorState::Running);
            let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;

            match run_once(self.task.as_ref(), token, self.timeout).await {
                Ok(()) => {
                    consecutive = 0;
                    debug!(task = self.task.name(), attempt, "attempt completed; restarting");
                    tokio::task::yield_now().await;
                }
                Err(FlowError::Canceled) => break,
                Err(_) if token.is_cancelled() => break,
                Err(e) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    let delay = self.backoff.next(consecutive);
                    consecutive = consecutive.saturating_add(1);
                    warn!(
                        task = self.task.name(),
                        attempt,
                        delay = ?delay,
                        error = %e,
                        "attempt failed; backing off"
                    );

                    self.state.send_replace(SupervisorState::Backoff);
                    if sleep_cancellable(token, delay).await.is_err() {
                        break;
                    }
                }
            }
        }

        self.state.send_replace(SupervisorState::Stopped);
        let summary = RunSummary {
            attempts: self.attempts(),
            failures: self.failures(),
        };
        debug!(task = self.task.name(), ?summary, "supervisor stopped");
        summary
    }
}

/// Executes one attempt under a child token, with optional timeout and panic capture.
async fn run_once<T: Task + ?Sized>(
    task: &T,
    parent: &CancellationToken,
    timeout: Option<Duration>,
) -> Result<(), FlowError> {
    let child = parent.child_token();
    let attempt = AssertUnwindSafe(task.run(child.clone())).catch_unwind();

    let res = match timeout {
        Some(dur) => match time::timeout(dur, attempt).await {
            Ok(r) => r,
            Err(_elapsed) => {
                child.cancel();
                return Err(FlowError::Timeout { timeout: dur });
            }
        },
        None => attempt.await,
    };

    res.unwrap_or_else(|panic| {
        let info = if let Some(msg) = panic.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = panic.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_string()
        };
        Err(FlowError::fatal(format!("task panicked: {info}")))
    })
}
