//! # Bounded concurrency executor.
//!
//! Runs a batch of [`Task`](crate::Task)s with at most `limit` of them executing at once.
//!
//! ## Architecture
//! ```text
//! run(tasks) ──► JoinSet
//!                  ├─ job 1: acquire permit (cancellable) ──► task.run(child) ──► release
//!                  ├─ job 2: acquire permit (cancellable) ──► ...
//!                  └─ job N: cancelled before permit ──► Skipped
//!
//! join_next() in completion order ──► first Err wins, later errors are discarded
//! ```
//!
//! ## Rules
//! - Permits are owned by the job future, so they are released on success, failure and panic.
//! - A job whose permit wait loses the race against cancellation never runs its task.
//! - `run` returns after every job has finished or been skipped.

use std::sync::Arc;

use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ConfigError, FlowError, ensure_nonzero};
use crate::tasks::TaskRef;

/// How a single submitted task ended.
enum Outcome {
    Finished(Result<(), FlowError>),
    Skipped,
}

/// Executes tasks with a fixed concurrency ceiling.
///
/// One executor may serve several `run` calls at once; they share the same permits.
#[derive(Clone, Debug)]
pub struct BoundedExecutor {
    limit: usize,
    semaphore: Arc<Semaphore>,
}

impl BoundedExecutor {
    /// Creates an executor admitting at most `limit` concurrent tasks.
    ///
    /// Returns [`ConfigError`] if `limit == 0`.
    pub fn new(limit: usize) -> Result<Self, ConfigError> {
        let limit = ensure_nonzero("limit", limit)?;
        Ok(Self {
            limit,
            semaphore: Arc::new(Semaphore::new(limit)),
        })
    }

    /// Maximum number of concurrently running tasks.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of slots currently held by running tasks.
    pub fn in_use(&self) -> usize {
        self.limit - self.semaphore.available_permits()
    }

    /// Runs every task, honoring the concurrency ceiling.
    ///
    /// Returns the first error by completion order. If no task failed but cancellation
    /// prevented at least one task from starting, returns [`FlowError::Canceled`].
    /// A panicking task is reported as [`FlowError::Fatal`].
    pub async fn run(&self, token: &CancellationToken, tasks: Vec<TaskRef>) -> Result<(), FlowError> {
        let mut set = JoinSet::new();
        for task in tasks {
            let sem = Arc::clone(&self.semaphore);
            let ctx = token.child_token();
            set.spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = ctx.cancelled() => return Outcome::Skipped,
                    res = sem.acquire_owned() => match res {
                        Ok(permit) => permit,
                        Err(_closed) => return Outcome::Skipped,
                    },
                };
                Outcome::Finished(task.run(ctx).await)
            });
        }

        let mut first_error: Option<FlowError> = None;
        let mut skipped = 0usize;
        while let Some(joined) = set.join_next().await {
            let res = match joined {
                Ok(Outcome::Finished(res)) => res,
                Ok(Outcome::Skipped) => {
                    skipped += 1;
                    continue;
                }
                Err(join_err) => {
                    warn!(error = %join_err, "task aborted");
                    Err(FlowError::fatal(format!("task panicked: {join_err}")))
                }
            };
            if let Err(e) = res {
                if first_error.is_none() {
                    debug!(error = %e, "first task error recorded");
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None if skipped > 0 => {
                debug!(skipped, "tasks skipped due to cancellation");
                Err(FlowError::Canceled)
            }
            None => Ok(()),
        }
    }
}

/// Convenience wrapper: builds a [`BoundedExecutor`] and runs `tasks` once.
pub async fn run_bounded(
    token: &CancellationToken,
    tasks: Vec<TaskRef>,
    limit: usize,
) -> Result<(), FlowError> {
    let exec = BoundedExecutor::new(limit).map_err(FlowError::fatal)?;
    exec.run(token, tasks).await
}
