//! # Retry with exponential backoff and jitter.
//!
//! ```text
//! attempt 1 ──Err──► sleep(backoff(0) + jitter) ──► attempt 2 ──Err──► sleep(backoff(1) + jitter) ──► ...
//!     │                    │ token fires → Canceled                       │
//!     └─ Ok → return       └────────────────────────────────────────────  last attempt Err → return it
//! ```
//!
//! Errors that are not [retryable](FlowError::is_retryable) end the loop at once.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cancel::{run_cancellable, sleep_cancellable};
use crate::core::Config;
use crate::error::{ConfigError, FlowError};
use crate::policies::{BackoffPolicy, JitterPolicy};

const RETRY_CEILING: Duration = Duration::from_millis(800);
const RETRY_JITTER: Duration = Duration::from_millis(100);

/// Bounded retry loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: BackoffPolicy,
}

impl RetryPolicy {
    /// Up to `max_attempts` attempts; waits start at `base`, double each time up to 800ms
    /// (or `base` if larger), plus up to 100ms of random jitter.
    ///
    /// Returns [`ConfigError`] if `max_attempts == 0`.
    pub fn new(max_attempts: u32, base: Duration) -> Result<Self, ConfigError> {
        let backoff = BackoffPolicy {
            first: base,
            max: base.max(RETRY_CEILING),
            factor: 2.0,
            jitter: JitterPolicy::Additive { max: RETRY_JITTER },
        };
        Self::with_backoff(max_attempts, backoff)
    }

    /// Uses `cfg.retry_attempts` and `cfg.backoff` with `cfg.retry_jitter`.
    pub fn from_config(cfg: &Config) -> Result<Self, ConfigError> {
        Self::with_backoff(cfg.retry_attempts, cfg.backoff.with_jitter(cfg.retry_jitter))
    }

    /// Up to `max_attempts` attempts separated by `backoff`.
    pub fn with_backoff(max_attempts: u32, backoff: BackoffPolicy) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "must be at least 1"));
        }
        Ok(Self {
            max_attempts,
            backoff,
        })
    }

    /// Maximum number of attempts.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff between attempts.
    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Runs `op` until it succeeds, fails fatally or runs out of attempts.
    ///
    /// Each attempt and each wait race `token`; cancellation returns [`FlowError::Canceled`].
    pub async fn run<T, F, Fut>(&self, token: &CancellationToken, mut op: F) -> Result<T, FlowError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FlowError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let err = match run_cancellable(token, op()).await? {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };
            attempt += 1;
            if !err.is_retryable() || attempt >= self.max_attempts {
                return Err(err);
            }

            let delay = self.backoff.next(attempt - 1);
            debug!(attempt, delay = ?delay, error = %err, "attempt failed; retrying");
            sleep_cancellable(token, delay).await?;
        }
    }
}

/// Shorthand for `RetryPolicy::new(max_attempts, base)?.run(token, op)`.
///
/// An invalid `max_attempts` is reported as [`FlowError::Fatal`].
pub async fn retry<T, F, Fut>(
    token: &CancellationToken,
    max_attempts: u32,
    base: Duration,
    op: F,
) -> Result<T, FlowError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FlowError>>,
{
    let policy = RetryPolicy::new(max_attempts, base).map_err(FlowError::fatal)?;
    policy.run(token, op).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::{self, Instant};

    fn no_jitter(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::with_backoff(max_attempts, BackoffPolicy::default()).unwrap()
    }

    #[test]
    fn zero_attempts_rejected() {
        assert!(RetryPolicy::new(0, Duration::from_millis(10)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let start = Instant::now();
        let res = no_jitter(5)
            .run(&CancellationToken::new(), move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FlowError::fail("transient"))
                } else {
                    Ok("done")
                }
            })
            .await;
        assert_eq!(res, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms + 200ms of backoff.
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_return_last_error() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let res: Result<(), _> = retry(&CancellationToken::new(), 3, Duration::from_millis(10), move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Err(FlowError::fail(format!("failure {n}")))
        })
        .await;
        assert_eq!(res, Err(FlowError::fail("failure 2")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let res: Result<(), _> = no_jitter(5)
            .run(&CancellationToken::new(), move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(FlowError::fatal("bad input"))
            })
            .await;
        assert_eq!(res, Err(FlowError::fatal("bad input")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_aborts_the_wait() {
        let token = CancellationToken::new();
        let t = token.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(50)).await;
            t.cancel();
        });
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let policy = RetryPolicy::with_backoff(10, BackoffPolicy::doubling(Duration::from_secs(60)))
            .unwrap();
        let start = Instant::now();
        let res: Result<(), _> = policy
            .run(&token, move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err(FlowError::fail("down")) }
            })
            .await;
        assert_eq!(res, Err(FlowError::Canceled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn jitter_stays_within_bounds() {
        let start = Instant::now();
        let res: Result<(), _> = retry(&CancellationToken::new(), 2, Duration::from_millis(100), || async {
            Err(FlowError::fail("down"))
        })
        .await;
        assert!(res.is_err());
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(100));
        assert!(waited <= Duration::from_millis(200));
    }

    #[test]
    fn from_config_uses_defaults() {
        let policy = RetryPolicy::from_config(&Config::default()).unwrap();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff().first, Duration::from_millis(100));
        assert_eq!(
            policy.backoff().jitter,
            JitterPolicy::Additive {
                max: Duration::from_millis(100)
            }
        );
    }
}
