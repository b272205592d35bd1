//! # Cancellation tokens and cancellable waits.
//!
//! The cancellation token is [`tokio_util::sync::CancellationToken`], re-exported here:
//! - `cancel()` is idempotent and wakes every current and future waiter;
//! - `child_token()` derives a token that is cancelled whenever its parent is,
//!   while cancelling the child leaves the parent untouched;
//! - `cancelled().await` suspends the calling task until cancellation.
//!
//! On top of it this module provides the two races every primitive is built from:
//! [`run_cancellable`] (operation vs. token) and [`with_timeout`] (operation vs. token vs. deadline).
//!
//! ```text
//! root ──► child_token() ──► child_token()
//!  │            │                 │
//!  cancel() ────┴─────────────────┘   (cascade, no polling)
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time;
pub use tokio_util::sync::CancellationToken;

use crate::error::FlowError;

/// Creates a root token, or a child of `parent` when one is given.
pub fn new_token(parent: Option<&CancellationToken>) -> CancellationToken {
    match parent {
        Some(p) => p.child_token(),
        None => CancellationToken::new(),
    }
}

/// Runs `fut` until it completes or `token` fires, whichever happens first.
///
/// Cancellation wins ties: an already-cancelled token never polls `fut`.
pub async fn run_cancellable<F, T>(token: &CancellationToken, fut: F) -> Result<T, FlowError>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(FlowError::Canceled),
        out = fut => Ok(out),
    }
}

/// Runs a fallible `fut` with a deadline.
///
/// Returns [`FlowError::Timeout`] when `timeout` elapses first and
/// [`FlowError::Canceled`] when `token` fires first. A zero timeout means no deadline.
pub async fn with_timeout<F, T>(
    token: &CancellationToken,
    timeout: Duration,
    fut: F,
) -> Result<T, FlowError>
where
    F: Future<Output = Result<T, FlowError>>,
{
    if timeout == Duration::ZERO {
        return run_cancellable(token, fut).await?;
    }
    match run_cancellable(token, time::timeout(timeout, fut)).await? {
        Ok(res) => res,
        Err(_elapsed) => Err(FlowError::Timeout { timeout }),
    }
}

/// Sleeps for `delay` unless `token` fires first.
pub(crate) async fn sleep_cancellable(
    token: &CancellationToken,
    delay: Duration,
) -> Result<(), FlowError> {
    run_cancellable(token, time::sleep(delay)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn parent_cancel_cascades_to_descendants() {
        let root = new_token(None);
        let child = new_token(Some(&root));
        let grandchild = child.child_token();

        root.cancel();
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[tokio::test]
    async fn child_cancel_does_not_touch_parent() {
        let root = new_token(None);
        let child = new_token(Some(&root));
        child.cancel();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_wakes_every_waiter() {
        let token = CancellationToken::new();
        let woke = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let t = token.clone();
            let w = Arc::clone(&woke);
            handles.push(tokio::spawn(async move {
                t.cancelled().await;
                w.fetch_add(1, Ordering::SeqCst);
            }));
        }
        token.cancel();
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(woke.load(Ordering::SeqCst), 8);
        // Late waiters return immediately.
        token.cancelled().await;
    }

    #[tokio::test]
    async fn run_cancellable_prefers_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let res = run_cancellable(&token, async { 7 }).await;
        assert_eq!(res, Err(FlowError::Canceled));
    }

    #[tokio::test(start_paused = true)]
    async fn with_timeout_reports_deadline() {
        let token = CancellationToken::new();
        let res: Result<(), FlowError> = with_timeout(&token, Duration::from_millis(300), async {
            time::sleep(Duration::from_millis(800)).await;
            Ok(())
        })
        .await;
        assert_eq!(
            res,
            Err(FlowError::Timeout {
                timeout: Duration::from_millis(300)
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn with_timeout_passes_through_result() {
        let token = CancellationToken::new();
        let res = with_timeout(&token, Duration::from_secs(1), async { Ok::<_, FlowError>(5) }).await;
        assert_eq!(res, Ok(5));

        let res = with_timeout(&token, Duration::ZERO, async {
            Err::<(), _>(FlowError::fail("boom"))
        })
        .await;
        assert_eq!(res, Err(FlowError::fail("boom")));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_aborts_on_cancel() {
        let token = CancellationToken::new();
        let t = token.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(10)).await;
            t.cancel();
        });
        let start = time::Instant::now();
        let res = sleep_cancellable(&token, Duration::from_secs(60)).await;
        assert_eq!(res, Err(FlowError::Canceled));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
