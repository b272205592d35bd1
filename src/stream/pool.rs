//! # Fan-out / fan-in worker pool.
//!
//! ```text
//!                 ┌─► worker 1 ─┐
//! input ──(lock)──┼─► worker 2 ─┼──► output (completion order)
//!                 └─► worker N ─┘
//! ```
//!
//! Workers share the input receiver behind an async mutex and each own a clone of the
//! output sender, so the output closes exactly when the last worker exits.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::trace;

use super::pipeline::{Pipeline, Stream, forward, next};
use crate::error::{ConfigError, ensure_nonzero};

impl Pipeline {
    /// Distributes `input` across `workers` concurrent invocations of `f`.
    ///
    /// Results are emitted in completion order. Returns [`ConfigError`] if `workers == 0`.
    pub fn pool<J, R, F, Fut>(
        &self,
        input: Stream<J>,
        workers: usize,
        f: F,
    ) -> Result<Stream<R>, ConfigError>
    where
        J: Send + 'static,
        R: Send + 'static,
        F: Fn(J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let workers = ensure_nonzero("workers", workers)?;
        let (tx, rx) = self.channel();
        let input = Arc::new(Mutex::new(input));
        let f = Arc::new(f);

        for id in 0..workers {
            let token = self.token().clone();
            let input = Arc::clone(&input);
            let f = Arc::clone(&f);
            let tx = tx.clone();
            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = input.lock().await;
                        next(&token, &mut rx).await
                    };
                    let Some(job) = job else { break };

                    let res = tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        res = (*f)(job) => res,
                    };
                    if !forward(&token, &tx, res).await {
                        break;
                    }
                }
                trace!(worker = id, "pool worker exiting");
            });
        }
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::super::pipeline::drain;
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test(start_paused = true)]
    async fn every_job_produces_one_result() {
        let p = Pipeline::new(CancellationToken::new());
        let jobs = p.source(1..=10u64);
        let results = p
            .pool(jobs, 4, |n: u64| async move {
                tokio::time::sleep(Duration::from_millis(50 + (n * 37) % 150)).await;
                (n, n * n)
            })
            .unwrap();

        let mut out = drain(results).await;
        out.sort_unstable();
        let expected: Vec<(u64, u64)> = (1..=10).map(|n| (n, n * n)).collect();
        assert_eq!(out, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn results_follow_completion_order() {
        let p = Pipeline::new(CancellationToken::new());
        let jobs = p.source([300u64, 10]);
        let results = p
            .pool(jobs, 2, |ms: u64| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                ms
            })
            .unwrap();
        assert_eq!(drain(results).await, [10, 300]);
    }

    #[tokio::test(start_paused = true)]
    async fn workers_run_concurrently_up_to_count() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let p = Pipeline::new(CancellationToken::new());
        let (r, pk) = (Arc::clone(&running), Arc::clone(&peak));
        let results = p
            .pool(p.source(0..12), 3, move |_: i32| {
                let (r, pk) = (Arc::clone(&r), Arc::clone(&pk));
                async move {
                    let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                    pk.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    r.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .unwrap();
        assert_eq!(drain(results).await.len(), 12);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_workers_and_closes_output() {
        let token = CancellationToken::new();
        let p = Pipeline::new(token.clone());
        let mut results = p
            .pool(p.source(0u32..), 4, |n| async move {
                tokio::time::sleep(Duration::from_millis(80)).await;
                n * 10
            })
            .unwrap();
        assert!(results.recv().await.is_some());
        token.cancel();
        let rest = drain(results).await;
        assert!(rest.len() <= 1);
    }

    #[tokio::test]
    async fn zero_workers_rejected() {
        let p = Pipeline::new(CancellationToken::new());
        let res = p.pool(p.source(0..1), 0, |x: i32| async move { x });
        assert!(res.is_err());
    }
}
