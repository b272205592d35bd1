//! # Single-flight call coalescing.
//!
//! ```text
//! caller A ── do_call(k) ──► no record: insert, run f ──► remove record, publish ──► (v, joined?)
//! caller B ── do_call(k) ──► record found: joined += 1, wait ─────────────────────► (v, true)
//! caller C ── do_call(k) ──► (after removal) fresh record, runs f again
//! ```
//!
//! ## Rules
//! - At most one execution of `f` per key is in flight.
//! - The record is removed as soon as its execution ends, so later calls run fresh.
//! - If the executing caller is cancelled or dropped, the key is freed and each
//!   waiter whose own token is still live starts over: one of them runs its `f`,
//!   the rest join it.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::cancel::run_cancellable;
use crate::error::FlowError;

/// What the executing caller publishes to its waiters.
#[derive(Clone)]
enum Outcome<V> {
    Pending,
    Done(Result<V, FlowError>),
    Abandoned,
}

enum Role<V> {
    Leader(Arc<Call<V>>),
    Waiter(watch::Receiver<Outcome<V>>),
}

struct Call<V> {
    result: watch::Sender<Outcome<V>>,
    joined: AtomicUsize,
}

/// Deduplicates concurrent calls that share a key.
pub struct Singleflight<K, V> {
    calls: Mutex<HashMap<K, Arc<Call<V>>>>,
}

impl<K, V> Default for Singleflight<K, V> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> Singleflight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` for `key` unless a call for it is already in flight, in which case
    /// this caller waits for that call's result instead.
    ///
    /// Returns the result and whether it was shared: always `true` for waiters, and
    /// for the executing caller `true` only if someone joined while it ran.
    ///
    /// If the executing caller is cancelled or dropped before `f` finishes, a waiter
    /// does not inherit that cancellation: while its own `token` is live it retries,
    /// running its own `f` if no other waiter got there first.
    pub async fn do_call<F, Fut>(
        &self,
        token: &CancellationToken,
        key: K,
        f: F,
    ) -> (Result<V, FlowError>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FlowError>>,
    {
        loop {
            match self.enter(&key) {
                Role::Waiter(rx) => match wait(token, rx).await {
                    Some(res) => return (res, true),
                    None => trace!("executing caller abandoned the call; retrying"),
                },
                Role::Leader(call) => {
                    let flight = Flight {
                        group: self,
                        key,
                        call,
                        done: false,
                    };
                    return match run_cancellable(token, f()).await {
                        Ok(res) => flight.complete(res),
                        Err(canceled) => (Err(canceled), flight.abandon()),
                    };
                }
            }
        }
    }

    fn enter(&self, key: &K) -> Role<V> {
        let mut calls = self.lock();
        match calls.get(key) {
            Some(call) => {
                call.joined.fetch_add(1, Ordering::Relaxed);
                Role::Waiter(call.result.subscribe())
            }
            None => {
                let (result, _rx) = watch::channel(Outcome::Pending);
                let call = Arc::new(Call {
                    result,
                    joined: AtomicUsize::new(0),
                });
                calls.insert(key.clone(), Arc::clone(&call));
                Role::Leader(call)
            }
        }
    }

    /// Number of keys with a call in flight.
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Arc<Call<V>>>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes `key` if it still maps to `call`; returns how many callers joined it.
    fn finish(&self, key: &K, call: &Arc<Call<V>>) -> usize {
        let mut calls = self.lock();
        if calls.get(key).is_some_and(|c| Arc::ptr_eq(c, call)) {
            calls.remove(key);
        }
        call.joined.load(Ordering::Relaxed)
    }
}

/// Waits for the executing caller. `None` means it gave up and the caller should retry.
async fn wait<V: Clone>(
    token: &CancellationToken,
    mut rx: watch::Receiver<Outcome<V>>,
) -> Option<Result<V, FlowError>> {
    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => return Some(Err(FlowError::Canceled)),
        res = rx.wait_for(|o| !matches!(o, Outcome::Pending)) => match res {
            Ok(outcome) => outcome.clone(),
            Err(_closed) => Outcome::Abandoned,
        },
    };
    match outcome {
        Outcome::Done(res) => Some(res),
        Outcome::Pending | Outcome::Abandoned => None,
    }
}

/// Record owner held by the executing caller; abandons the call if dropped early.
struct Flight<'a, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    group: &'a Singleflight<K, V>,
    key: K,
    call: Arc<Call<V>>,
    done: bool,
}

impl<K, V> Flight<'_, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn complete(mut self, res: Result<V, FlowError>) -> (Result<V, FlowError>, bool) {
        self.done = true;
        let joined = self.group.finish(&self.key, &self.call);
        self.call.result.send_replace(Outcome::Done(res.clone()));
        (res, joined > 0)
    }

    fn abandon(mut self) -> bool {
        self.done = true;
        self.release()
    }

    /// Frees the key and tells waiters to retry; returns whether anyone had joined.
    fn release(&self) -> bool {
        let joined = self.group.finish(&self.key, &self.call);
        self.call.result.send_replace(Outcome::Abandoned);
        trace!(joined, "in-flight call abandoned");
        joined > 0
    }
}

impl<K, V> Drop for Flight<'_, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn drop(&mut self) {
        if !self.done {
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time;

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_execution() {
        const CALLERS: usize = 6;
        let group = Arc::new(Singleflight::<&str, String>::new());
        let executions = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();

        let mut handles = Vec::new();
        for _ in 0..CALLERS {
            let group = Arc::clone(&group);
            let executions = Arc::clone(&executions);
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                group
                    .do_call(&token, "key", || async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        time::sleep(Duration::from_millis(200)).await;
                        Ok("computed-value".to_string())
                    })
                    .await
            }));
        }

        let mut shared = 0;
        for h in handles {
            let (res, was_shared) = h.await.unwrap();
            assert_eq!(res, Ok("computed-value".to_string()));
            shared += usize::from(was_shared);
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert!(shared >= CALLERS - 1);
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test]
    async fn later_call_runs_fresh() {
        let group = Singleflight::new();
        let token = CancellationToken::new();
        let (first, shared) = group.do_call(&token, 1u8, || async { Ok(10) }).await;
        assert_eq!(first, Ok(10));
        assert!(!shared);
        let (second, _) = group.do_call(&token, 1u8, || async { Ok(20) }).await;
        assert_eq!(second, Ok(20));
    }

    #[tokio::test(start_paused = true)]
    async fn errors_are_shared_too() {
        let group = Arc::new(Singleflight::<u8, ()>::new());
        let token = CancellationToken::new();

        let g = Arc::clone(&group);
        let t = token.clone();
        let leader = tokio::spawn(async move {
            g.do_call(&t, 7, || async {
                time::sleep(Duration::from_millis(50)).await;
                Err(FlowError::fail("backend down"))
            })
            .await
        });
        tokio::task::yield_now().await;

        let (res, shared) = group.do_call(&token, 7, || async { Ok(()) }).await;
        assert_eq!(res, Err(FlowError::fail("backend down")));
        assert!(shared);
        assert_eq!(leader.await.unwrap(), (Err(FlowError::fail("backend down")), true));
    }

    #[tokio::test(start_paused = true)]
    async fn live_waiter_takes_over_a_cancelled_call() {
        let group = Arc::new(Singleflight::<u8, u8>::new());
        let leader_token = CancellationToken::new();

        let g = Arc::clone(&group);
        let t = leader_token.clone();
        let leader = tokio::spawn(async move {
            g.do_call(&t, 1, || async {
                time::sleep(Duration::from_secs(60)).await;
                Ok(1)
            })
            .await
        });
        tokio::task::yield_now().await;

        let g = Arc::clone(&group);
        let waiter =
            tokio::spawn(async move { g.do_call(&CancellationToken::new(), 1, || async { Ok(2) }).await });
        tokio::task::yield_now().await;

        leader_token.cancel();
        assert_eq!(leader.await.unwrap(), (Err(FlowError::Canceled), true));
        assert_eq!(waiter.await.unwrap(), (Ok(2), false));
        assert_eq!(group.in_flight(), 0);

        let (res, _) = group.do_call(&CancellationToken::new(), 1, || async { Ok(3) }).await;
        assert_eq!(res, Ok(3));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_waiter_stops_waiting() {
        let group = Arc::new(Singleflight::<u8, u8>::new());
        let token = CancellationToken::new();

        let g = Arc::clone(&group);
        let t = token.clone();
        let leader = tokio::spawn(async move {
            g.do_call(&t, 4, || async {
                time::sleep(Duration::from_secs(1)).await;
                Ok(4)
            })
            .await
        });
        tokio::task::yield_now().await;

        let waiter_token = CancellationToken::new();
        waiter_token.cancel();
        let (res, shared) = group.do_call(&waiter_token, 4, || async { Ok(0) }).await;
        assert_eq!(res, Err(FlowError::Canceled));
        assert!(shared);
        assert_eq!(leader.await.unwrap(), (Ok(4), true));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_executor_future_frees_the_key() {
        let group = Singleflight::<u8, u8>::new();
        let token = CancellationToken::new();
        let pending = group.do_call(&token, 9, || async {
            time::sleep(Duration::from_secs(60)).await;
            Ok(0)
        });
        let res = time::timeout(Duration::from_millis(10), pending).await;
        assert!(res.is_err());
        assert_eq!(group.in_flight(), 0);
    }
}
