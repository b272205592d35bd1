//! # Or-channel: first of many cancellation signals.

use std::ops::Deref;

use futures::future::select_all;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Combined signal returned by [`any_signal`].
///
/// Dereferences to the combined [`CancellationToken`]. Dropping it stops the helper
/// task; clones of the token taken earlier then no longer follow the inputs.
#[derive(Debug)]
pub struct AnySignal {
    token: CancellationToken,
    _watch: Option<DropGuard>,
}

impl AnySignal {
    fn settled(token: CancellationToken) -> Self {
        Self {
            token,
            _watch: None,
        }
    }

    /// The combined token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Deref for AnySignal {
    type Target = CancellationToken;

    fn deref(&self) -> &CancellationToken {
        &self.token
    }
}

/// Returns a signal that fires as soon as any of `signals` fires.
///
/// - no signals → an already-cancelled token;
/// - one signal → that signal itself;
/// - otherwise a fresh token driven by one background task, which exits as soon as
///   an input fires, the combined token is cancelled, or the [`AnySignal`] is dropped.
///
/// Cancelling the combined token never cancels the inputs. With two or more signals
/// this must be called inside a tokio runtime.
pub fn any_signal(signals: &[CancellationToken]) -> AnySignal {
    match signals {
        [] => {
            let done = CancellationToken::new();
            done.cancel();
            AnySignal::settled(done)
        }
        [only] => AnySignal::settled(only.clone()),
        many => {
            let out = CancellationToken::new();
            if many.iter().any(CancellationToken::is_cancelled) {
                out.cancel();
                return AnySignal::settled(out);
            }
            let waiters: Vec<_> = many
                .iter()
                .map(|s| Box::pin(s.clone().cancelled_owned()))
                .collect();
            let stop = CancellationToken::new();
            let watch = stop.clone();
            let fire = out.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = watch.cancelled() => {}
                    _ = fire.cancelled() => {}
                    _ = select_all(waiters) => fire.cancel(),
                }
            });
            AnySignal {
                token: out,
                _watch: Some(stop.drop_guard()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::{self, Instant};

    fn fire_after(ms: u64) -> CancellationToken {
        let t = CancellationToken::new();
        let c = t.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(ms)).await;
            c.cancel();
        });
        t
    }

    #[tokio::test(start_paused = true)]
    async fn fires_with_the_earliest_input() {
        let start = Instant::now();
        let signals = [
            fire_after(2 * 3_600_000),
            fire_after(300_000),
            fire_after(1_000),
            fire_after(3_600_000),
            fire_after(60_000),
        ];
        any_signal(&signals).cancelled().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(2));
        assert!(!signals[3].is_cancelled());
    }

    #[tokio::test]
    async fn empty_input_is_already_fired() {
        assert!(any_signal(&[]).is_cancelled());
    }

    #[tokio::test]
    async fn single_input_is_passed_through() {
        let t = CancellationToken::new();
        let out = any_signal(std::slice::from_ref(&t));
        t.cancel();
        assert!(out.is_cancelled());
    }

    #[tokio::test]
    async fn already_fired_input_fires_immediately() {
        let a = CancellationToken::new();
        let b = CancellationToken::new();
        b.cancel();
        assert!(any_signal(&[a.clone(), b]).is_cancelled());
        assert!(!a.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_signal_stops_following_inputs() {
        let a = CancellationToken::new();
        let b = CancellationToken::new();
        let signal = any_signal(&[a.clone(), b]);
        let combined = signal.token().clone();
        drop(signal);
        tokio::task::yield_now().await;

        a.cancel();
        tokio::task::yield_now().await;
        assert!(!combined.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_output_leaves_inputs_alone() {
        let a = CancellationToken::new();
        let b = CancellationToken::new();
        let out = any_signal(&[a.clone(), b.clone()]);
        out.cancel();
        tokio::task::yield_now().await;
        assert!(!a.is_cancelled());
        assert!(!b.is_cancelled());
    }
}
