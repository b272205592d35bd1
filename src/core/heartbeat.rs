//! # Heartbeat / liveness monitoring.
//!
//! A producer holds a [`Pulse`] and calls [`Pulse::beat`] while it makes progress.
//! The other side holds a [`Monitor`] and learns, per wait, whether the producer beat,
//! stalled (no beat within `timeout`), finished (dropped every pulse) or was cancelled.
//!
//! ## Architecture
//! ```text
//! producer ── beat() ──► [cap-1 queue] ──► Monitor::next()
//!   (try_send, never blocks)                 ├─ Beat      (signal arrived)
//!                                            ├─ Stalled   (timeout without a beat)
//!                                            ├─ Finished  (all pulses dropped)
//!                                            └─ Canceled  (token fired)
//! ```
//!
//! [`guard`] wires both halves around a single future and cancels it on a stall.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cancel::run_cancellable;
use crate::error::FlowError;

/// What a single [`Monitor::next`] wait observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Liveness {
    /// A heartbeat arrived before the timeout.
    Beat,
    /// No heartbeat within the timeout.
    Stalled,
    /// Every [`Pulse`] has been dropped.
    Finished,
    /// The cancellation token fired.
    Canceled,
}

/// Producer half: emits liveness signals.
#[derive(Clone, Debug)]
pub struct Pulse {
    tx: mpsc::Sender<()>,
}

impl Pulse {
    /// Emits a heartbeat without blocking.
    ///
    /// A beat that finds one already pending is coalesced with it.
    /// Returns `false` once the monitor is gone.
    pub fn beat(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }
}

/// Consumer half: detects stalled producers.
#[derive(Debug)]
pub struct Monitor {
    rx: mpsc::Receiver<()>,
    timeout: Duration,
}

impl Monitor {
    /// The stall timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Waits for the next heartbeat, at most `timeout` from now.
    pub async fn next(&mut self, token: &CancellationToken) -> Liveness {
        tokio::select! {
            biased;
            _ = token.cancelled() => Liveness::Canceled,
            beat = self.rx.recv() => match beat {
                Some(()) => Liveness::Beat,
                None => Liveness::Finished,
            },
            _ = tokio::time::sleep(self.timeout) => Liveness::Stalled,
        }
    }
}

/// Creates a connected [`Pulse`] / [`Monitor`] pair.
pub fn heartbeat(timeout: Duration) -> (Pulse, Monitor) {
    let (tx, rx) = mpsc::channel(1);
    (Pulse { tx }, Monitor { rx, timeout })
}

/// Runs the producer built by `f` and aborts it if it stops beating.
///
/// `f` receives a child token and a [`Pulse`]. If no beat arrives within `timeout`,
/// the child token is cancelled and [`FlowError::Timeout`] is returned. If the producer
/// drops its pulse before finishing, stall detection ends and only cancellation applies.
pub async fn guard<T, F, Fut>(
    token: &CancellationToken,
    timeout: Duration,
    f: F,
) -> Result<T, FlowError>
where
    F: FnOnce(CancellationToken, Pulse) -> Fut,
    Fut: Future<Output = Result<T, FlowError>>,
{
    let child = token.child_token();
    let (pulse, mut monitor) = heartbeat(timeout);
    let work = f(child.clone(), pulse);
    tokio::pin!(work);

    loop {
        tokio::select! {
            biased;
            res = &mut work => return res,
            liveness = monitor.next(token) => match liveness {
                Liveness::Beat => {}
                Liveness::Finished => return run_cancellable(token, work).await?,
                Liveness::Stalled => {
                    warn!(timeout = ?timeout, "no heartbeat; cancelling producer");
                    child.cancel();
                    return Err(FlowError::Timeout { timeout });
                }
                Liveness::Canceled => {
                    child.cancel();
                    return Err(FlowError::Canceled);
                }
            },
        }
    }
}
