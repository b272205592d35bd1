//! # Pipeline context and the send/receive races shared by all combinators.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::Config;

/// Ordered, closable asynchronous sequence.
pub type Stream<T> = mpsc::Receiver<T>;

/// Builder of stream combinators bound to one cancellation token.
///
/// Cloning is cheap; clones share the token.
///
/// # Example
/// ```rust
/// use flowvisor::{CancellationToken, Pipeline};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let p = Pipeline::new(CancellationToken::new());
/// let words = p.source(["go", "gopher", "java", "golang", "rust"]);
/// let upper = p.stage(words, |s: &str| s.to_uppercase());
/// let mut go = p.filter(upper, |s: &String| s.starts_with("GO"));
///
/// let mut out = Vec::new();
/// while let Some(s) = go.recv().await {
///     out.push(s);
/// }
/// assert_eq!(out, ["GO", "GOPHER", "GOLANG"]);
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Pipeline {
    token: CancellationToken,
    capacity: usize,
}

impl Pipeline {
    /// Pipeline with the default output buffer (1).
    pub fn new(token: CancellationToken) -> Self {
        Self::with_config(token, &Config::default())
    }

    /// Pipeline using `cfg.stream_capacity`.
    pub fn with_config(token: CancellationToken, cfg: &Config) -> Self {
        Self {
            token,
            capacity: cfg.stream_capacity_clamped(),
        }
    }

    /// The token every combinator task observes.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Output buffer size of each combinator.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub(super) fn channel<T>(&self) -> (mpsc::Sender<T>, Stream<T>) {
        mpsc::channel(self.capacity)
    }
}

/// Receives the next item, or `None` once `rx` is closed or `token` fires.
pub(super) async fn next<T>(token: &CancellationToken, rx: &mut Stream<T>) -> Option<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        v = rx.recv() => v,
    }
}

/// Sends `v` downstream, waiting for capacity.
///
/// Returns `false` if `token` fired or the receiver is gone; the caller should stop.
pub(super) async fn forward<T>(token: &CancellationToken, tx: &mpsc::Sender<T>, v: T) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        res = tx.send(v) => res.is_ok(),
    }
}

#[cfg(test)]
pub(super) async fn drain<T>(mut rx: Stream<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Some(v) = rx.recv().await {
        out.push(v);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_comes_from_config() {
        let cfg = Config {
            stream_capacity: 0,
            ..Config::default()
        };
        let p = Pipeline::with_config(CancellationToken::new(), &cfg);
        assert_eq!(p.capacity(), 1);

        let cfg = Config {
            stream_capacity: 8,
            ..Config::default()
        };
        assert_eq!(Pipeline::with_config(CancellationToken::new(), &cfg).capacity(), 8);
    }

    #[tokio::test]
    async fn forward_stops_when_receiver_is_gone() {
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel::<u8>(1);
        drop(rx);
        assert!(!forward(&token, &tx, 1).await);
    }

    #[tokio::test]
    async fn forward_unblocks_on_cancel() {
        let token = CancellationToken::new();
        let (tx, _rx) = mpsc::channel::<u8>(1);
        assert!(forward(&token, &tx, 1).await);
        let t = token.clone();
        tokio::spawn(async move { t.cancel() });
        // Buffer is full; only cancellation can release this send.
        assert!(!forward(&token, &tx, 2).await);
    }

    #[tokio::test]
    async fn next_returns_none_on_cancel() {
        let token = CancellationToken::new();
        let (_tx, mut rx) = mpsc::channel::<u8>(1);
        token.cancel();
        assert_eq!(next(&token, &mut rx).await, None);
    }
}
