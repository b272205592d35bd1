//! # Load shedding: a queue that drops instead of blocking.
//!
//! ```text
//! producer ── try_enqueue() ──► [capacity] ──► consumer
//!                  │
//!                  └─ full ──► dropped += 1 (producer never waits)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

use super::pipeline::{Pipeline, Stream, next};
use crate::error::{ConfigError, ensure_nonzero};

/// Shared accepted / dropped counters of a shedding queue.
#[derive(Clone, Debug, Default)]
pub struct ShedStats {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    dropped: AtomicU64,
}

impl ShedStats {
    /// Items handed to the consumer side.
    pub fn accepted(&self) -> u64 {
        self.inner.accepted.load(Ordering::Relaxed)
    }

    /// Items discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

/// Producer handle of a bounded, non-blocking queue.
#[derive(Debug)]
pub struct SheddingQueue<T> {
    tx: mpsc::Sender<T>,
    stats: ShedStats,
}

impl<T> Clone for SheddingQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<T> SheddingQueue<T> {
    /// Enqueues `v` if there is room; drops it otherwise.
    ///
    /// Returns `true` if the item was accepted. Never waits.
    pub fn try_enqueue(&self, v: T) -> bool {
        match self.tx.try_send(v) {
            Ok(()) => {
                self.stats.inner.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                let dropped = self.stats.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(dropped, "queue full; item shed");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Counter handle shared with every clone of this queue.
    pub fn stats(&self) -> &ShedStats {
        &self.stats
    }

    /// Items accepted so far.
    pub fn accepted(&self) -> u64 {
        self.stats.accepted()
    }

    /// Items dropped so far.
    pub fn dropped(&self) -> u64 {
        self.stats.dropped()
    }
}

/// Creates a shedding queue holding at most `capacity` pending items.
///
/// Returns [`ConfigError`] if `capacity == 0`.
pub fn shedding_queue<T>(capacity: usize) -> Result<(SheddingQueue<T>, Stream<T>), ConfigError> {
    let capacity = ensure_nonzero("capacity", capacity)?;
    let (tx, rx) = mpsc::channel(capacity);
    let queue = SheddingQueue {
        tx,
        stats: ShedStats::default(),
    };
    Ok((queue, rx))
}

impl Pipeline {
    /// Decouples a fast producer from a slow consumer by shedding overflow.
    ///
    /// Reads `input` as fast as it arrives and keeps at most `capacity` items pending
    /// for the consumer; the rest are counted in the returned [`ShedStats`].
    pub fn shed<T>(
        &self,
        mut input: Stream<T>,
        capacity: usize,
    ) -> Result<(Stream<T>, ShedStats), ConfigError>
    where
        T: Send + 'static,
    {
        let (queue, rx) = shedding_queue(capacity)?;
        let stats = queue.stats().clone();
        let token = self.token().clone();
        tokio::spawn(async move {
            while let Some(item) = next(&token, &mut input).await {
                if queue.tx.is_closed() {
                    break;
                }
                queue.try_enqueue(item);
            }
        });
        Ok((rx, stats))
    }
}
