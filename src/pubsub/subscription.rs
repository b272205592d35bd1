//! Receiving end of one broker subscriber.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use super::broker::Command;
use crate::stream::Stream;

/// One subscriber's bounded buffer plus its drop counter.
///
/// Dropping the subscription is enough to leave the broker; [`Subscription::unsubscribe`]
/// does it eagerly. Either way is safe while a publish is in flight.
pub struct Subscription<M> {
    id: u64,
    rx: mpsc::Receiver<M>,
    dropped: Arc<AtomicU64>,
    cmd: mpsc::WeakSender<Command<M>>,
}

impl<M> Subscription<M> {
    pub(super) fn new(
        id: u64,
        rx: mpsc::Receiver<M>,
        dropped: Arc<AtomicU64>,
        cmd: mpsc::WeakSender<Command<M>>,
    ) -> Self {
        Self {
            id,
            rx,
            dropped,
            cmd,
        }
    }

    /// Broker-assigned identifier, unique per broker.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next message, or `None` once unsubscribed or the broker has stopped.
    pub async fn recv(&mut self) -> Option<M> {
        self.rx.recv().await
    }

    /// Next message if one is buffered.
    pub fn try_recv(&mut self) -> Option<M> {
        self.rx.try_recv().ok()
    }

    /// Messages this subscriber missed because its buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Removes this subscriber from the broker and closes its buffer.
    pub async fn unsubscribe(mut self) {
        self.rx.close();
        if let Some(cmd) = self.cmd.upgrade() {
            let _ = cmd.send(Command::Unsubscribe { id: self.id }).await;
        }
    }

    /// Detaches the buffer as a plain [`Stream`] for use with pipeline combinators.
    ///
    /// The broker prunes the subscriber once the stream is dropped.
    pub fn into_stream(self) -> Stream<M> {
        self.rx
    }
}
