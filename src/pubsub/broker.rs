//! Broker handle and its owning loop.
//!
//! ## Rules
//! - **Single writer**: only the loop touches the registry; handles talk to it by message.
//! - **Best effort**: a subscriber whose buffer is full misses that message, others are unaffected.
//! - **Per-subscriber FIFO**: messages a subscriber does receive arrive in publish order.
//! - **Pruning**: a subscription whose receiver was dropped is removed on the next publish.
//! - **Shutdown**: when the token fires, or every [`Broker`] clone is dropped, the loop exits
//!   and every subscription is closed.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::subscription::Subscription;
use crate::core::Config;
use crate::error::FlowError;

/// Requests handled by the broker loop, in arrival order.
pub(super) enum Command<M> {
    Subscribe {
        buffer: usize,
        reply: oneshot::Sender<Subscription<M>>,
    },
    Unsubscribe {
        id: u64,
    },
    Publish(M),
    Count {
        reply: oneshot::Sender<usize>,
    },
}

/// Registry entry for one live subscription.
struct Entry<M> {
    tx: mpsc::Sender<M>,
    dropped: Arc<AtomicU64>,
}

/// Handle to a pub/sub broker.
///
/// # Example
/// ```rust
/// use flowvisor::{Broker, CancellationToken};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let broker = Broker::new(CancellationToken::new());
/// let mut sub = broker.subscribe(8).await.unwrap();
///
/// broker.publish("hello").await.unwrap();
/// assert_eq!(sub.recv().await, Some("hello"));
/// # }
/// ```
pub struct Broker<M> {
    cmd: mpsc::Sender<Command<M>>,
    default_buffer: usize,
}

impl<M> Clone for Broker<M> {
    fn clone(&self) -> Self {
        Self {
            cmd: self.cmd.clone(),
            default_buffer: self.default_buffer,
        }
    }
}

impl<M> Broker<M>
where
    M: Clone + Send + 'static,
{
    /// Starts a broker with default capacities.
    pub fn new(token: CancellationToken) -> Self {
        Self::with_config(token, &Config::default())
    }

    /// Starts a broker using `cfg.broker_capacity` and `cfg.subscriber_capacity`.
    pub fn with_config(token: CancellationToken, cfg: &Config) -> Self {
        let (cmd, rx) = mpsc::channel(cfg.broker_capacity_clamped());
        let weak = cmd.downgrade();
        tokio::spawn(run_loop(token, rx, weak));
        Self {
            cmd,
            default_buffer: cfg.subscriber_capacity_clamped(),
        }
    }

    /// Registers a subscriber with a buffer of `buffer` messages (minimum 1).
    ///
    /// Only messages published after this call returns are delivered to it.
    /// Fails with [`FlowError::Canceled`] once the broker has stopped.
    pub async fn subscribe(&self, buffer: usize) -> Result<Subscription<M>, FlowError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Subscribe {
            buffer: buffer.max(1),
            reply,
        })
        .await?;
        rx.await.map_err(|_| FlowError::Canceled)
    }

    /// Registers a subscriber with the configured default buffer.
    pub async fn subscribe_default(&self) -> Result<Subscription<M>, FlowError> {
        self.subscribe(self.default_buffer).await
    }

    /// Hands `msg` to the loop for delivery to every current subscriber.
    ///
    /// Waits only for room in the command queue, never for subscribers.
    pub async fn publish(&self, msg: M) -> Result<(), FlowError> {
        self.request(Command::Publish(msg)).await
    }

    /// Number of registered subscriptions, as seen by the loop.
    pub async fn subscriber_count(&self) -> Result<usize, FlowError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Count { reply }).await?;
        rx.await.map_err(|_| FlowError::Canceled)
    }

    /// Returns `true` once the loop has exited.
    pub fn is_closed(&self) -> bool {
        self.cmd.is_closed()
    }

    async fn request(&self, cmd: Command<M>) -> Result<(), FlowError> {
        self.cmd.send(cmd).await.map_err(|_| FlowError::Canceled)
    }
}

async fn run_loop<M: Clone>(
    token: CancellationToken,
    mut rx: mpsc::Receiver<Command<M>>,
    weak: mpsc::WeakSender<Command<M>>,
) {
    let mut subs: HashMap<u64, Entry<M>> = HashMap::new();
    let mut next_id: u64 = 0;

    loop {
        let cmd = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            cmd = rx.recv() => match cmd {
                Some(cmd) => cmd,
                None => break,
            },
        };

        match cmd {
            Command::Subscribe { buffer, reply } => {
                next_id += 1;
                let (tx, sub_rx) = mpsc::channel(buffer);
                let dropped = Arc::new(AtomicU64::new(0));
                let sub = Subscription::new(next_id, sub_rx, Arc::clone(&dropped), weak.clone());
                if reply.send(sub).is_ok() {
                    subs.insert(next_id, Entry { tx, dropped });
                    trace!(id = next_id, buffer, "subscriber added");
                }
            }
            Command::Unsubscribe { id } => {
                if subs.remove(&id).is_some() {
                    trace!(id, "subscriber removed");
                }
            }
            Command::Publish(msg) => {
                subs.retain(|id, entry| match entry.tx.try_send(msg.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        let dropped = entry.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        trace!(id, dropped, "subscriber buffer full; message dropped");
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        trace!(id, "subscriber gone; pruning");
                        false
                    }
                });
            }
            Command::Count { reply } => {
                let _ = reply.send(subs.len());
            }
        }
    }

    debug!(subscribers = subs.len(), "broker stopped; closing subscriptions");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn every_subscriber_receives_in_publish_order() {
        let broker = Broker::new(CancellationToken::new());
        let mut a = broker.subscribe(16).await.unwrap();
        let mut b = broker.subscribe(16).await.unwrap();

        for i in 0..10u32 {
            broker.publish(i).await.unwrap();
        }
        for i in 0..10u32 {
            assert_eq!(a.recv().await, Some(i));
            assert_eq!(b.recv().await, Some(i));
        }
        assert_eq!(broker.subscriber_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn full_buffer_drops_for_that_subscriber_only() {
        let broker = Broker::new(CancellationToken::new());
        let mut slow = broker.subscribe(2).await.unwrap();
        let mut fast = broker.subscribe(16).await.unwrap();

        for i in 0..5u32 {
            broker.publish(i).await.unwrap();
        }
        // The count round-trip orders after every publish above.
        broker.subscriber_count().await.unwrap();

        assert_eq!(slow.dropped(), 3);
        assert_eq!(fast.dropped(), 0);
        assert_eq!(slow.recv().await, Some(0));
        assert_eq!(slow.recv().await, Some(1));
        assert!(slow.try_recv().is_none());
        for i in 0..5u32 {
            assert_eq!(fast.recv().await, Some(i));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unsubscribe_is_safe_during_publish() {
        let broker = Broker::new(CancellationToken::new());
        let mut sub = broker.subscribe(4).await.unwrap();

        let publisher = broker.clone();
        let handle = tokio::spawn(async move {
            for i in 0..1_000u32 {
                publisher.publish(i).await.unwrap();
            }
        });

        let first = sub.recv().await;
        assert!(first.is_some());
        sub.unsubscribe().await;

        handle.await.unwrap();
        assert_eq!(broker.subscriber_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dropped_subscription_is_pruned_on_publish() {
        let broker = Broker::new(CancellationToken::new());
        let sub = broker.subscribe(1).await.unwrap();
        let _keep = broker.subscribe(1).await.unwrap();
        drop(sub);
        broker.publish(()).await.unwrap();
        assert_eq!(broker.subscriber_count().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_closes_every_subscription() {
        let token = CancellationToken::new();
        let broker = Broker::new(token.clone());
        let mut a = broker.subscribe_default().await.unwrap();
        let mut b = broker.subscribe_default().await.unwrap();
        broker.publish("last").await.unwrap();
        broker.subscriber_count().await.unwrap();

        let t = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            t.cancel();
        });

        assert_eq!(a.recv().await, Some("last"));
        assert_eq!(a.recv().await, None);
        assert_eq!(b.recv().await, Some("last"));
        assert_eq!(b.recv().await, None);

        assert_eq!(broker.publish("late").await, Err(FlowError::Canceled));
        assert!(broker.subscribe(1).await.is_err());
        assert!(broker.is_closed());
    }

    #[tokio::test]
    async fn dropping_every_handle_stops_the_loop() {
        let broker = Broker::<u8>::new(CancellationToken::new());
        let mut sub = broker.subscribe(1).await.unwrap();
        drop(broker);
        assert_eq!(sub.recv().await, None);
    }
}
