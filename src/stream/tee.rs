//! # Tee: duplicate one stream into two.
//!
//! Each item is delivered to both outputs before the next one is read, so the slower
//! consumer paces the faster one. An output whose consumer has gone away is skipped
//! from then on.

use super::pipeline::{Pipeline, Stream, next};

impl Pipeline {
    /// Splits `input` into two outputs that observe the same items in the same order.
    pub fn tee<T>(&self, mut input: Stream<T>) -> (Stream<T>, Stream<T>)
    where
        T: Clone + Send + 'static,
    {
        let (tx1, rx1) = self.channel();
        let (tx2, rx2) = self.channel();
        let token = self.token().clone();
        tokio::spawn(async move {
            let mut out1 = Some(tx1);
            let mut out2 = Some(tx2);
            while out1.is_some() || out2.is_some() {
                let Some(item) = next(&token, &mut input).await else {
                    break;
                };
                let copy = item.clone();
                let send1 = async {
                    match &out1 {
                        Some(tx) => tx.send(copy).await.is_ok(),
                        None => false,
                    }
                };
                let send2 = async {
                    match &out2 {
                        Some(tx) => tx.send(item).await.is_ok(),
                        None => false,
                    }
                };
                let (ok1, ok2) = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    both = async { tokio::join!(send1, send2) } => both,
                };
                if !ok1 {
                    out1 = None;
                }
                if !ok2 {
                    out2 = None;
                }
            }
        });
        (rx1, rx2)
    }
}
