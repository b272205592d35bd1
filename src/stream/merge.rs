//! # Fan-in: merge several streams into one.
//!
//! Items from one source keep their relative order; interleaving across sources is
//! unspecified. The output closes once every source has closed.

use futures::stream::{self as fstream, StreamExt};

use super::pipeline::{Pipeline, Stream, forward};

impl Pipeline {
    /// Merges two streams.
    pub fn merge<T>(&self, a: Stream<T>, b: Stream<T>) -> Stream<T>
    where
        T: Send + 'static,
    {
        let (tx, rx) = self.channel();
        let token = self.token().clone();
        tokio::spawn(async move {
            let mut a = Some(a);
            let mut b = Some(b);
            while a.is_some() || b.is_some() {
                let item = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    v = recv_or_pending(&mut a), if a.is_some() => match v {
                        Some(v) => v,
                        None => { a = None; continue; }
                    },
                    v = recv_or_pending(&mut b), if b.is_some() => match v {
                        Some(v) => v,
                        None => { b = None; continue; }
                    },
                };
                if !forward(&token, &tx, item).await {
                    break;
                }
            }
        });
        rx
    }

    /// Merges any number of streams. An empty list yields a stream that closes immediately.
    pub fn merge_all<T>(&self, inputs: Vec<Stream<T>>) -> Stream<T>
    where
        T: Send + 'static,
    {
        let (tx, rx) = self.channel();
        let token = self.token().clone();
        let sources = inputs
            .into_iter()
            .map(|mut rx| fstream::poll_fn(move |cx| rx.poll_recv(cx)).boxed());
        let mut merged = fstream::select_all(sources);
        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    v = merged.next() => match v {
                        Some(v) => v,
                        None => break,
                    },
                };
                if !forward(&token, &tx, item).await {
                    break;
                }
            }
        });
        rx
    }
}

async fn recv_or_pending<T>(rx: &mut Option<Stream<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
