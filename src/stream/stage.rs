//! # Sources and order-preserving stages.

use super::pipeline::{Pipeline, Stream, forward, next};

impl Pipeline {
    /// Emits every item of `items`, then closes.
    pub fn source<I>(&self, items: I) -> Stream<I::Item>
    where
        I: IntoIterator + Send + 'static,
        I::IntoIter: Send,
        I::Item: Send + 'static,
    {
        let (tx, rx) = self.channel();
        let token = self.token().clone();
        tokio::spawn(async move {
            for item in items {
                if !forward(&token, &tx, item).await {
                    break;
                }
            }
        });
        rx
    }

    /// Applies `f` to each item in arrival order.
    pub fn stage<T, U, F>(&self, mut input: Stream<T>, mut f: F) -> Stream<U>
    where
        T: Send + 'static,
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        let (tx, rx) = self.channel();
        let token = self.token().clone();
        tokio::spawn(async move {
            while let Some(item) = next(&token, &mut input).await {
                if !forward(&token, &tx, f(item)).await {
                    break;
                }
            }
        });
        rx
    }

    /// Forwards only the items for which `keep` returns `true`.
    pub fn filter<T, P>(&self, mut input: Stream<T>, mut keep: P) -> Stream<T>
    where
        T: Send + 'static,
        P: FnMut(&T) -> bool + Send + 'static,
    {
        let (tx, rx) = self.channel();
        let token = self.token().clone();
        tokio::spawn(async move {
            while let Some(item) = next(&token, &mut input).await {
                if keep(&item) && !forward(&token, &tx, item).await {
                    break;
                }
            }
        });
        rx
    }
}
