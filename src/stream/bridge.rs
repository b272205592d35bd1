//! # Bridge: flatten a stream of streams.

use super::pipeline::{Pipeline, Stream, forward, next};

impl Pipeline {
    /// Drains each inner stream fully, in arrival order, before moving to the next one.
    pub fn bridge<T>(&self, mut streams: Stream<Stream<T>>) -> Stream<T>
    where
        T: Send + 'static,
    {
        let (tx, rx) = self.channel();
        let token = self.token().clone();
        tokio::spawn(async move {
            'outer: while let Some(mut inner) = next(&token, &mut streams).await {
                while let Some(item) = next(&token, &mut inner).await {
                    if !forward(&token, &tx, item).await {
                        break 'outer;
                    }
                }
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::super::pipeline::drain;
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn inner_streams_are_concatenated() {
        let p = Pipeline::new(CancellationToken::new());
        let inner = vec![
            p.source([11, 12, 13]),
            p.source([21, 22, 23]),
            p.source([31, 32, 33]),
        ];
        let out = drain(p.bridge(p.source(inner))).await;
        assert_eq!(out, [11, 12, 13, 21, 22, 23, 31, 32, 33]);
    }

    #[tokio::test]
    async fn empty_inner_streams_are_skipped() {
        let p = Pipeline::new(CancellationToken::new());
        let inner = vec![p.source(Vec::<u8>::new()), p.source(vec![7u8])];
        assert_eq!(drain(p.bridge(p.source(inner))).await, [7]);
    }

    #[tokio::test]
    async fn cancel_stops_mid_inner_stream() {
        let token = CancellationToken::new();
        let p = Pipeline::new(token.clone());
        let mut out = p.bridge(p.source(vec![p.source(0u32..)]));
        assert_eq!(out.recv().await, Some(0));
        token.cancel();
        assert!(drain(out).await.len() <= 1);
    }
}
