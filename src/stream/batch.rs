//! # Batching by size or age.
//!
//! ```text
//! input ──► [buffer] ──┬─ len == max_size ───► emit
//!                      ├─ max_interval since last emit ──► emit (if non-empty)
//!                      └─ input closed ──► emit remainder, close
//! ```
//!
//! The interval timer restarts after every emission, whichever trigger caused it.
//! Empty batches are never emitted.

use std::time::Duration;

use tokio::time::{self, Instant};

use super::pipeline::{Pipeline, Stream, forward};
use crate::error::{ConfigError, ensure_nonzero};

impl Pipeline {
    /// Groups items into batches of at most `max_size`, flushing partial batches
    /// every `max_interval`.
    ///
    /// Returns [`ConfigError`] if `max_size == 0` or `max_interval` is zero.
    pub fn batch<T>(
        &self,
        mut input: Stream<T>,
        max_size: usize,
        max_interval: Duration,
    ) -> Result<Stream<Vec<T>>, ConfigError>
    where
        T: Send + 'static,
    {
        let max_size = ensure_nonzero("max_size", max_size)?;
        if max_interval.is_zero() {
            return Err(ConfigError::invalid("max_interval", "must be positive"));
        }

        let (tx, rx) = self.channel();
        let token = self.token().clone();
        tokio::spawn(async move {
            let mut buf = Vec::with_capacity(max_size);
            let deadline = time::sleep(max_interval);
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    _ = &mut deadline => {
                        if !buf.is_empty() {
                            let full = std::mem::replace(&mut buf, Vec::with_capacity(max_size));
                            if !forward(&token, &tx, full).await {
                                return;
                            }
                        }
                        deadline.as_mut().reset(Instant::now() + max_interval);
                    }
                    item = input.recv() => match item {
                        Some(item) => {
                            buf.push(item);
                            if buf.len() >= max_size {
                                let full = std::mem::replace(&mut buf, Vec::with_capacity(max_size));
                                if !forward(&token, &tx, full).await {
                                    return;
                                }
                                deadline.as_mut().reset(Instant::now() + max_interval);
                            }
                        }
                        None => break,
                    },
                }
            }

            if !buf.is_empty() {
                forward(&token, &tx, buf).await;
            }
        });
        Ok(rx)
    }
}
