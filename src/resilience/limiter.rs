//! # Token-bucket rate limiter.
//!
//! ```text
//! refill task ── every 1/R ──► +1 token (only if below burst)
//!                                  │
//!                          [bucket: 0..=B]  (starts full)
//!                                  │
//! acquire(token) ◄── take 1 ───────┘   waits in FIFO order, races cancellation
//! ```
//!
//! The bucket is a [`Semaphore`]: permits are tokens, and an acquired permit is
//! forgotten rather than returned. The refill task is the only writer that adds
//! permits, so the count never exceeds the burst. It stops when the limiter is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::error::{ConfigError, FlowError, ensure_nonzero};

/// Rate limiter allowing `rate` permits per second with bursts up to `burst`.
///
/// Must be created inside a tokio runtime.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Arc<Semaphore>,
    burst: usize,
    interval: Duration,
    _refill: DropGuard,
}

impl RateLimiter {
    /// Creates a full bucket and starts refilling it.
    ///
    /// Returns [`ConfigError`] if `rate` is not a positive finite number, if `1 / rate`
    /// seconds does not fit in a [`Duration`], or if `burst == 0`.
    pub fn new(rate: f64, burst: usize) -> Result<Self, ConfigError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ConfigError::invalid("rate", "must be a positive number"));
        }
        let burst = ensure_nonzero("burst", burst)?;
        let interval = Duration::try_from_secs_f64(1.0 / rate)
            .map_err(|_| ConfigError::invalid("rate", "refill interval out of range"))?
            .max(Duration::from_nanos(1));

        let bucket = Arc::new(Semaphore::new(burst));
        let stop = CancellationToken::new();
        tokio::spawn(refill(Arc::clone(&bucket), burst, interval, stop.clone()));

        Ok(Self {
            bucket,
            burst,
            interval,
            _refill: stop.drop_guard(),
        })
    }

    /// Waits for a token, or fails with [`FlowError::Canceled`] once `token` fires.
    pub async fn acquire(&self, token: &CancellationToken) -> Result<(), FlowError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(FlowError::Canceled),
            permit = self.bucket.acquire() => match permit {
                Ok(permit) => {
                    permit.forget();
                    Ok(())
                }
                Err(_closed) => Err(FlowError::Canceled),
            },
        }
    }

    /// Takes a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        match self.bucket.try_acquire() {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    /// Tokens currently in the bucket.
    pub fn available(&self) -> usize {
        self.bucket.available_permits()
    }

    /// Bucket capacity.
    pub fn burst(&self) -> usize {
        self.burst
    }

    /// Time between refills.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

async fn refill(bucket: Arc<Semaphore>, burst: usize, interval: Duration, stop: CancellationToken) {
    let Some(first) = Instant::now().checked_add(interval) else {
        debug!(?interval, "refill interval beyond the clock range; bucket never refills");
        stop.cancelled().await;
        bucket.close();
        return;
    };
    let mut ticks = time::interval_at(first, interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticks.tick() => {
                if bucket.available_permits() < burst {
                    bucket.add_permits(1);
                }
            }
        }
    }
    bucket.close();
    debug!("rate limiter refill stopped");
}
