//! # Shared defaults for the primitives.
//!
//! Provides [`Config`], centralized settings consumed by the `with_config` / `from_config`
//! constructors:
//! - [`Pipeline::with_config`](crate::Pipeline::with_config) → `stream_capacity`
//! - [`Broker::with_config`](crate::Broker::with_config) → `broker_capacity`, `subscriber_capacity`
//! - [`SupervisorLoop::with_config`](crate::SupervisorLoop::with_config) → `backoff`, `attempt_timeout`
//! - [`RetryPolicy::from_config`](crate::RetryPolicy::from_config) → `retry_attempts`, `backoff`, `retry_jitter`
//!
//! ## Sentinel values
//! - `attempt_timeout = 0s` → no per-attempt timeout
//! - capacities of `0` are clamped to `1`

use std::time::Duration;

use crate::policies::{BackoffPolicy, JitterPolicy};

/// Defaults shared by the coordination primitives.
///
/// All fields are public. Prefer the accessors, which apply clamping and sentinels.
#[derive(Clone, Debug)]
pub struct Config {
    /// Buffer size of every stream combinator output (`0` is clamped to `1`).
    pub stream_capacity: usize,

    /// Capacity of the broker command queue (publish/subscribe/unsubscribe requests).
    pub broker_capacity: usize,

    /// Default per-subscriber buffer used by [`Broker::subscribe_default`](crate::Broker::subscribe_default).
    pub subscriber_capacity: usize,

    /// Backoff between supervisor restarts and between retry attempts.
    pub backoff: BackoffPolicy,

    /// Default number of attempts for [`RetryPolicy::from_config`](crate::RetryPolicy::from_config).
    pub retry_attempts: u32,

    /// Jitter added to retry sleeps.
    pub retry_jitter: JitterPolicy,

    /// Per-attempt timeout for supervised tasks.
    ///
    /// - `Duration::ZERO` = no timeout
    /// - `> 0` = each attempt is cancelled and counted as failed once it elapses
    pub attempt_timeout: Duration,
}

impl Config {
    /// Stream buffer clamped to a minimum of 1.
    #[inline]
    pub fn stream_capacity_clamped(&self) -> usize {
        self.stream_capacity.max(1)
    }

    /// Broker command queue clamped to a minimum of 1.
    #[inline]
    pub fn broker_capacity_clamped(&self) -> usize {
        self.broker_capacity.max(1)
    }

    /// Subscriber buffer clamped to a minimum of 1.
    #[inline]
    pub fn subscriber_capacity_clamped(&self) -> usize {
        self.subscriber_capacity.max(1)
    }

    /// Returns the per-attempt timeout as an `Option`.
    ///
    /// - `None` → no timeout
    /// - `Some(d)` → timeout applied per attempt
    #[inline]
    pub fn attempt_timeout(&self) -> Option<Duration> {
        if self.attempt_timeout == Duration::ZERO {
            None
        } else {
            Some(self.attempt_timeout)
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `stream_capacity = 1` (near-unbuffered handoff, tight backpressure)
    /// - `broker_capacity = 64`
    /// - `subscriber_capacity = 16`
    /// - `backoff = BackoffPolicy::default()` (100ms doubling, 800ms cap)
    /// - `retry_attempts = 3`
    /// - `retry_jitter = Additive { max: 100ms }`
    /// - `attempt_timeout = 0s` (none)
    fn default() -> Self {
        Self {
            stream_capacity: 1,
            broker_capacity: 64,
            subscriber_capacity: 16,
            backoff: BackoffPolicy::default(),
            retry_attempts: 3,
            retry_jitter: JitterPolicy::Additive {
                max: Duration::from_millis(100),
            },
            attempt_timeout: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacities_are_clamped() {
        let cfg = Config {
            stream_capacity: 0,
            broker_capacity: 0,
            subscriber_capacity: 0,
            ..Config::default()
        };
        assert_eq!(cfg.stream_capacity_clamped(), 1);
        assert_eq!(cfg.broker_capacity_clamped(), 1);
        assert_eq!(cfg.subscriber_capacity_clamped(), 1);
    }

    #[test]
    fn zero_timeout_means_none() {
        let mut cfg = Config::default();
        assert_eq!(cfg.attempt_timeout(), None);
        cfg.attempt_timeout = Duration::from_secs(2);
        assert_eq!(cfg.attempt_timeout(), Some(Duration::from_secs(2)));
    }
}
