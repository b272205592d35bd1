//! # Exponential backoff policy.
//!
//! [`BackoffPolicy`] controls how delays grow between consecutive failures. It is used by
//! [`RetryPolicy`](crate::RetryPolicy) between attempts and by
//! [`SupervisorLoop`](crate::SupervisorLoop) between restarts.
//!
//! The delay after failure `n` (0-indexed) is `first × factor^n`, clamped to `max`,
//! then jitter is applied. The base is derived from the failure index alone, so
//! jitter never compounds into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use flowvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_millis(800),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(100));
//! assert_eq!(backoff.next(2), Duration::from_millis(400));
//! assert_eq!(backoff.next(9), Duration::from_millis(800));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Exponential backoff with a ceiling and optional jitter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub first: Duration,
    /// Ceiling applied before jitter.
    pub max: Duration,
    /// Multiplicative growth factor (`2.0` doubles every failure).
    pub factor: f64,
    /// Randomization applied on top of the clamped delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a doubling policy:
    /// - `first = 100ms`;
    /// - `factor = 2.0`;
    /// - `max = 800ms`;
    /// - `jitter = None`.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_millis(800),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Doubling policy starting at `first`, keeping the other defaults.
    pub fn doubling(first: Duration) -> Self {
        Self {
            first,
            ..Self::default()
        }
    }

    /// Returns a copy with a different jitter policy.
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns a copy with a different ceiling.
    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    /// Computes the delay after failure number `attempt` (0-indexed).
    ///
    /// Non-finite or negative intermediate values clamp to [`BackoffPolicy::max`].
    pub fn next(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}
