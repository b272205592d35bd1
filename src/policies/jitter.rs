//! # Jitter policy for backoff delays.
//!
//! [`JitterPolicy`] randomizes backoff delays so that callers failing at the same
//! moment do not retry in lockstep (thundering herd).
//!
//! - [`JitterPolicy::None`]: exact delay
//! - [`JitterPolicy::Full`]: random delay in `[0, delay]`
//! - [`JitterPolicy::Equal`]: `delay/2 + random[0, delay/2]`
//! - [`JitterPolicy::Additive`]: `delay + random[0, max)`; never shortens the delay

use rand::Rng;
use std::time::Duration;

/// Policy controlling randomization of backoff delays.
///
/// ## Trade-offs
/// - **None**: predictable, risks synchronized retries
/// - **Full**: maximum spread, may retry almost immediately
/// - **Equal**: keeps at least half of the computed delay
/// - **Additive**: keeps the whole delay and adds a bounded random offset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum JitterPolicy {
    /// No jitter: use exact backoff delay.
    #[default]
    None,

    /// Full jitter: random delay in `[0, delay]`.
    Full,

    /// Equal jitter: `delay/2 + random[0, delay/2]`.
    Equal,

    /// Additive jitter: `delay + random[0, max)`.
    Additive {
        /// Exclusive upper bound of the random addend.
        max: Duration,
    },
}

impl JitterPolicy {
    /// Applies jitter to the given delay.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => full_jitter(delay),
            JitterPolicy::Equal => equal_jitter(delay),
            JitterPolicy::Additive { max } => delay.saturating_add(additive_jitter(*max)),
        }
    }
}

/// random[0, delay]
fn full_jitter(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=ms))
}

/// delay/2 + random[0, delay/2]
fn equal_jitter(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    let half = ms / 2;
    let jitter = if half == 0 {
        0
    } else {
        rand::rng().random_range(0..=half)
    };
    Duration::from_millis(half + jitter)
}

/// random[0, max)
fn additive_jitter(max: Duration) -> Duration {
    let ms = max.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..ms))
}
