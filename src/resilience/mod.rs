//! Gates and wrappers for unreliable calls.
//!
//! ## Contents
//! - [`CircuitBreaker`] fail fast while a dependency is down
//! - [`RateLimiter`]    token bucket pacing
//! - [`RetryPolicy`]    bounded attempts with backoff + jitter
//! - [`Singleflight`]   coalesce concurrent identical calls
//!
//! The breaker and the limiter only gate; neither retries internally.

mod breaker;
mod limiter;
mod retry;
mod singleflight;

pub use breaker::{BreakerState, CircuitBreaker};
pub use limiter::RateLimiter;
pub use retry::{RetryPolicy, retry};
pub use singleflight::Singleflight;
