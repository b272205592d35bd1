//! Backoff and jitter policies.
//!
//! ## Contents
//! - [`BackoffPolicy`] how delays evolve between failures (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid synchronized retries
//!
//! ## Wiring
//! ```text
//! RetryPolicy    ──► backoff.next(failures) between attempts
//! SupervisorLoop ──► backoff.next(failures) between restarts (reset on success)
//! ```

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
