//! # flowvisor
//!
//! **Flowvisor** is a toolkit of concurrency-coordination primitives for tokio.
//!
//! It provides the pieces a service needs to move work through async pipelines and to
//! survive unreliable dependencies: cancellation, bounded execution, stream combinators,
//! an in-process broker, and resilience gates. Every blocking point races a
//! [`CancellationToken`], so cancelling the root token unwinds everything built on it.
//!
//! ## Architecture
//! ```text
//!                       CancellationToken (root)
//!                                │ child_token()
//!      ┌─────────────────────────┼──────────────────────────────┐
//!      ▼                         ▼                              ▼
//! ┌───────────────┐     ┌──────────────────┐           ┌───────────────────┐
//! │ execution     │     │ Pipeline         │           │ resilience        │
//! │ BoundedExec.  │     │ source → stage → │  publish  │ CircuitBreaker    │
//! │ Group         │     │ pool → merge ... ├──────────►│ RateLimiter       │
//! │ SupervisorLoop│     └────────┬─────────┘  Broker   │ RetryPolicy       │
//! │ heartbeat     │              ▼                     │ Singleflight      │
//! └───────────────┘        Stream<T> (mpsc)            └───────────────────┘
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / functions                          |
//! |-------------------|----------------------------------------------------------|------------------------------------------------|
//! | **Cancellation**  | Cascading stop signal and cancellable waits.             | [`CancellationToken`], [`run_cancellable`], [`with_timeout`] |
//! | **Execution**     | Bounded batches, error groups, restart loops, liveness.  | [`BoundedExecutor`], [`Group`], [`SupervisorLoop`], [`heartbeat`] |
//! | **Streams**       | Backpressured combinators over `mpsc` receivers.         | [`Pipeline`], [`Stream`], [`any_signal`]       |
//! | **Pub/Sub**       | Best-effort fan-out owned by a single loop.              | [`Broker`], [`Subscription`]                   |
//! | **Resilience**    | Gates and wrappers for unreliable calls.                 | [`CircuitBreaker`], [`RateLimiter`], [`RetryPolicy`], [`Singleflight`] |
//! | **Policies**      | Backoff growth and jitter.                               | [`BackoffPolicy`], [`JitterPolicy`]            |
//! | **Errors**        | Typed operation and construction errors.                 | [`FlowError`], [`ConfigError`]                 |
//! | **Configuration** | Shared defaults.                                         | [`Config`]                                     |
//!
//! The crate logs through [`tracing`] and never installs a subscriber.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use flowvisor::{CancellationToken, CircuitBreaker, FlowError, Pipeline, RetryPolicy};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let token = CancellationToken::new();
//!     let p = Pipeline::new(token.clone());
//!
//!     let breaker = Arc::new(CircuitBreaker::new(3, Duration::from_secs(1))?);
//!     let retry = RetryPolicy::new(3, Duration::from_millis(10))?;
//!
//!     // Fan the ids out to 4 workers, each call guarded by retry + breaker.
//!     let ids = p.source(1..=8u32);
//!     let mut results = p.pool(ids, 4, move |id| {
//!         let token = token.clone();
//!         let breaker = Arc::clone(&breaker);
//!         async move {
//!             retry
//!                 .run(&token, || breaker.call(async move { Ok::<_, FlowError>(id * 10) }))
//!                 .await
//!         }
//!     })?;
//!
//!     let mut total = 0;
//!     while let Some(res) = results.recv().await {
//!         total += res?;
//!     }
//!     assert_eq!(total, 360);
//!     Ok(())
//! }
//! ```
mod cancel;
mod core;
mod error;
mod policies;
mod pubsub;
mod resilience;
mod stream;
mod tasks;

// ---- Public re-exports ----

pub use cancel::{CancellationToken, new_token, run_cancellable, with_timeout};
pub use core::heartbeat;
pub use core::{BoundedExecutor, Config, Group, RunSummary, SupervisorLoop, SupervisorState, run_bounded};
pub use error::{ConfigError, FlowError};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use pubsub::{Broker, Subscription};
pub use resilience::{BreakerState, CircuitBreaker, RateLimiter, RetryPolicy, Singleflight, retry};
pub use stream::{AnySignal, Pipeline, ShedStats, SheddingQueue, Stream, any_signal, shedding_queue};
pub use tasks::{Task, TaskFn, TaskRef};
