//! # Task abstraction.
//!
//! A [`Task`] is one unit of work: given a [`CancellationToken`] it produces `Ok(())` or a
//! [`FlowError`]. Tasks are stateless from the runtime's point of view; values they produce
//! travel through whatever the task captured (channels, `Arc`s).

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::FlowError;

/// Shared handle to a task, as consumed by the executor and the supervisor loop.
pub type TaskRef = Arc<dyn Task>;

/// # Asynchronous, cancelable unit of work.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use flowvisor::{CancellationToken, FlowError, Task};
///
/// struct Probe;
///
/// #[async_trait]
/// impl Task for Probe {
///     fn name(&self) -> &str { "probe" }
///
///     async fn run(&self, ctx: CancellationToken) -> Result<(), FlowError> {
///         if ctx.is_cancelled() {
///             return Err(FlowError::Canceled);
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Returns a stable, human-readable task name (used in logs).
    fn name(&self) -> &str;

    /// Executes the task until completion or cancellation.
    ///
    /// Implementations should observe `ctx` and return [`FlowError::Canceled`] promptly
    /// once it fires.
    async fn run(&self, ctx: CancellationToken) -> Result<(), FlowError>;
}
