//! # Error group: fail-fast sibling tasks.
//!
//! [`Group`] spawns sibling futures that share one derived [`CancellationToken`].
//! The first error cancels that token so the remaining siblings can unwind, and
//! [`Group::wait`] reports it once every sibling has returned.
//!
//! ```text
//! parent ──► child_token() ─────────────┐
//!              │                        │
//!   spawn(a) ──┤  a: Err(e) ──► record e, cancel child
//!   spawn(b) ──┤  b: observes child.cancelled() → returns
//!              ▼
//!          wait() ──► Err(e)
//! ```

use std::future::Future;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::FlowError;

/// Set of sibling tasks with first-error cancellation.
pub struct Group {
    set: JoinSet<Result<(), FlowError>>,
    token: CancellationToken,
}

impl Group {
    /// Creates a group whose token is a child of `parent`.
    ///
    /// Returns the group together with the token siblings should observe.
    pub fn new(parent: &CancellationToken) -> (Self, CancellationToken) {
        let token = parent.child_token();
        let group = Self {
            set: JoinSet::new(),
            token: token.clone(),
        };
        (group, token)
    }

    /// Spawns a sibling. The group token is cancelled as soon as it fails.
    pub fn spawn<F>(&mut self, fut: F)
    where
        F: Future<Output = Result<(), FlowError>> + Send + 'static,
    {
        let token = self.token.clone();
        self.set.spawn(async move {
            let res = fut.await;
            if res.is_err() {
                token.cancel();
            }
            res
        });
    }

    /// Number of siblings that have not been joined yet.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// Returns `true` if no siblings are pending.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Waits for every sibling and returns the first error, if any.
    ///
    /// The group token is cancelled on return either way.
    pub async fn wait(mut self) -> Result<(), FlowError> {
        let mut first: Option<FlowError> = None;
        while let Some(joined) = self.set.join_next().await {
            let res = joined.unwrap_or_else(|e| Err(FlowError::fatal(format!("task panicked: {e}"))));
            if let Err(e) = res {
                self.token.cancel();
                if first.is_none() {
                    debug!(error = %e, "group member failed; cancelling siblings");
                    first = Some(e);
                }
            }
        }
        self.token.cancel();
        first.map_or(Ok(()), Err)
    }
}
