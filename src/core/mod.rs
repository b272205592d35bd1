//! Runtime core: running, supervising and watching tasks.
//!
//! Internal modules:
//! - [`config`]: shared defaults consumed by the `with_config` constructors;
//! - [`executor`]: runs a batch of tasks under a concurrency ceiling;
//! - [`group`]: sibling futures with first-error cancellation;
//! - [`supervisor`]: restarts one task with backoff until cancelled;
//! - [`heartbeat`]: liveness signals and stall detection for long-running producers.

mod config;
mod executor;
mod group;
pub mod heartbeat;
mod supervisor;

pub use config::Config;
pub use executor::{BoundedExecutor, run_bounded};
pub use group::Group;
pub use supervisor::{RunSummary, SupervisorLoop, SupervisorState};
