//! # Publish/subscribe broker.
//!
//! - [`Broker`] handle: clone it freely, every clone talks to the same owning loop.
//! - [`Subscription`] receiving end of one subscriber, with its own bounded buffer.
//!
//! ## Architecture
//! ```text
//! publish / subscribe / unsubscribe / count
//!           │
//!           ▼
//!   [command queue] ──► broker loop (sole owner of the registry)
//!                          │ try_send (never blocks)
//!                          ├──► [buffer 1] ──► Subscription 1
//!                          ├──► [buffer 2] ──► Subscription 2
//!                          └──► [buffer N] ──► Subscription N
//! ```

mod broker;
mod subscription;

pub use broker::Broker;
pub use subscription::Subscription;
