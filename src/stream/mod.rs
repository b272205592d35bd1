//! # Streaming combinators.
//!
//! A [`Stream<T>`] is a bounded `tokio::sync::mpsc::Receiver<T>`: ordered, finite or infinite,
//! closed once every sender is gone. A [`Pipeline`] carries the cancellation token and
//! buffer size shared by every combinator it builds.
//!
//! ## Combinators
//! | shape      | method                                   | ordering                     |
//! |------------|------------------------------------------|------------------------------|
//! | source     | [`Pipeline::source`]                     | iterator order               |
//! | 1 → 1      | [`Pipeline::stage`], [`Pipeline::filter`]| preserved                    |
//! | 1 → N → 1  | [`Pipeline::pool`]                       | completion order             |
//! | N → 1      | [`Pipeline::merge`], [`Pipeline::merge_all`] | per-source preserved     |
//! | 1 → 2      | [`Pipeline::tee`]                        | identical on both outputs    |
//! | streams→1  | [`Pipeline::bridge`]                     | inner streams concatenated   |
//! | 1 → batches| [`Pipeline::batch`]                      | preserved                    |
//! | 1 → 1 lossy| [`Pipeline::shed`]                       | preserved, drops when full   |
//!
//! Plus [`any_signal`] (first-of-many cancellation) and [`shedding_queue`].
//!
//! ## Termination rules
//! Every combinator task stops, dropping its senders (which closes its output), when
//! - its input is closed and in-flight sends are done, or
//! - the pipeline token fires, or
//! - every consumer of its output has gone away.

mod batch;
mod bridge;
mod merge;
mod or;
mod pipeline;
mod pool;
mod shed;
mod stage;
mod tee;

pub use or::{AnySignal, any_signal};
pub use pipeline::{Pipeline, Stream};
pub use shed::{ShedStats, SheddingQueue, shedding_queue};
