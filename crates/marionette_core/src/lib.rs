//! # Marionette Core
//!
//! The scheduling kernel shared by every Marionette crate.
//!
//! ## Architecture
//!
//! ```text
//!   Script thread A ──┐                         ┌──> CommandFuture<T> (A blocks here)
//!   Script thread B ──┼──> [TaskRunner queue] ──┤
//!   Script thread N ──┘     (seq-ordered)       └──> tick() on the authoritative loop
//! ```
//!
//! - [`CommandFuture`] is a single-assignment cell written by the loop and
//!   awaited by a script thread.
//! - [`TaskRunner`] accepts work from any thread and runs it on the thread
//!   that calls [`TaskRunner::tick`], after an optional tick delay.
//! - [`WorkerPool`] runs lifecycle callbacks off the loop, dropping a job when
//!   another job with the same key is still in flight.
//!
//! Nothing in this crate knows about the world. The context type a runner
//! hands to its actions is a generic parameter.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod executor;
pub mod ids;
pub mod scheduler;
pub mod sync;

pub use error::{CommandError, CommandResult, InterruptCause};
pub use executor::{Dispatch, PoolStats, WorkerPool};
pub use ids::EntityId;
pub use scheduler::{RunnerStats, TaskRunner, TickReport};
pub use sync::CommandFuture;
