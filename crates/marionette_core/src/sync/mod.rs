//! # Cross-Thread Synchronization
//!
//! Primitives written by the authoritative loop and awaited by script threads.

mod future;

pub use future::CommandFuture;
