//! # Command Future
//!
//! Single-assignment result cell bridging the loop thread and a waiting caller.
//!
//! ```text
//!   Pending ──complete(v)──> Completed(v) ──wait()──> Ok(v)
//!      │
//!      └────fail(e)──────> Failed(e)    ──wait()──> Err(e)
//! ```
//!
//! The first `complete`/`fail` wins. Later attempts leave the cell untouched
//! and return `false`.
//!
//! Waiting parks the thread on a condition variable. There is no timeout on
//! [`CommandFuture::wait`]; teardown of the owning session is what releases a
//! stuck caller.

use crate::error::{CommandError, CommandResult};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

enum Slot<T> {
    Pending,
    Completed(T),
    Failed(CommandError),
    /// The outcome was handed to a waiter.
    Taken,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    condvar: Condvar,
}

/// Handle to a single-assignment result.
///
/// Clones share the same cell. The producer keeps one clone, the caller keeps
/// another; the cell is freed when both are dropped. The outcome can be
/// taken out exactly once, by whichever clone waits first.
pub struct CommandFuture<T> {
    shared: Arc<Shared<T>>,
}

impl<T> CommandFuture<T> {
    /// Creates a pending future.
    #[must_use]
    pub fn new() -> Self {
        Self::with_slot(Slot::Pending)
    }

    /// Creates a future that is already completed.
    #[must_use]
    pub fn completed(value: T) -> Self {
        Self::with_slot(Slot::Completed(value))
    }

    /// Creates a future that has already failed.
    #[must_use]
    pub fn failed(error: CommandError) -> Self {
        Self::with_slot(Slot::Failed(error))
    }

    fn with_slot(slot: Slot<T>) -> Self {
        Self {
            shared: Arc::new(Shared {
                slot: Mutex::new(slot),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Completes the future with a value.
    ///
    /// Returns `false` (and drops `value`) if the future was already settled.
    pub fn complete(&self, value: T) -> bool {
        self.settle(Slot::Completed(value))
    }

    /// Fails the future with an error.
    ///
    /// Returns `false` if the future was already settled.
    pub fn fail(&self, error: CommandError) -> bool {
        self.settle(Slot::Failed(error))
    }

    fn settle(&self, outcome: Slot<T>) -> bool {
        let mut slot = self.shared.slot.lock();
        if !matches!(*slot, Slot::Pending) {
            return false;
        }
        *slot = outcome;
        drop(slot);
        self.shared.condvar.notify_all();
        true
    }

    /// Returns true once the future has been completed or failed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        !matches!(*self.shared.slot.lock(), Slot::Pending)
    }

    /// Blocks until the future settles and returns its outcome.
    ///
    /// # Errors
    ///
    /// Returns the error the future was failed with. If another clone already
    /// took the outcome, returns [`CommandError::ExecutionFailed`].
    pub fn wait(self) -> CommandResult<T> {
        let mut slot = self.shared.slot.lock();
        while matches!(*slot, Slot::Pending) {
            self.shared.condvar.wait(&mut slot);
        }
        take(&mut slot)
    }

    /// Blocks for at most `timeout`.
    ///
    /// Returns `None` if the future is still pending when the timeout expires.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<CommandResult<T>> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.shared.slot.lock();
        while matches!(*slot, Slot::Pending) {
            if self
                .shared
                .condvar
                .wait_until(&mut slot, deadline)
                .timed_out()
            {
                break;
            }
        }
        if matches!(*slot, Slot::Pending) {
            None
        } else {
            Some(take(&mut slot))
        }
    }
}

fn take<T>(slot: &mut Slot<T>) -> CommandResult<T> {
    match std::mem::replace(slot, Slot::Taken) {
        Slot::Completed(value) => Ok(value),
        Slot::Failed(error) => Err(error),
        Slot::Taken => Err(CommandError::failed("result already taken")),
        Slot::Pending => {
            *slot = Slot::Pending;
            Err(CommandError::failed("future still pending"))
        }
    }
}

impl<T> Clone for CommandFuture<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for CommandFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for CommandFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match *self.shared.slot.lock() {
            Slot::Pending => "pending",
            Slot::Completed(_) => "completed",
            Slot::Failed(_) => "failed",
            Slot::Taken => "taken",
        };
        f.debug_struct("CommandFuture").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InterruptCause;
    use std::thread;

    #[test]
    fn test_complete_then_wait() {
        let future = CommandFuture::new();
        assert!(!future.is_done());
        assert!(future.complete(5));
        assert!(future.is_done());
        assert_eq!(future.wait(), Ok(5));
    }

    #[test]
    fn test_second_settle_is_noop() {
        let future = CommandFuture::new();
        assert!(future.complete(1));
        assert!(!future.complete(2));
        assert!(!future.fail(CommandError::Closed));
        assert_eq!(future.wait(), Ok(1));
    }

    #[test]
    fn test_fail_propagates() {
        let future: CommandFuture<()> = CommandFuture::new();
        future.fail(CommandError::Interrupted(InterruptCause::Interrupted));
        assert_eq!(
            future.wait(),
            Err(CommandError::Interrupted(InterruptCause::Interrupted))
        );
    }

    #[test]
    fn test_wait_blocks_until_other_thread_completes() {
        let future = CommandFuture::new();
        let producer = future.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.complete("done")
        });

        assert_eq!(future.wait(), Ok("done"));
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_wait_timeout_pending() {
        let future: CommandFuture<u8> = CommandFuture::new();
        assert!(future.wait_timeout(Duration::from_millis(5)).is_none());
        future.complete(9);
        assert_eq!(future.wait_timeout(Duration::from_millis(5)), Some(Ok(9)));
    }

    #[test]
    fn test_outcome_taken_once() {
        let future = CommandFuture::completed(3);
        let other = future.clone();
        assert_eq!(future.wait(), Ok(3));
        assert!(matches!(other.wait(), Err(CommandError::ExecutionFailed(_))));
    }

    #[test]
    fn test_debug_state() {
        let future: CommandFuture<u8> = CommandFuture::failed(CommandError::Closed);
        assert!(format!("{future:?}").contains("failed"));
    }
}
