//! # Task Runner
//!
//! Moves work from arbitrary threads onto the authoritative loop.
//!
//! ## Design
//!
//! ```text
//!   submit() ─┐   seq + eligible tick stamped under one lock
//!             ├──> [VecDeque<WorkItem>] ──> tick(ctx): pop eligible, run, repeat
//!   submit_for_result() ─┘                         │
//!                                                  └──> CommandFuture settled
//! ```
//!
//! - Any thread may submit. Only the thread calling [`TaskRunner::tick`] runs
//!   actions, and ticks are serialized, so two actions never run at once.
//! - Items are stamped with a sequence number and an eligible tick when they
//!   are enqueued. A delay postpones eligibility; it never lets an item jump
//!   ahead of an earlier item from the same owner.
//! - A failing action fails only its own future. Panics are caught and
//!   converted to [`CommandError::ExecutionFailed`].
//! - Actions may submit more work. New items become eligible on a later tick.

use crate::error::{CommandError, CommandResult, InterruptCause};
use crate::ids::EntityId;
use crate::sync::CommandFuture;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

/// Runs the item; returns false when the action reported an error.
type Action<C> = Box<dyn FnOnce(&mut C) -> bool + Send>;
type Abort = Box<dyn FnOnce(CommandError) + Send>;

/// A unit of work waiting for its tick.
struct WorkItem<C: ?Sized> {
    seq: u64,
    owner: Option<EntityId>,
    eligible_tick: u64,
    action: Action<C>,
    /// Settles the item's future when it is dropped without running.
    abort: Abort,
}

struct Queue<C: ?Sized> {
    items: VecDeque<WorkItem<C>>,
    next_seq: u64,
    closed: bool,
}

/// Outcome of one [`TaskRunner::tick`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The tick number that was just run.
    pub tick: u64,
    /// Items executed this tick.
    pub executed: u32,
    /// Items whose action returned an error or panicked.
    pub failed: u32,
}

/// Cumulative runner counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunnerStats {
    /// Items accepted into the queue.
    pub submitted: u64,
    /// Items that ran to completion (successfully or not).
    pub executed: u64,
    /// Items whose action failed.
    pub failed: u64,
    /// Items dropped without running.
    pub cancelled: u64,
}

/// Command scheduler bridging script threads and the authoritative loop.
///
/// `C` is the context actions receive: the world for the real host, or any
/// plain value in tests.
pub struct TaskRunner<C: ?Sized> {
    queue: Mutex<Queue<C>>,
    /// Serializes ticks so actions never overlap.
    tick_lock: Mutex<()>,
    current_tick: AtomicU64,
    submitted: AtomicU64,
    executed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

impl<C: ?Sized> TaskRunner<C> {
    /// Creates an empty runner at tick 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Queue {
                items: VecDeque::new(),
                next_seq: 0,
                closed: false,
            }),
            tick_lock: Mutex::new(()),
            current_tick: AtomicU64::new(0),
            submitted: AtomicU64::new(0),
            executed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
        }
    }

    /// Enqueues a fire-and-forget action.
    ///
    /// The action becomes eligible `delay_ticks` ticks from now (a delay of
    /// zero means the next tick). Errors it returns are logged and dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Closed`] after [`TaskRunner::shutdown`].
    pub fn submit<F>(
        &self,
        owner: Option<EntityId>,
        delay_ticks: u64,
        action: F,
    ) -> CommandResult<u64>
    where
        F: FnOnce(&mut C) -> CommandResult<()> + Send + 'static,
    {
        let run: Action<C> = Box::new(move |ctx: &mut C| match action(ctx) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, owner = ?owner, "fire_and_forget_failed");
                false
            }
        });
        self.enqueue(owner, delay_ticks, run, Box::new(|_| {}))
    }

    /// Enqueues an action and returns a future for its result.
    ///
    /// If the runner is closed the returned future has already failed with
    /// [`CommandError::Closed`].
    pub fn submit_for_result<T, F>(
        &self,
        owner: Option<EntityId>,
        delay_ticks: u64,
        action: F,
    ) -> CommandFuture<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut C) -> CommandResult<T> + Send + 'static,
    {
        let future = CommandFuture::new();
        let completer = future.clone();
        let aborter = future.clone();

        let run: Action<C> = Box::new(move |ctx: &mut C| match action(ctx) {
            Ok(value) => {
                completer.complete(value);
                true
            }
            Err(err) => {
                completer.fail(err);
                false
            }
        });
        let abort: Abort = Box::new(move |err| {
            aborter.fail(err);
        });

        if let Err(err) = self.enqueue(owner, delay_ticks, run, abort) {
            future.fail(err);
        }
        future
    }

    fn enqueue(
        &self,
        owner: Option<EntityId>,
        delay_ticks: u64,
        action: Action<C>,
        abort: Abort,
    ) -> CommandResult<u64> {
        let mut queue = self.queue.lock();
        if queue.closed {
            return Err(CommandError::Closed);
        }
        let seq = queue.next_seq;
        queue.next_seq += 1;
        // Read under the queue lock so the stamp is ordered with `seq`.
        let eligible_tick = self.current_tick.load(Ordering::Acquire) + delay_ticks.max(1);
        queue.items.push_back(WorkItem {
            seq,
            owner,
            eligible_tick,
            action,
            abort,
        });
        drop(queue);

        self.submitted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(seq, owner = ?owner, eligible_tick, "work_enqueued");
        Ok(seq)
    }

    /// Advances one tick and runs every item that has become eligible.
    ///
    /// Must be called from the authoritative loop. The queue lock is not held
    /// while an action runs.
    pub fn tick(&self, ctx: &mut C) -> TickReport {
        let _serial = self.tick_lock.lock();
        let tick = {
            // Advance under the queue lock; `enqueue` stamps under the same lock.
            let _queue = self.queue.lock();
            self.current_tick.fetch_add(1, Ordering::AcqRel) + 1
        };

        let mut report = TickReport {
            tick,
            ..TickReport::default()
        };

        while let Some(item) = self.pop_eligible(tick) {
            let WorkItem {
                seq,
                owner,
                action,
                abort,
                ..
            } = item;

            report.executed += 1;
            self.executed.fetch_add(1, Ordering::Relaxed);

            match panic::catch_unwind(AssertUnwindSafe(|| action(&mut *ctx))) {
                Ok(true) => {}
                Ok(false) => {
                    report.failed += 1;
                    self.failed.fetch_add(1, Ordering::Relaxed);
                }
                Err(payload) => {
                    let reason = panic_message(payload.as_ref());
                    tracing::warn!(seq, owner = ?owner, reason = %reason, "action_panicked");
                    report.failed += 1;
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    abort(CommandError::ExecutionFailed(reason));
                }
            }
        }

        report
    }

    /// Pops the oldest item that may run at `tick`.
    ///
    /// An owner whose oldest queued item is not yet eligible is skipped
    /// entirely, keeping each owner's items in submission order.
    fn pop_eligible(&self, tick: u64) -> Option<WorkItem<C>> {
        let mut queue = self.queue.lock();
        let mut held: Vec<EntityId> = Vec::new();
        let mut found = None;

        for (index, item) in queue.items.iter().enumerate() {
            if let Some(owner) = item.owner {
                if held.contains(&owner) {
                    continue;
                }
                if item.eligible_tick > tick {
                    held.push(owner);
                    continue;
                }
            } else if item.eligible_tick > tick {
                continue;
            }
            found = Some(index);
            break;
        }

        found.and_then(|index| queue.items.remove(index))
    }

    /// Drops every queued item of `owner`, failing their futures.
    ///
    /// Items already running are not affected. Returns the number dropped.
    pub fn cancel_owner(&self, owner: EntityId, cause: InterruptCause) -> usize {
        let dropped: Vec<WorkItem<C>> = {
            let mut queue = self.queue.lock();
            let (mine, rest): (VecDeque<_>, VecDeque<_>) = queue
                .items
                .drain(..)
                .partition(|item| item.owner == Some(owner));
            queue.items = rest;
            mine.into_iter().collect()
        };

        let count = dropped.len();
        for item in dropped {
            (item.abort)(CommandError::Interrupted(cause));
        }
        if count > 0 {
            self.cancelled.fetch_add(count as u64, Ordering::Relaxed);
            tracing::debug!(entity = %owner, count, cause = %cause, "work_cancelled");
        }
        count
    }

    /// Stops accepting work and fails everything still queued with
    /// [`CommandError::Closed`].
    pub fn shutdown(&self) {
        let dropped: Vec<WorkItem<C>> = {
            let mut queue = self.queue.lock();
            queue.closed = true;
            queue.items.drain(..).collect()
        };
        let count = dropped.len();
        for item in dropped {
            (item.abort)(CommandError::Closed);
        }
        self.cancelled.fetch_add(count as u64, Ordering::Relaxed);
        tracing::info!(dropped = count, "task_runner_shutdown");
    }

    /// Returns true after [`TaskRunner::shutdown`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.queue.lock().closed
    }

    /// Number of queued items.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.queue.lock().items.len()
    }

    /// Number of queued items belonging to `owner`.
    #[must_use]
    pub fn pending_for(&self, owner: EntityId) -> usize {
        self.queue
            .lock()
            .items
            .iter()
            .filter(|item| item.owner == Some(owner))
            .count()
    }

    /// The last tick that was run.
    #[inline]
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.current_tick.load(Ordering::Acquire)
    }

    /// Cumulative counters.
    #[must_use]
    pub fn stats(&self) -> RunnerStats {
        RunnerStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

impl<C: ?Sized> Default for TaskRunner<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized> fmt::Debug for TaskRunner<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.queue.lock();
        f.debug_struct("TaskRunner")
            .field("pending", &queue.items.len())
            .field("next_seq", &queue.next_seq)
            .field("closed", &queue.closed)
            .field("current_tick", &self.current_tick())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "action panicked".to_string()
    }
}
