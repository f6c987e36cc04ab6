//! # Keyed Worker Pool
//!
//! Bounded pool of worker threads for work that must stay off the loop.
//!
//! ```text
//!   execute_keyed(k, job) ──> busy set has k? ──yes──> DroppedBusy
//!                                  │ no
//!                                  v
//!                       [bounded channel] ──full──> DroppedFull
//!                                  │
//!                    worker 0 .. worker N-1 (catch_unwind per job)
//! ```
//!
//! A key stays busy from dispatch until its job returns (or panics). A second
//! job for a busy key is dropped, not queued.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::hash::Hash;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Outcome of handing a job to the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// The job was queued for a worker.
    Started,
    /// A job with the same key is still in flight.
    DroppedBusy,
    /// The pool's queue is full.
    DroppedFull,
    /// The pool has been shut down.
    Closed,
}

impl Dispatch {
    /// Returns true if the job will run.
    #[inline]
    #[must_use]
    pub const fn started(self) -> bool {
        matches!(self, Self::Started)
    }
}

/// Pool counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Jobs accepted.
    pub started: u64,
    /// Jobs dropped because their key was busy.
    pub dropped_busy: u64,
    /// Jobs dropped because the queue was full.
    pub dropped_full: u64,
    /// Jobs that panicked.
    pub panicked: u64,
}

#[derive(Default)]
struct Counters {
    started: AtomicU64,
    dropped_busy: AtomicU64,
    dropped_full: AtomicU64,
    panicked: AtomicU64,
}

/// Releases a busy key when the job finishes or unwinds.
struct BusyGuard<K: Hash + Eq> {
    busy: Arc<Mutex<HashSet<K>>>,
    key: K,
}

impl<K: Hash + Eq> Drop for BusyGuard<K> {
    fn drop(&mut self) {
        self.busy.lock().remove(&self.key);
    }
}

/// Fixed-size worker pool with drop-if-busy keyed dispatch.
pub struct WorkerPool<K: Hash + Eq> {
    sender: Mutex<Option<Sender<Job>>>,
    busy: Arc<Mutex<HashSet<K>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl<K> WorkerPool<K>
where
    K: Hash + Eq + Clone + Send + 'static,
{
    /// Spawns `workers` threads sharing a queue of `capacity` jobs.
    ///
    /// # Errors
    ///
    /// Returns the OS error if a worker thread cannot be spawned.
    pub fn new(name: &str, workers: usize, capacity: usize) -> io::Result<Self> {
        let (sender, receiver) = bounded::<Job>(capacity.max(1));
        let counters = Arc::new(Counters::default());

        let mut handles = Vec::with_capacity(workers.max(1));
        for index in 0..workers.max(1) {
            let receiver = receiver.clone();
            let counters = Arc::clone(&counters);
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(&receiver, &counters))?;
            handles.push(handle);
        }

        tracing::debug!(pool = name, workers = handles.len(), capacity, "worker_pool_started");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            busy: Arc::new(Mutex::new(HashSet::new())),
            workers: Mutex::new(handles),
            counters,
        })
    }

    /// Dispatches a job unless another job with `key` is in flight.
    pub fn execute_keyed<F>(&self, key: K, job: F) -> Dispatch
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.busy.lock().insert(key.clone()) {
            self.counters.dropped_busy.fetch_add(1, Ordering::Relaxed);
            return Dispatch::DroppedBusy;
        }
        let guard = BusyGuard {
            busy: Arc::clone(&self.busy),
            key,
        };
        // A rejected job is dropped right here, releasing the key with it.
        self.send(Box::new(move || {
            let _guard = guard;
            job();
        }))
    }

    /// Dispatches a job with no key.
    pub fn execute<F>(&self, job: F) -> Dispatch
    where
        F: FnOnce() + Send + 'static,
    {
        self.send(Box::new(job))
    }

    fn send(&self, job: Job) -> Dispatch {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Dispatch::Closed;
        };
        match sender.try_send(job) {
            Ok(()) => {
                self.counters.started.fetch_add(1, Ordering::Relaxed);
                Dispatch::Started
            }
            Err(TrySendError::Full(_)) => {
                self.counters.dropped_full.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("worker_queue_full");
                Dispatch::DroppedFull
            }
            Err(TrySendError::Disconnected(_)) => Dispatch::Closed,
        }
    }

    /// Returns true while a job with `key` is queued or running.
    #[must_use]
    pub fn is_busy(&self, key: &K) -> bool {
        self.busy.lock().contains(key)
    }

    /// Number of keys currently in flight.
    #[must_use]
    pub fn busy_count(&self) -> usize {
        self.busy.lock().len()
    }

    /// Pool counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            started: self.counters.started.load(Ordering::Relaxed),
            dropped_busy: self.counters.dropped_busy.load(Ordering::Relaxed),
            dropped_full: self.counters.dropped_full.load(Ordering::Relaxed),
            panicked: self.counters.panicked.load(Ordering::Relaxed),
        }
    }

    /// Closes the queue and joins the workers after they drain it.
    ///
    /// Jobs blocked on something only the caller can release will keep the
    /// join waiting; release them first.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("worker_join_failed");
            }
        }
    }
}

fn worker_loop(receiver: &Receiver<Job>, counters: &Counters) {
    for job in receiver {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            counters.panicked.fetch_add(1, Ordering::Relaxed);
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_default();
            tracing::warn!(reason = %reason, "worker_job_panicked");
        }
    }
}

impl<K: Hash + Eq> std::fmt::Debug for WorkerPool<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.lock().len())
            .field("busy", &self.busy.lock().len())
            .field("open", &self.sender.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::time::Duration;

    #[test]
    fn test_keyed_job_runs() {
        let pool: WorkerPool<u32> = WorkerPool::new("test", 2, 8).unwrap();
        let (tx, rx) = unbounded();

        assert_eq!(pool.execute_keyed(1, move || tx.send(5).unwrap()), Dispatch::Started);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(5));
        pool.shutdown();
        assert!(!pool.is_busy(&1));
    }

    #[test]
    fn test_busy_key_drops() {
        let pool: WorkerPool<&'static str> = WorkerPool::new("test", 2, 8).unwrap();
        let (release_tx, release_rx) = unbounded::<()>();
        let (started_tx, started_rx) = unbounded::<()>();

        let first = pool.execute_keyed("update", move || {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        });
        assert_eq!(first, Dispatch::Started);
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(pool.is_busy(&"update"));
        assert_eq!(pool.execute_keyed("update", || {}), Dispatch::DroppedBusy);
        // Other keys are independent.
        assert_eq!(pool.execute_keyed("start", || {}), Dispatch::Started);

        release_tx.send(()).unwrap();
        pool.shutdown();
        assert_eq!(pool.busy_count(), 0);
        assert_eq!(pool.stats().dropped_busy, 1);
    }

    #[test]
    fn test_panic_releases_key() {
        let pool: WorkerPool<u8> = WorkerPool::new("test", 1, 4).unwrap();
        pool.execute_keyed(3, || panic!("callback failed"));
        pool.shutdown();

        assert!(!pool.is_busy(&3));
        assert_eq!(pool.stats().panicked, 1);
    }

    #[test]
    fn test_closed_after_shutdown() {
        let pool: WorkerPool<u8> = WorkerPool::new("test", 1, 4).unwrap();
        pool.shutdown();
        assert_eq!(pool.execute(|| {}), Dispatch::Closed);
        assert_eq!(pool.execute_keyed(1, || {}), Dispatch::Closed);
        assert!(!pool.is_busy(&1));
    }
}
