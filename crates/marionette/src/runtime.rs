//! # Shared Runtime
//!
//! The pieces every session shares: one task runner feeding the loop, the
//! worker pools and the loaded configuration.
//!
//! ```text
//!   on_start / on_update / on_stop ──> callback pool (keyed, drop if busy)
//!   event handlers ──────────────────> handler pool
//!   script.stop() ───────────────────> its own short-lived thread
//! ```
//!
//! Scripts that never return from a callback can fill the callback pool;
//! neither handlers nor stop requests queue behind them.

use crate::config::MarionetteConfig;
use crate::error::HostError;
use crate::script::Callback;
use marionette_core::{EntityId, TaskRunner, WorkerPool};
use marionette_world::WorldAccess;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

/// The world as actions see it.
pub type DynWorld = dyn WorldAccess;

/// Task runner whose actions receive the world.
pub type WorldRunner = TaskRunner<DynWorld>;

/// Pool running lifecycle callbacks, keyed per entity and callback kind.
pub type CallbackPool = WorkerPool<(EntityId, Callback)>;

/// Pool running event handlers.
pub type HandlerPool = WorkerPool<EntityId>;

/// Shared scheduling state.
#[derive(Debug)]
pub struct Runtime {
    runner: Arc<WorldRunner>,
    pool: Arc<CallbackPool>,
    handlers: Arc<HandlerPool>,
    config: MarionetteConfig,
}

impl Runtime {
    /// Validates `config` and starts the worker pools.
    ///
    /// # Errors
    ///
    /// Returns `HostError::Config` for invalid settings or
    /// `HostError::WorkerStartup` if threads cannot be spawned.
    pub fn new(config: MarionetteConfig) -> Result<Arc<Self>, HostError> {
        config.validate()?;
        let pool = WorkerPool::new(
            "marionette-callback",
            config.lifecycle.workers,
            config.lifecycle.queue_capacity,
        )
        .map_err(|e| HostError::WorkerStartup(e.to_string()))?;
        let handlers = WorkerPool::new(
            "marionette-handler",
            config.lifecycle.handler_workers,
            config.lifecycle.queue_capacity,
        )
        .map_err(|e| HostError::WorkerStartup(e.to_string()))?;

        Ok(Arc::new(Self {
            runner: Arc::new(TaskRunner::new()),
            pool: Arc::new(pool),
            handlers: Arc::new(handlers),
            config,
        }))
    }

    /// The task runner.
    #[must_use]
    pub fn runner(&self) -> &Arc<WorldRunner> {
        &self.runner
    }

    /// The callback pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<CallbackPool> {
        &self.pool
    }

    /// The event handler pool.
    #[must_use]
    pub fn handlers(&self) -> &Arc<HandlerPool> {
        &self.handlers
    }

    /// Calls `stop` on a thread of its own and returns without waiting.
    ///
    /// Returns false if the thread could not be spawned; the script is then
    /// left running.
    pub fn request_stop(&self, id: EntityId, stop: impl FnOnce() + Send + 'static) -> bool {
        let spawned = thread::Builder::new()
            .name(format!("marionette-stop-{id}"))
            .spawn(move || {
                if panic::catch_unwind(AssertUnwindSafe(stop)).is_err() {
                    tracing::warn!(entity = %id, "script_stop_panicked");
                }
            });
        match spawned {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(entity = %id, error = %err, "script_stop_not_dispatched");
                false
            }
        }
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &MarionetteConfig {
        &self.config
    }

    /// Closes the runner (failing queued work) and joins both pools.
    pub fn shutdown(&self) {
        self.runner.shutdown();
        self.pool.shutdown();
        self.handlers.shutdown();
    }
}
