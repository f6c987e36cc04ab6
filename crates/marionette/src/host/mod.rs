//! # Authoritative Host
//!
//! Owns the world and drives everything that must happen on the loop
//! thread.
//!
//! ## One tick
//!
//! ```text
//!   1. pump events      bridge ──> sessions (wake waiters, dispatch handlers)
//!   2. run commands     runner.tick(&mut world)
//!   3. publish changes  world.drain_changes() ──> bridge
//!   4. regenerate       stamina += regen_per_tick, per session
//!   5. on_update        dispatched to every bound session (drop if busy)
//! ```
//!
//! Events from changes made in step 2 are delivered in step 1 of the next
//! tick.

pub mod tick_loop;

use crate::config::MarionetteConfig;
use crate::control::Controller;
use crate::error::{HostError, SessionResult};
use crate::events::{EventBridge, EventPublisher, PumpReport};
use crate::persist::TomlInventoryStore;
use crate::registry::SessionRegistry;
use crate::runtime::Runtime;
use crate::script::{Callback, ScriptEngine};
use crate::session::{EntitySession, SessionState};
use marionette_core::{Dispatch, EntityId, TickReport};
use marionette_world::WorldAccess;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use tick_loop::{TickLoop, TickStats, MAX_CATCH_UP};

/// Summary of one [`Host::tick`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HostTick {
    /// Event delivery.
    pub events: PumpReport,
    /// Command execution.
    pub commands: TickReport,
    /// Events published from world changes.
    pub published: usize,
    /// `on_update` callbacks started.
    pub updates: usize,
}

/// The authoritative loop over a world `W`.
#[derive(Debug)]
pub struct Host<W> {
    world: W,
    runtime: Arc<Runtime>,
    registry: Arc<SessionRegistry>,
    bridge: EventBridge,
    tick_loop: TickLoop,
}

impl<W> Host<W>
where
    W: WorldAccess + 'static,
{
    /// Builds a host around `world`.
    ///
    /// # Errors
    ///
    /// Returns `HostError` for invalid configuration or if the callback
    /// pool cannot start.
    pub fn new(world: W, config: MarionetteConfig) -> Result<Self, HostError> {
        let inventory_dir = config.persistence.inventory_dir.clone();
        let channel_capacity = config.events.channel_capacity;
        let tick_rate = config.host.tick_rate;

        let runtime = Runtime::new(config)?;
        let registry = match inventory_dir {
            Some(dir) => SessionRegistry::with_inventory_store(
                Arc::clone(&runtime),
                Arc::new(TomlInventoryStore::new(dir)),
            ),
            None => SessionRegistry::new(Arc::clone(&runtime)),
        };

        tracing::info!(tick_rate, channel_capacity, "host_created");
        Ok(Self {
            world,
            runtime,
            registry: Arc::new(registry),
            bridge: EventBridge::new(channel_capacity),
            tick_loop: TickLoop::new(tick_rate),
        })
    }

    /// Runs one tick.
    pub fn tick(&mut self) -> HostTick {
        let events = self.bridge.pump(&self.registry);
        let commands = self.runtime.runner().tick(&mut self.world);
        let changes = self.world.drain_changes();
        let published = self.bridge.publish_changes(&changes);

        let mut updates = 0;
        for session in self.registry.sessions() {
            session.regenerate();
            if session.state() != SessionState::Idle
                && session.dispatch(Callback::Update) == Some(Dispatch::Started)
            {
                updates += 1;
            }
        }

        if commands.executed > 0 || events.events > 0 {
            tracing::debug!(
                tick = commands.tick,
                executed = commands.executed,
                failed = commands.failed,
                events = events.events,
                published,
                "host_tick"
            );
        }
        HostTick {
            events,
            commands,
            published,
            updates,
        }
    }

    /// Ticks at the configured rate until `stop` is set.
    pub fn run_until(&mut self, stop: &AtomicBool) {
        tracing::info!(tick_us = ?self.tick_loop.tick_duration(), "host_loop_started");
        while !stop.load(Ordering::Acquire) {
            while self.tick_loop.should_tick() {
                let start = self.tick_loop.begin_tick();
                self.tick();
                self.tick_loop.end_tick(start);
            }
            self.tick_loop.wait_for_next_tick();
        }
        let stats = self.tick_loop.stats();
        tracing::info!(
            ticks = stats.total_ticks,
            avg_tick_us = stats.avg_tick_us,
            late_ticks = stats.late_ticks,
            dropped_ticks = stats.dropped_ticks,
            "host_loop_stopped"
        );
    }

    /// Creates the session for an actor already in the world.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadySpawned` if it exists.
    pub fn spawn_session(&mut self, id: EntityId) -> SessionResult<Arc<EntitySession>> {
        self.registry.spawn(id, &mut self.world)
    }

    /// Tears down an actor's session and saves its inventory.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownEntity` if there is no session.
    pub fn despawn_session(&mut self, id: EntityId) -> SessionResult<()> {
        self.registry.despawn(id, &self.world)
    }

    /// The world.
    #[must_use]
    pub const fn world(&self) -> &W {
        &self.world
    }

    /// The world, mutably. Only for setup between ticks.
    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    /// Shared runtime.
    #[must_use]
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Session registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// A handle for publishing world events from any thread.
    #[must_use]
    pub fn publisher(&self) -> EventPublisher {
        self.bridge.publisher()
    }

    /// The event bridge.
    #[must_use]
    pub const fn bridge(&self) -> &EventBridge {
        &self.bridge
    }

    /// A controller loading scripts with `engine`.
    #[must_use]
    pub fn controller(&self, engine: Arc<dyn ScriptEngine>) -> Controller {
        Controller::new(Arc::clone(&self.registry), engine)
    }

    /// Pacing statistics.
    #[must_use]
    pub const fn tick_stats(&self) -> &TickStats {
        self.tick_loop.stats()
    }

    /// Tears down every session, fails queued work and joins the pool.
    pub fn shutdown(&mut self) {
        self.registry.shutdown_all(&self.world);
        self.runtime.shutdown();
        tracing::info!("host_shutdown");
    }
}
