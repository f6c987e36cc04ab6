//! # Marionette
//!
//! Scripts drive entities in a tick-based world through blocking calls that
//! are executed on the authoritative loop.
//!
//! ## Architecture
//!
//! ```text
//!   transport ──> Controller ──> EntitySession ──bind──> ScriptHandle
//!                                    │    ^                  │ on_start / on_update
//!                 commands (blocking)│    │ wait_for          v
//!                                    v    │              WorkerPool (drop if busy)
//!                              TaskRunner  EventBridge
//!                                    │    ^
//!                                    v    │ world changes
//!                     Host::tick ──> world (WorldAccess)
//! ```
//!
//! - Every world read or write happens inside [`Host::tick`].
//! - A script thread blocks only on its own command or wait; the loop never
//!   blocks on a script.
//! - Stamina is checked before a command is queued; a rejected command never
//!   reaches the runner.
//!
//! ## Example
//!
//! ```rust,ignore
//! use marionette::{Host, MarionetteConfig};
//! use marionette_world::VoxelWorld;
//!
//! let mut host = Host::new(VoxelWorld::with_loaded_radius(4), MarionetteConfig::default())?;
//! let session = host.spawn_session(id)?;
//! std::thread::spawn(move || session.forward(3));
//! host.run_until(&stop);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod host;
pub mod persist;
pub mod registry;
pub mod runtime;
pub mod script;
pub mod session;

pub use config::{
    EventsConfig, HostConfig, LifecycleConfig, MarionetteConfig, PersistenceConfig,
    SchedulerConfig, StaminaConfig,
};
pub use control::{Attachment, Controller};
pub use error::{
    ConfigError, ControlError, HostError, PersistError, ScriptError, SessionError, SessionResult,
};
pub use events::{
    BridgeStats, EventBridge, EventKind, EventPayload, EventPublisher, EventTarget, PumpReport,
    WorldEvent,
};
pub use host::{Host, HostTick, TickLoop, TickStats};
pub use persist::{InventoryStore, TomlInventoryStore};
pub use registry::SessionRegistry;
pub use runtime::{CallbackPool, DynWorld, HandlerPool, Runtime, WorldRunner};
pub use script::{Callback, EventHandler, ScriptEngine, ScriptHandle, ScriptLanguage};
pub use session::{
    CheckpointOpened, Delivery, EntitySession, MailboxMessage, SessionState, Stamina,
};
