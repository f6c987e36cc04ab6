//! # Event Bridge
//!
//! Carries world events to the sessions that care about them.
//!
//! ## Architecture
//!
//! ```text
//!   chat listener ──┐
//!   world changes ──┼──> [bounded channel] ──pump()──> session.notify(kind, payload)
//!   broadcasts    ──┘      (try_send, drop       ├──> pending wait_for completed
//!                           when full)           └──> registered handler dispatched
//! ```
//!
//! Events are best-effort. A full channel drops the event and counts it; a
//! session with no waiter and no handler ignores it.

use crate::registry::SessionRegistry;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use marionette_core::EntityId;
use marionette_world::{BlockChange, BlockKind, BlockPos};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Kind of event a script can wait for or handle.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A powerable block switched on or off.
    Redstone,
    /// A player said something.
    Chat,
    /// A block was broken.
    BlockBreak,
    /// A generic broadcast message.
    Message,
    /// Any other named event.
    Custom(String),
}

impl EventKind {
    /// Name used by scripts.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Redstone => "redstone",
            Self::Chat => "chat",
            Self::BlockBreak => "block_break",
            Self::Message => "message",
            Self::Custom(name) => name,
        }
    }
}

impl FromStr for EventKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "redstone" => Self::Redstone,
            "chat" => Self::Chat,
            "block_break" | "blockbreak" => Self::BlockBreak,
            "message" => Self::Message,
            _ => Self::Custom(s.trim().to_string()),
        })
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Data delivered with an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventPayload {
    /// Power state changed.
    Redstone {
        /// Where.
        pos: BlockPos,
        /// New power state.
        powered: bool,
    },
    /// Chat line.
    Chat {
        /// Speaker.
        player: String,
        /// Text.
        message: String,
    },
    /// A block was broken.
    BlockBreak {
        /// Where.
        pos: BlockPos,
        /// What it was.
        kind: BlockKind,
    },
    /// Broadcast message.
    Message {
        /// Sender name.
        sender: String,
        /// Body text.
        body: String,
    },
    /// Named custom event.
    Custom {
        /// Event name.
        name: String,
        /// Free-form data.
        data: String,
    },
}

impl EventPayload {
    /// Kind this payload belongs to.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Redstone { .. } => EventKind::Redstone,
            Self::Chat { .. } => EventKind::Chat,
            Self::BlockBreak { .. } => EventKind::BlockBreak,
            Self::Message { .. } => EventKind::Message,
            Self::Custom { name, .. } => EventKind::Custom(name.clone()),
        }
    }

    /// Location of positional events.
    #[must_use]
    pub const fn position(&self) -> Option<BlockPos> {
        match self {
            Self::Redstone { pos, .. } | Self::BlockBreak { pos, .. } => Some(*pos),
            _ => None,
        }
    }

    /// Events implied by a world change.
    #[must_use]
    pub fn from_change(change: &BlockChange) -> Vec<Self> {
        let mut events = Vec::new();
        if change.is_break() {
            events.push(Self::BlockBreak {
                pos: change.pos,
                kind: change.before.kind,
            });
        }
        if change.power_changed() {
            events.push(Self::Redstone {
                pos: change.pos,
                powered: change.after.powered,
            });
        }
        events
    }
}

/// Who an event is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventTarget {
    /// Every live session.
    Broadcast,
    /// One entity's session.
    Entity(EntityId),
}

/// An event in flight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorldEvent {
    /// Recipient(s).
    pub target: EventTarget,
    /// Payload.
    pub payload: EventPayload,
}

impl WorldEvent {
    /// Event for every session.
    #[must_use]
    pub const fn broadcast(payload: EventPayload) -> Self {
        Self {
            target: EventTarget::Broadcast,
            payload,
        }
    }

    /// Event for one entity.
    #[must_use]
    pub const fn to_entity(entity: EntityId, payload: EventPayload) -> Self {
        Self {
            target: EventTarget::Entity(entity),
            payload,
        }
    }
}

#[derive(Debug, Default)]
struct BridgeCounters {
    published: AtomicU64,
    dropped: AtomicU64,
}

/// Bridge counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Events accepted.
    pub published: u64,
    /// Events dropped because the channel was full.
    pub dropped: u64,
}

/// Result of one [`EventBridge::pump`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Events taken off the channel.
    pub events: usize,
    /// Pending waits completed.
    pub woke: usize,
    /// Handlers dispatched.
    pub handled: usize,
}

/// Producer handle, cloneable across threads.
#[derive(Clone, Debug)]
pub struct EventPublisher {
    sender: Sender<WorldEvent>,
    counters: Arc<BridgeCounters>,
}

impl EventPublisher {
    /// Queues an event without blocking.
    ///
    /// Returns false if the event was dropped.
    pub fn publish(&self, event: WorldEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => {
                self.counters.published.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(event)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(kind = %event.payload.kind(), "event_dropped_channel_full");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Bounded event channel between world-event sources and sessions.
#[derive(Debug)]
pub struct EventBridge {
    publisher: EventPublisher,
    receiver: Receiver<WorldEvent>,
}

impl EventBridge {
    /// Creates a bridge buffering up to `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self {
            publisher: EventPublisher {
                sender,
                counters: Arc::new(BridgeCounters::default()),
            },
            receiver,
        }
    }

    /// A producer handle.
    #[must_use]
    pub fn publisher(&self) -> EventPublisher {
        self.publisher.clone()
    }

    /// Queues an event without blocking.
    pub fn publish(&self, event: WorldEvent) -> bool {
        self.publisher.publish(event)
    }

    /// Queues the events implied by a batch of world changes.
    pub fn publish_changes(&self, changes: &[BlockChange]) -> usize {
        changes
            .iter()
            .flat_map(EventPayload::from_change)
            .filter(|payload| self.publish(WorldEvent::broadcast(payload.clone())))
            .count()
    }

    /// Events waiting to be pumped.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Counters.
    #[must_use]
    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            published: self.publisher.counters.published.load(Ordering::Relaxed),
            dropped: self.publisher.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Delivers every queued event to its sessions.
    pub fn pump(&self, registry: &SessionRegistry) -> PumpReport {
        let mut report = PumpReport::default();
        for event in self.receiver.try_iter() {
            report.events += 1;
            let kind = event.payload.kind();
            let sessions = match event.target {
                EventTarget::Broadcast => registry.sessions(),
                EventTarget::Entity(id) => registry.get(id).into_iter().collect(),
            };
            for session in sessions {
                let delivery = session.notify(&kind, event.payload.clone());
                report.woke += usize::from(delivery.woke_waiter);
                report.handled += usize::from(delivery.handler_dispatched);
            }
        }
        report
    }
}
