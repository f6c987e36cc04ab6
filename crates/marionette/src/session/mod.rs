//! # Entity Session
//!
//! Everything one scripted entity owns: its bound script, event handlers,
//! pending waits, stamina and snapshot store.
//!
//! ## State machine
//!
//! ```text
//!            bind(script)                 callback dispatched
//!   Idle ─────────────────> Bound ─────────────────────────────> Running
//!    ^                        │  <──────────────────────────────     │
//!    │                        │        callback returned             │
//!    └──── interrupt() ───────┴──────────────────────────────────────┘
//!
//!   tear_down(): any state ──> torn down (terminal)
//! ```
//!
//! - `bind` is refused while a script is bound; interrupt first.
//! - `interrupt` never blocks. It clears handlers, releases every waiter
//!   with `Interrupted`, cancels queued commands and stops the script on a
//!   thread of its own.
//! - Lifecycle callbacks run on the shared callback pool. A callback kind
//!   that is still running for this entity is dropped, not queued.
//! - Event handlers run on the handler pool, so a callback that never
//!   returns cannot hold them up.
//!
//! Commands live in [`commands`]; they are ordinary methods on
//! [`EntitySession`] that block the calling script thread.

pub mod commands;
pub mod stamina;

use crate::error::{SessionError, SessionResult};
use crate::events::{EventKind, EventPayload};
use crate::runtime::Runtime;
use crate::script::{Callback, EventHandler, ScriptHandle};
use marionette_core::{
    CommandError, CommandFuture, CommandResult, Dispatch, EntityId, InterruptCause,
};
use marionette_world::{Placement, SnapshotStore, Volume};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

pub use commands::CheckpointOpened;
pub use stamina::Stamina;

/// Observable session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No script bound.
    Idle,
    /// Script bound, no callback in flight.
    Bound,
    /// Script bound and at least one callback in flight.
    Running,
}

/// What [`EntitySession::notify`] did with an event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    /// A pending wait was completed.
    pub woke_waiter: bool,
    /// A registered handler was dispatched.
    pub handler_dispatched: bool,
    /// The event was queued in the mailbox.
    pub queued: bool,
}

/// A broadcast message kept for polling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailboxMessage {
    /// Sender name.
    pub sender: String,
    /// Body text.
    pub body: String,
}

struct SessionInner {
    script: Option<Arc<dyn ScriptHandle>>,
    handlers: HashMap<EventKind, EventHandler>,
    waits: HashMap<EventKind, CommandFuture<EventPayload>>,
    event_area: Option<Volume>,
    mailbox: VecDeque<MailboxMessage>,
    torn_down: bool,
}

impl SessionInner {
    /// Clears handlers and takes every pending wait.
    fn release(&mut self) -> Vec<CommandFuture<EventPayload>> {
        self.handlers.clear();
        self.waits.drain().map(|(_, future)| future).collect()
    }
}

/// Per-entity session.
pub struct EntitySession {
    id: EntityId,
    runtime: Arc<Runtime>,
    inner: Mutex<SessionInner>,
    stamina: Mutex<Stamina>,
    /// Touched from loop actions only; shared so queued actions can reach it.
    snapshot: Arc<Mutex<SnapshotStore>>,
}

impl EntitySession {
    /// Creates an idle session.
    #[must_use]
    pub fn new(id: EntityId, runtime: Arc<Runtime>) -> Self {
        let stamina = Stamina::new(&runtime.config().stamina);
        Self {
            id,
            runtime,
            inner: Mutex::new(SessionInner {
                script: None,
                handlers: HashMap::new(),
                waits: HashMap::new(),
                event_area: None,
                mailbox: VecDeque::new(),
                torn_down: false,
            }),
            stamina: Mutex::new(stamina),
            snapshot: Arc::new(Mutex::new(SnapshotStore::new(id))),
        }
    }

    /// Entity this session drives.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.inner.lock().script.is_none() {
            return SessionState::Idle;
        }
        let pool = self.runtime.pool();
        if Callback::ALL
            .iter()
            .any(|callback| pool.is_busy(&(self.id, *callback)))
        {
            SessionState::Running
        } else {
            SessionState::Bound
        }
    }

    /// Returns true once the session has been torn down.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.inner.lock().torn_down
    }

    /// Binds a script.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyBound` if a script is bound, or
    /// `SessionError::TornDown` after teardown.
    pub fn bind(&self, script: Arc<dyn ScriptHandle>) -> SessionResult<()> {
        let stale = {
            let mut inner = self.inner.lock();
            if inner.torn_down {
                return Err(SessionError::TornDown(self.id));
            }
            if inner.script.is_some() {
                return Err(SessionError::AlreadyBound(self.id));
            }
            inner.script = Some(script);
            inner.release()
        };
        for future in stale {
            future.fail(CommandError::Interrupted(InterruptCause::Interrupted));
        }
        tracing::info!(entity = %self.id, "script_bound");
        Ok(())
    }

    /// Unbinds the current script, if any. Never blocks; safe to repeat.
    ///
    /// Returns true if a script was bound.
    pub fn interrupt(&self) -> bool {
        let (script, waits) = {
            let mut inner = self.inner.lock();
            let waits = inner.release();
            (inner.script.take(), waits)
        };
        self.release_all(script, waits, InterruptCause::Interrupted)
    }

    /// Terminal shutdown: everything pending fails with `TornDown`, the open
    /// checkpoint is discarded and later commands fail immediately.
    pub fn tear_down(&self) {
        let (script, waits) = {
            let mut inner = self.inner.lock();
            if inner.torn_down {
                return;
            }
            inner.torn_down = true;
            inner.mailbox.clear();
            let waits = inner.release();
            (inner.script.take(), waits)
        };
        self.release_all(script, waits, InterruptCause::TornDown);
        self.snapshot.lock().discard();
        tracing::info!(entity = %self.id, "session_torn_down");
    }

    fn release_all(
        &self,
        script: Option<Arc<dyn ScriptHandle>>,
        waits: Vec<CommandFuture<EventPayload>>,
        cause: InterruptCause,
    ) -> bool {
        let released = waits.len();
        for future in waits {
            future.fail(CommandError::Interrupted(cause));
        }
        let cancelled = self.runtime.runner().cancel_owner(self.id, cause);

        let was_bound = script.is_some();
        if let Some(script) = script {
            self.runtime.request_stop(self.id, move || script.stop());
        }
        tracing::info!(
            entity = %self.id,
            cause = %cause,
            was_bound,
            released_waits = released,
            cancelled_commands = cancelled,
            "session_interrupted"
        );
        was_bound
    }

    /// Dispatches a lifecycle callback on the pool.
    ///
    /// Returns `None` when no script is bound. A callback kind already in
    /// flight for this entity is dropped ([`Dispatch::DroppedBusy`]).
    pub fn dispatch(&self, callback: Callback) -> Option<Dispatch> {
        let script = self.inner.lock().script.clone()?;
        let dispatch = self
            .runtime
            .pool()
            .execute_keyed((self.id, callback), move || script.invoke(callback));
        if dispatch == Dispatch::DroppedBusy {
            tracing::debug!(entity = %self.id, callback = %callback, "callback_dropped_busy");
        }
        Some(dispatch)
    }

    /// Registers a handler; replaces any handler for the same kind.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::TornDown` after teardown.
    pub fn set_event_handler(&self, kind: EventKind, handler: EventHandler) -> SessionResult<()> {
        let mut inner = self.inner.lock();
        if inner.torn_down {
            return Err(SessionError::TornDown(self.id));
        }
        inner.handlers.insert(kind, handler);
        Ok(())
    }

    /// Removes a handler. Returns true if one was registered.
    pub fn remove_event_handler(&self, kind: &EventKind) -> bool {
        self.inner.lock().handlers.remove(kind).is_some()
    }

    /// Returns true if a handler is registered for `kind`.
    #[must_use]
    pub fn has_event_handler(&self, kind: &EventKind) -> bool {
        self.inner.lock().handlers.contains_key(kind)
    }

    /// Blocks until an event of `kind` arrives.
    ///
    /// A newer wait for the same kind releases this one with
    /// `Interrupted(Superseded)`.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::Interrupted` if the session is interrupted,
    /// torn down, or the wait is superseded.
    pub fn wait_for(&self, kind: EventKind) -> CommandResult<EventPayload> {
        self.register_wait(kind)?.wait()
    }

    /// Registers a wait and returns its future without blocking.
    ///
    /// # Errors
    ///
    /// Returns `CommandError::Interrupted(TornDown)` after teardown.
    pub fn register_wait(&self, kind: EventKind) -> CommandResult<CommandFuture<EventPayload>> {
        let future = CommandFuture::new();
        let previous = {
            let mut inner = self.inner.lock();
            if inner.torn_down {
                return Err(CommandError::Interrupted(InterruptCause::TornDown));
            }
            inner.waits.insert(kind.clone(), future.clone())
        };
        if let Some(previous) = previous {
            previous.fail(CommandError::Interrupted(InterruptCause::Superseded));
            tracing::debug!(entity = %self.id, kind = %kind, "wait_superseded");
        }
        Ok(future)
    }

    /// Returns true if a wait for `kind` is pending.
    #[must_use]
    pub fn is_waiting_for(&self, kind: &EventKind) -> bool {
        self.inner.lock().waits.contains_key(kind)
    }

    /// Delivers an event.
    ///
    /// Completes the pending wait for `kind` (clearing the slot) and
    /// dispatches the registered handler, if the script is bound. Positional
    /// events outside the event area are ignored. Anything else is a no-op.
    pub fn notify(&self, kind: &EventKind, payload: EventPayload) -> Delivery {
        let mut delivery = Delivery::default();
        let (waiter, handler) = {
            let mut inner = self.inner.lock();
            if inner.torn_down {
                return delivery;
            }
            if let (Some(area), Some(pos)) = (inner.event_area, payload.position()) {
                if !area.contains(pos) {
                    return delivery;
                }
            }
            if let EventPayload::Message { sender, body } = &payload {
                delivery.queued = self.enqueue_message(
                    &mut inner,
                    MailboxMessage {
                        sender: sender.clone(),
                        body: body.clone(),
                    },
                );
            }
            let handler = if inner.script.is_some() {
                inner.handlers.get(kind).cloned()
            } else {
                None
            };
            (inner.waits.remove(kind), handler)
        };

        if let Some(future) = waiter {
            delivery.woke_waiter = future.complete(payload.clone());
        }
        if let Some(handler) = handler {
            let dispatch = self.runtime.handlers().execute(move || handler(&payload));
            delivery.handler_dispatched = dispatch.started();
        }
        delivery
    }

    fn enqueue_message(&self, inner: &mut SessionInner, message: MailboxMessage) -> bool {
        let capacity = self.runtime.config().events.mailbox_capacity;
        if capacity == 0 {
            return false;
        }
        if inner.mailbox.len() >= capacity {
            inner.mailbox.pop_front();
            tracing::debug!(entity = %self.id, "mailbox_overflow");
        }
        inner.mailbox.push_back(message);
        true
    }

    /// Queues a broadcast message for polling.
    pub fn push_event_message(&self, sender: impl Into<String>, body: impl Into<String>) -> bool {
        let message = MailboxMessage {
            sender: sender.into(),
            body: body.into(),
        };
        let mut inner = self.inner.lock();
        !inner.torn_down && self.enqueue_message(&mut inner, message)
    }

    /// Takes the oldest queued message.
    pub fn next_event_message(&self) -> Option<MailboxMessage> {
        self.inner.lock().mailbox.pop_front()
    }

    /// Restricts positional events to `area`.
    pub fn set_event_area(&self, area: Volume) {
        self.inner.lock().event_area = Some(area);
    }

    /// Accepts positional events from anywhere again.
    pub fn remove_event_area(&self) {
        self.inner.lock().event_area = None;
    }

    /// Whether positional events at `placement` would reach this session.
    #[must_use]
    pub fn is_event_area(&self, placement: Placement) -> bool {
        self.inner
            .lock()
            .event_area
            .map_or(true, |area| area.contains(placement.pos))
    }

    /// Stamina available now.
    #[must_use]
    pub fn stamina(&self) -> u32 {
        self.stamina.lock().available()
    }

    /// One tick of stamina regeneration.
    pub fn regenerate(&self) {
        self.stamina.lock().regenerate();
    }

    /// Spends stamina for a command about to be scheduled.
    fn admit(&self, cost: u32) -> CommandResult<()> {
        if cost == 0 {
            return Ok(());
        }
        let result = self.stamina.lock().try_consume(cost);
        if let Err(err) = &result {
            tracing::debug!(entity = %self.id, error = %err, "command_rejected");
        }
        result
    }

    fn ensure_live(&self) -> CommandResult<()> {
        if self.inner.lock().torn_down {
            Err(CommandError::Interrupted(InterruptCause::TornDown))
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for EntitySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("EntitySession")
            .field("id", &self.id)
            .field("bound", &inner.script.is_some())
            .field("handlers", &inner.handlers.len())
            .field("waits", &inner.waits.len())
            .field("torn_down", &inner.torn_down)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarionetteConfig;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingScript {
        invoked: AtomicUsize,
        stopped: AtomicUsize,
    }

    impl ScriptHandle for CountingScript {
        fn invoke(&self, _callback: Callback) {
            self.invoked.fetch_add(1, Ordering::SeqCst);
        }

        fn stop(&self) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Spins inside every callback until told to stop.
    #[derive(Default)]
    struct SpinningScript {
        entered: AtomicUsize,
        stopped: AtomicBool,
    }

    impl ScriptHandle for SpinningScript {
        fn invoke(&self, _callback: Callback) {
            self.entered.fetch_add(1, Ordering::SeqCst);
            while !self.stopped.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(1));
            }
        }

        fn stop(&self) {
            self.stopped.store(true, Ordering::Release);
        }
    }

    fn session() -> EntitySession {
        let runtime = Runtime::new(MarionetteConfig::immediate()).unwrap();
        EntitySession::new(EntityId::new(1), runtime)
    }

    fn chat(message: &str) -> EventPayload {
        EventPayload::Chat {
            player: "steve".into(),
            message: message.into(),
        }
    }

    fn eventually(check: impl Fn() -> bool) -> bool {
        for _ in 0..500 {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_bind_twice_rejected() {
        let session = session();
        session.bind(Arc::new(CountingScript::default())).unwrap();
        assert_eq!(session.state(), SessionState::Bound);
        assert_eq!(
            session.bind(Arc::new(CountingScript::default())),
            Err(SessionError::AlreadyBound(EntityId::new(1)))
        );
    }

    #[test]
    fn test_interrupt_is_idempotent_and_stops_script() {
        let session = session();
        let script = Arc::new(CountingScript::default());
        session.bind(script.clone()).unwrap();

        assert!(session.interrupt());
        assert!(!session.interrupt());
        assert_eq!(session.state(), SessionState::Idle);
        assert!(eventually(|| script.stopped.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_interrupt_releases_waiter() {
        let session = Arc::new(session());
        let waiter = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.wait_for(EventKind::Redstone))
        };
        assert!(eventually(|| session.is_waiting_for(&EventKind::Redstone)));

        session.interrupt();
        assert_eq!(
            waiter.join().unwrap(),
            Err(CommandError::Interrupted(InterruptCause::Interrupted))
        );
    }

    #[test]
    fn test_second_wait_supersedes_first() {
        let session = session();
        let first = session.register_wait(EventKind::Chat).unwrap();
        let second = session.register_wait(EventKind::Chat).unwrap();

        assert_eq!(
            first.wait(),
            Err(CommandError::Interrupted(InterruptCause::Superseded))
        );
        let delivery = session.notify(&EventKind::Chat, chat("hello"));
        assert!(delivery.woke_waiter);
        assert_eq!(second.wait(), Ok(chat("hello")));
        assert!(!session.is_waiting_for(&EventKind::Chat));
    }

    #[test]
    fn test_notify_without_interest_is_noop() {
        let session = session();
        assert_eq!(session.notify(&EventKind::Chat, chat("hi")), Delivery::default());
    }

    #[test]
    fn test_handler_requires_bound_script() {
        let session = session();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        session
            .set_event_handler(
                EventKind::Chat,
                Arc::new(move |_: &EventPayload| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        assert!(!session.notify(&EventKind::Chat, chat("a")).handler_dispatched);

        session.bind(Arc::new(CountingScript::default())).unwrap();
        // Binding clears handlers registered before it.
        assert!(!session.has_event_handler(&EventKind::Chat));

        let counter = Arc::clone(&hits);
        session
            .set_event_handler(
                EventKind::Chat,
                Arc::new(move |_: &EventPayload| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        assert!(session.notify(&EventKind::Chat, chat("b")).handler_dispatched);
        assert!(eventually(|| hits.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_event_area_filters_positional_events() {
        use marionette_world::BlockPos;

        let session = session();
        session.set_event_area(Volume::new(BlockPos::new(0, 0, 0), BlockPos::new(10, 10, 10)));
        let outside = EventPayload::Redstone {
            pos: BlockPos::new(20, 0, 0),
            powered: true,
        };
        let inside = EventPayload::Redstone {
            pos: BlockPos::new(5, 5, 5),
            powered: true,
        };

        let wait = session.register_wait(EventKind::Redstone).unwrap();
        assert!(!session.notify(&EventKind::Redstone, outside).woke_waiter);
        assert!(session.notify(&EventKind::Redstone, inside.clone()).woke_waiter);
        assert_eq!(wait.wait(), Ok(inside));

        session.remove_event_area();
        assert!(session.is_event_area(Placement::new(BlockPos::new(99, 0, 0), 0)));
    }

    #[test]
    fn test_mailbox_fifo() {
        let session = session();
        session.push_event_message("a", "one");
        let delivery = session.notify(
            &EventKind::Message,
            EventPayload::Message {
                sender: "b".into(),
                body: "two".into(),
            },
        );
        assert!(delivery.queued);
        assert_eq!(session.next_event_message().map(|m| m.body), Some("one".into()));
        assert_eq!(session.next_event_message().map(|m| m.sender), Some("b".into()));
        assert_eq!(session.next_event_message(), None);
    }

    #[test]
    fn test_tear_down_is_terminal() {
        let session = session();
        let wait = session.register_wait(EventKind::Chat).unwrap();
        session.tear_down();

        assert_eq!(wait.wait(), Err(CommandError::Interrupted(InterruptCause::TornDown)));
        assert_eq!(
            session.bind(Arc::new(CountingScript::default())),
            Err(SessionError::TornDown(EntityId::new(1)))
        );
        assert!(session.register_wait(EventKind::Chat).is_err());
        assert!(session.is_torn_down());
    }

    #[test]
    fn test_stop_and_handlers_reach_scripts_with_workers_saturated() {
        let runtime = Runtime::new(MarionetteConfig::immediate()).unwrap();
        let workers = runtime.config().lifecycle.workers;
        let sessions: Vec<_> = (1..=workers)
            .map(|n| {
                let id = EntityId::new(u64::try_from(n).unwrap());
                EntitySession::new(id, Arc::clone(&runtime))
            })
            .collect();
        let scripts: Vec<_> = sessions
            .iter()
            .map(|session| {
                let script = Arc::new(SpinningScript::default());
                session.bind(script.clone()).unwrap();
                assert_eq!(session.dispatch(Callback::Start), Some(Dispatch::Started));
                script
            })
            .collect();
        assert!(eventually(|| scripts
            .iter()
            .all(|script| script.entered.load(Ordering::SeqCst) == 1)));

        // Every callback worker is now spinning.
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        sessions[1]
            .set_event_handler(
                EventKind::Chat,
                Arc::new(move |_: &EventPayload| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        assert!(sessions[1].notify(&EventKind::Chat, chat("busy")).handler_dispatched);
        assert!(eventually(|| hits.load(Ordering::SeqCst) == 1));

        assert!(sessions[0].interrupt());
        assert!(eventually(|| scripts[0].stopped.load(Ordering::Acquire)));
        assert!(!scripts[1].stopped.load(Ordering::Acquire));

        for session in &sessions {
            session.interrupt();
        }
        runtime.shutdown();
        assert!(scripts.iter().all(|script| script.stopped.load(Ordering::Acquire)));
    }

    #[test]
    fn test_dispatch_requires_script() {
        let session = session();
        assert_eq!(session.dispatch(Callback::Update), None);

        let script = Arc::new(CountingScript::default());
        session.bind(script.clone()).unwrap();
        assert_eq!(session.dispatch(Callback::Start), Some(Dispatch::Started));
        assert!(eventually(|| script.invoked.load(Ordering::SeqCst) == 1));
    }
}
