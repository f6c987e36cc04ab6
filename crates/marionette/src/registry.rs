//! # Session Registry
//!
//! Process-wide map from entity to its [`EntitySession`].
//!
//! ## Lifecycle
//!
//! ```text
//!   actor spawns in world ──> spawn(id)    session created, inventory loaded
//!   actor leaves world    ──> despawn(id)  session torn down, inventory saved
//!   process exits         ──> shutdown_all()
//! ```
//!
//! Lookups hand out `Arc`s, so a script thread holding a session keeps it
//! alive after despawn; every call on it then fails with `TornDown`.

use crate::error::{SessionError, SessionResult};
use crate::persist::InventoryStore;
use crate::runtime::Runtime;
use crate::session::EntitySession;
use marionette_core::EntityId;
use marionette_world::WorldAccess;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Live sessions by entity.
pub struct SessionRegistry {
    runtime: Arc<Runtime>,
    sessions: RwLock<HashMap<EntityId, Arc<EntitySession>>>,
    inventories: Option<Arc<dyn InventoryStore>>,
}

impl SessionRegistry {
    /// Registry without inventory persistence.
    #[must_use]
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self {
            runtime,
            sessions: RwLock::new(HashMap::new()),
            inventories: None,
        }
    }

    /// Registry that loads and saves inventories through `store`.
    #[must_use]
    pub fn with_inventory_store(runtime: Arc<Runtime>, store: Arc<dyn InventoryStore>) -> Self {
        Self {
            inventories: Some(store),
            ..Self::new(runtime)
        }
    }

    /// The shared runtime.
    #[must_use]
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Creates the session for a freshly spawned actor and restores its
    /// stored inventory into `world`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadySpawned` if a session exists.
    pub fn spawn<W>(&self, id: EntityId, world: &mut W) -> SessionResult<Arc<EntitySession>>
    where
        W: WorldAccess + ?Sized,
    {
        let session = {
            let mut sessions = self.sessions.write();
            if sessions.contains_key(&id) {
                return Err(SessionError::AlreadySpawned(id));
            }
            let session = Arc::new(EntitySession::new(id, Arc::clone(&self.runtime)));
            sessions.insert(id, Arc::clone(&session));
            session
        };

        if let Some(store) = &self.inventories {
            match store.load(id) {
                Ok(Some(stored)) => match world.inventory_mut(id) {
                    Some(inventory) => *inventory = stored,
                    None => tracing::warn!(entity = %id, "inventory_load_no_actor"),
                },
                Ok(None) => {}
                Err(err) => tracing::warn!(entity = %id, error = %err, "inventory_load_failed"),
            }
        }
        tracing::info!(entity = %id, "session_spawned");
        Ok(session)
    }

    /// Tears down and removes a session, saving the actor's inventory.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownEntity` if there is no session.
    pub fn despawn<W>(&self, id: EntityId, world: &W) -> SessionResult<()>
    where
        W: WorldAccess + ?Sized,
    {
        let session = self
            .sessions
            .write()
            .remove(&id)
            .ok_or(SessionError::UnknownEntity(id))?;
        session.tear_down();
        self.save_inventory(id, world);
        tracing::info!(entity = %id, "session_despawned");
        Ok(())
    }

    fn save_inventory<W>(&self, id: EntityId, world: &W)
    where
        W: WorldAccess + ?Sized,
    {
        let (Some(store), Some(inventory)) = (&self.inventories, world.inventory(id)) else {
            return;
        };
        if let Err(err) = store.save(id, inventory) {
            tracing::warn!(entity = %id, error = %err, "inventory_save_failed");
        }
    }

    /// Session for `id`.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<Arc<EntitySession>> {
        self.sessions.read().get(&id).cloned()
    }

    /// Session for `id`, or `UnknownEntity`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownEntity` if there is no session.
    pub fn require(&self, id: EntityId) -> SessionResult<Arc<EntitySession>> {
        self.get(id).ok_or(SessionError::UnknownEntity(id))
    }

    /// Every live session, ordered by entity id.
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<EntitySession>> {
        let mut sessions: Vec<_> = self.sessions.read().values().cloned().collect();
        sessions.sort_by_key(|session| session.id());
        sessions
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns true if no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Tears down every session, saving inventories.
    pub fn shutdown_all<W>(&self, world: &W)
    where
        W: WorldAccess + ?Sized,
    {
        let drained: Vec<_> = self.sessions.write().drain().collect();
        let count = drained.len();
        for (id, session) in drained {
            session.tear_down();
            self.save_inventory(id, world);
        }
        tracing::info!(sessions = count, "registry_shutdown");
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .field("persistent", &self.inventories.is_some())
            .finish_non_exhaustive()
    }
}
