//! # Controller
//!
//! Entry points for the transport layer: attach to an entity, run a script
//! on it, stop it.

use crate::error::ControlError;
use crate::registry::SessionRegistry;
use crate::script::{Callback, ScriptEngine, ScriptLanguage};
use crate::session::EntitySession;
use marionette_core::{Dispatch, EntityId};
use std::fmt;
use std::sync::Arc;

/// Binds scripts from the transport layer to sessions.
pub struct Controller {
    registry: Arc<SessionRegistry>,
    engine: Arc<dyn ScriptEngine>,
}

impl Controller {
    /// Creates a controller over `registry` loading scripts with `engine`.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, engine: Arc<dyn ScriptEngine>) -> Self {
        Self { registry, engine }
    }

    /// Attaches to a spawned entity.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownEntity` if the entity has no session.
    pub fn attach(&self, entity: EntityId) -> Result<Attachment, ControlError> {
        let session = self.registry.require(entity)?;
        Ok(Attachment {
            session,
            engine: Arc::clone(&self.engine),
        })
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// A transport client's handle on one session.
pub struct Attachment {
    session: Arc<EntitySession>,
    engine: Arc<dyn ScriptEngine>,
}

impl Attachment {
    /// The attached session.
    #[must_use]
    pub fn session(&self) -> &Arc<EntitySession> {
        &self.session
    }

    /// Replaces whatever is running with a new script and starts it.
    ///
    /// # Errors
    ///
    /// Returns `ScriptError::UnsupportedLanguage` or `ScriptError::Load` if
    /// the script cannot be loaded, `SessionError::TornDown` if the entity
    /// is gone.
    pub fn run_script(&self, source: &str, language: &str) -> Result<Dispatch, ControlError> {
        let language: ScriptLanguage = language.parse()?;
        self.session.interrupt();
        let script = self
            .engine
            .load(source, language, Arc::clone(&self.session))?;
        self.session.bind(script)?;
        tracing::info!(entity = %self.session.id(), language = %language, "script_started");
        Ok(self.session.dispatch(Callback::Start).unwrap_or(Dispatch::Closed))
    }

    /// Runs the stop callback, then unbinds the script.
    pub fn stop(&self) {
        if let Some(dispatch) = self.session.dispatch(Callback::Stop) {
            tracing::debug!(entity = %self.session.id(), dispatch = ?dispatch, "stop_dispatched");
        }
        self.session.interrupt();
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
