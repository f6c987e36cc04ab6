//! # Script Engine Seam
//!
//! The scripting runtime (JavaScript, Python, Java) lives outside this crate.
//! It plugs in through [`ScriptEngine`], which turns source text into a
//! [`ScriptHandle`] bound to one session.
//!
//! A handle's callbacks run on pool worker threads and may block for as long
//! as they like on session commands; they never run on the loop.

use crate::error::ScriptError;
use crate::events::EventPayload;
use crate::session::EntitySession;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Lifecycle callback kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Callback {
    /// Script was just bound.
    Start,
    /// Once per host tick while bound.
    Update,
    /// Script is being stopped by its controller.
    Stop,
}

impl Callback {
    /// Every callback kind.
    pub const ALL: [Self; 3] = [Self::Start, Self::Update, Self::Stop];
}

impl fmt::Display for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "on_start",
            Self::Update => "on_update",
            Self::Stop => "on_stop",
        })
    }
}

/// Supported script languages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScriptLanguage {
    /// JavaScript.
    JavaScript,
    /// Python.
    Python,
    /// Java.
    Java,
}

impl FromStr for ScriptLanguage {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" => Ok(Self::JavaScript),
            "python" | "py" => Ok(Self::Python),
            "java" => Ok(Self::Java),
            other => Err(ScriptError::UnsupportedLanguage(other.to_string())),
        }
    }
}

impl fmt::Display for ScriptLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Java => "java",
        })
    }
}

/// Handler invoked for every matching event.
pub type EventHandler = Arc<dyn Fn(&EventPayload) + Send + Sync>;

/// A loaded script bound (or about to be bound) to one session.
pub trait ScriptHandle: Send + Sync {
    /// Runs a lifecycle callback. Called on a worker thread.
    fn invoke(&self, callback: Callback);

    /// Asks the script to stop. Called on a worker thread; should return
    /// promptly once in-flight callbacks have been told to quit.
    fn stop(&self);
}

/// Compiles scripts into handles.
pub trait ScriptEngine: Send + Sync {
    /// Loads `source` for `session`.
    ///
    /// # Errors
    ///
    /// Returns `ScriptError::Load` if the source is rejected.
    fn load(
        &self,
        source: &str,
        language: ScriptLanguage,
        session: Arc<EntitySession>,
    ) -> Result<Arc<dyn ScriptHandle>, ScriptError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parsing() {
        assert_eq!("JavaScript".parse::<ScriptLanguage>(), Ok(ScriptLanguage::JavaScript));
        assert_eq!("py".parse::<ScriptLanguage>(), Ok(ScriptLanguage::Python));
        assert_eq!(
            "lua".parse::<ScriptLanguage>(),
            Err(ScriptError::UnsupportedLanguage("lua".into()))
        );
    }

    #[test]
    fn test_callback_names() {
        assert_eq!(Callback::Update.to_string(), "on_update");
    }
}
