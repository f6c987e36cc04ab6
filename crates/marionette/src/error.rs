//! # Error Types
//!
//! Errors for session lifecycle, configuration, scripts, persistence and the
//! transport-facing controller. Command outcomes use
//! [`marionette_core::CommandError`] instead.

use marionette_core::EntityId;
use thiserror::Error;

/// Session lifecycle errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A script is already bound; interrupt it first.
    #[error("{0} already has a bound script")]
    AlreadyBound(EntityId),

    /// The session has been torn down.
    #[error("{0} has been torn down")]
    TornDown(EntityId),

    /// No session exists for the entity.
    #[error("no session for {0}")]
    UnknownEntity(EntityId),

    /// A session already exists for the entity.
    #[error("{0} already has a session")]
    AlreadySpawned(EntityId),
}

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {reason}")]
    Read {
        /// File path.
        path: String,
        /// OS error text.
        reason: String,
    },

    /// The TOML did not parse.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A value is out of range.
    #[error("invalid config value {field}: {reason}")]
    Invalid {
        /// Dotted field name.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Script engine errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// The language name is not supported.
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// The engine rejected the source.
    #[error("script failed to load: {0}")]
    Load(String),
}

/// Inventory persistence errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    /// Filesystem failure.
    #[error("inventory io failed for {path}: {reason}")]
    Io {
        /// File path.
        path: String,
        /// OS error text.
        reason: String,
    },

    /// The stored inventory did not decode.
    #[error("inventory file {path} is corrupt: {reason}")]
    Decode {
        /// File path.
        path: String,
        /// Decoder message.
        reason: String,
    },

    /// The inventory did not encode.
    #[error("inventory encode failed: {0}")]
    Encode(String),
}

/// Errors surfaced to the transport layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// Session lifecycle failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Script failure.
    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// Errors starting the host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// Bad configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Worker threads could not be started.
    #[error("failed to start worker pool: {0}")]
    WorkerStartup(String),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
