//! # Command Error Types
//!
//! Everything a scheduled command can report back to the script that issued it.
//!
//! Admission errors are returned before anything is queued. Execution and
//! interruption errors arrive through the command's [`CommandFuture`].
//!
//! [`CommandFuture`]: crate::CommandFuture

use thiserror::Error;

/// Why a pending command or wait was released without a result.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptCause {
    /// The session was interrupted by its controller.
    #[error("interrupted")]
    Interrupted,
    /// A newer wait for the same event kind replaced this one.
    #[error("superseded by a newer wait")]
    Superseded,
    /// The entity despawned or the process is shutting down.
    #[error("session torn down")]
    TornDown,
}

/// Errors surfaced to callers of the command surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Stamina check failed; the command was never scheduled.
    #[error("admission rejected: cost {cost} exceeds available stamina {available}")]
    AdmissionRejected {
        /// Cost of the attempted command.
        cost: u32,
        /// Stamina available when the command was attempted.
        available: u32,
    },

    /// The action raised (or panicked) while running on the loop.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The caller was released without a result.
    #[error("{0}")]
    Interrupted(InterruptCause),

    /// The task runner no longer accepts work.
    #[error("task runner is closed")]
    Closed,
}

impl CommandError {
    /// Shorthand for [`CommandError::ExecutionFailed`].
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::ExecutionFailed(reason.into())
    }

    /// Returns true for any [`CommandError::Interrupted`] cause.
    #[inline]
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }

    /// Returns the interrupt cause, if this is an interruption.
    #[inline]
    #[must_use]
    pub const fn interrupt_cause(&self) -> Option<InterruptCause> {
        match self {
            Self::Interrupted(cause) => Some(*cause),
            _ => None,
        }
    }
}

impl From<InterruptCause> for CommandError {
    fn from(cause: InterruptCause) -> Self {
        Self::Interrupted(cause)
    }
}

/// Result type for command operations.
pub type CommandResult<T> = Result<T, CommandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = CommandError::AdmissionRejected { cost: 5, available: 2 };
        assert_eq!(
            err.to_string(),
            "admission rejected: cost 5 exceeds available stamina 2"
        );
        assert_eq!(
            CommandError::from(InterruptCause::Superseded).to_string(),
            "superseded by a newer wait"
        );
    }

    #[test]
    fn test_interrupt_cause() {
        let err = CommandError::Interrupted(InterruptCause::TornDown);
        assert!(err.is_interrupted());
        assert_eq!(err.interrupt_cause(), Some(InterruptCause::TornDown));
        assert_eq!(CommandError::failed("boom").interrupt_cause(), None);
    }
}
