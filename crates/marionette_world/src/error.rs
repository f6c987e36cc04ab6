//! # World Error Types

use crate::location::BlockPos;
use marionette_core::CommandError;
use thiserror::Error;

/// Errors raised by world-facing operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    /// Slot index outside the inventory.
    #[error("invalid slot {slot}: inventory has {capacity} slots")]
    InvalidSlot {
        /// Requested slot.
        slot: usize,
        /// Inventory size.
        capacity: usize,
    },

    /// Not enough room for the items.
    #[error("inventory full: could not fit {amount} items")]
    InventoryFull {
        /// Items that did not fit.
        amount: u32,
    },

    /// The location is not loaded.
    #[error("location {0} is not loaded")]
    Unloaded(BlockPos),

    /// The entity is not present in the world.
    #[error("actor is not present in the world")]
    ActorMissing,
}

impl From<WorldError> for CommandError {
    fn from(err: WorldError) -> Self {
        Self::ExecutionFailed(err.to_string())
    }
}

/// Result type for world operations.
pub type WorldResult<T> = Result<T, WorldError>;
