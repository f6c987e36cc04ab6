//! # World Access
//!
//! The seam between the command layer and the authoritative simulation.
//!
//! The simulation itself (physics, build rules, damage) is not part of this
//! workspace. Commands only ever see it through [`WorldAccess`], always from
//! the loop thread, and always one action at a time.

use crate::block::{BlockKind, BlockState, Capabilities};
use crate::inventory::Inventory;
use crate::location::{BlockPos, Placement};
use marionette_core::EntityId;

/// A block cell that changed during a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockChange {
    /// Where.
    pub pos: BlockPos,
    /// State before the change.
    pub before: BlockState,
    /// State after the change.
    pub after: BlockState,
}

impl BlockChange {
    /// A non-air block was replaced by air.
    #[must_use]
    pub const fn is_break(&self) -> bool {
        !self.before.kind.is_air() && self.after.kind.is_air()
    }

    /// The powered flag flipped on a powerable block.
    #[must_use]
    pub const fn power_changed(&self) -> bool {
        self.after.kind.has(Capabilities::POWERABLE) && self.before.powered != self.after.powered
    }
}

/// Operations the authoritative world exposes to commands.
pub trait WorldAccess {
    /// Whether `actor` may change the block at `pos` (build rules, claims).
    fn can_mutate_at(&self, pos: BlockPos, actor: EntityId) -> bool;

    /// Current state of a block, or `None` if the location is not loaded.
    fn current_state_of(&self, pos: BlockPos) -> Option<BlockState>;

    /// Writes a block state. Returns false if the location is not loaded.
    fn apply_state(&mut self, pos: BlockPos, state: BlockState) -> bool;

    /// Moves an actor. Returns false if the actor or target is unavailable.
    fn relocate(&mut self, actor: EntityId, to: Placement) -> bool;

    /// Where an actor currently is.
    fn placement_of(&self, actor: EntityId) -> Option<Placement>;

    /// The actor's inventory.
    fn inventory(&self, actor: EntityId) -> Option<&Inventory>;

    /// The actor's inventory, mutably.
    fn inventory_mut(&mut self, actor: EntityId) -> Option<&mut Inventory>;

    /// Whether an actor could stand at `pos`.
    fn can_occupy(&self, pos: BlockPos) -> bool {
        self.current_state_of(pos)
            .is_some_and(|state| state.kind.has(Capabilities::PASSABLE))
    }

    /// Changes made since the last call, oldest first.
    fn drain_changes(&mut self) -> Vec<BlockChange> {
        Vec::new()
    }

    /// Convenience: kind at `pos`, `None` if unloaded.
    fn kind_at(&self, pos: BlockPos) -> Option<BlockKind> {
        self.current_state_of(pos).map(|state| state.kind)
    }
}
