//! # Snapshot Store
//!
//! Undo for an entity's world edits, as one unit.
//!
//! ## Lifecycle
//!
//! ```text
//!   open(origin) ──> record(A) record(B) record(A) ... ──┬──> restore()  apply + relocate + drop
//!                     (first write per key wins)         └──> discard()  drop
//! ```
//!
//! Every mutating command records the location it is about to change before
//! changing it. Only the first capture of a key is kept, so a restore always
//! returns a cell to how it looked when the checkpoint was opened, however
//! many times it changed in between.
//!
//! A restore never fails as a whole. Entries whose location has become
//! unavailable are skipped, logged and listed in the [`RestoreReport`].
//!
//! Opening a checkpoint while one is open replaces it. The replaced
//! checkpoint is handed back to the caller instead of vanishing.

use crate::block::BlockState;
use crate::inventory::Inventory;
use crate::location::{BlockPos, Placement};
use crate::world::WorldAccess;
use marionette_core::EntityId;
use std::collections::BTreeMap;
use std::fmt;

/// What a snapshot entry refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LocationKey {
    /// A block cell.
    Block(BlockPos),
    /// An actor's inventory.
    Inventory(EntityId),
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block(pos) => write!(f, "block {pos}"),
            Self::Inventory(id) => write!(f, "inventory of {id}"),
        }
    }
}

/// Captured state of a location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PriorState {
    /// Block kind, facing and flags.
    Block(BlockState),
    /// Full inventory contents.
    Inventory(Inventory),
}

/// An open snapshot transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    origin: Placement,
    opened_at: u64,
    entries: BTreeMap<LocationKey, PriorState>,
}

impl Checkpoint {
    /// Opens an empty checkpoint.
    #[must_use]
    pub fn new(origin: Placement, opened_at: u64) -> Self {
        Self {
            origin,
            opened_at,
            entries: BTreeMap::new(),
        }
    }

    /// Where the entity returns to on restore.
    #[inline]
    #[must_use]
    pub const fn origin(&self) -> Placement {
        self.origin
    }

    /// Tick at which the checkpoint was opened.
    #[inline]
    #[must_use]
    pub const fn opened_at(&self) -> u64 {
        self.opened_at
    }

    /// Number of captured locations.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been captured.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Captured state for a key.
    #[must_use]
    pub fn entry(&self, key: &LocationKey) -> Option<&PriorState> {
        self.entries.get(key)
    }

    /// Captures `key` unless it is already captured.
    ///
    /// `reader` is only called for new keys; returning `None` (location not
    /// readable) captures nothing. Returns true if an entry was added.
    pub fn record<F>(&mut self, key: LocationKey, reader: F) -> bool
    where
        F: FnOnce() -> Option<PriorState>,
    {
        if self.entries.contains_key(&key) {
            return false;
        }
        match reader() {
            Some(state) => {
                self.entries.insert(key, state);
                true
            }
            None => {
                tracing::debug!(location = %key, "snapshot_capture_unreadable");
                false
            }
        }
    }
}

/// Result of a restore.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// False when there was no open checkpoint (nothing was done).
    pub had_checkpoint: bool,
    /// Entries written back.
    pub restored: usize,
    /// Entries whose location could not be written back.
    pub skipped: Vec<LocationKey>,
    /// Whether the entity was moved back to the origin.
    pub relocated: bool,
}

impl RestoreReport {
    /// Returns true if any entry was skipped.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Per-entity holder of at most one open [`Checkpoint`].
#[derive(Debug)]
pub struct SnapshotStore {
    owner: EntityId,
    active: Option<Checkpoint>,
}

impl SnapshotStore {
    /// Creates a store with nothing open.
    #[must_use]
    pub const fn new(owner: EntityId) -> Self {
        Self {
            owner,
            active: None,
        }
    }

    /// Opens a checkpoint, returning the one it replaced, if any.
    pub fn open(&mut self, origin: Placement, tick: u64) -> Option<Checkpoint> {
        let replaced = self.active.replace(Checkpoint::new(origin, tick));
        if let Some(old) = &replaced {
            tracing::warn!(
                entity = %self.owner,
                dropped_entries = old.len(),
                "checkpoint_replaced"
            );
        }
        tracing::info!(entity = %self.owner, origin = %origin.pos, tick, "checkpoint_opened");
        replaced
    }

    /// Returns true while a checkpoint is open.
    #[inline]
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.active.is_some()
    }

    /// The open checkpoint.
    #[must_use]
    pub const fn active(&self) -> Option<&Checkpoint> {
        self.active.as_ref()
    }

    /// Captures `key` through `reader` if a checkpoint is open.
    pub fn record<F>(&mut self, key: LocationKey, reader: F) -> bool
    where
        F: FnOnce() -> Option<PriorState>,
    {
        self.active
            .as_mut()
            .is_some_and(|checkpoint| checkpoint.record(key, reader))
    }

    /// Captures the block at `pos` before it is changed.
    pub fn record_block<W>(&mut self, world: &W, pos: BlockPos) -> bool
    where
        W: WorldAccess + ?Sized,
    {
        self.record(LocationKey::Block(pos), || {
            world.current_state_of(pos).map(PriorState::Block)
        })
    }

    /// Captures the owner's inventory before it is changed.
    pub fn record_inventory<W>(&mut self, world: &W) -> bool
    where
        W: WorldAccess + ?Sized,
    {
        let owner = self.owner;
        self.record(LocationKey::Inventory(owner), || {
            world.inventory(owner).cloned().map(PriorState::Inventory)
        })
    }

    /// Drops the open checkpoint without applying it.
    pub fn discard(&mut self) -> Option<Checkpoint> {
        let dropped = self.active.take();
        if let Some(checkpoint) = &dropped {
            tracing::info!(
                entity = %self.owner,
                entries = checkpoint.len(),
                "checkpoint_discarded"
            );
        }
        dropped
    }

    /// Writes every captured state back, moves the owner to the origin and
    /// closes the checkpoint.
    ///
    /// With nothing open this does nothing and reports `had_checkpoint: false`.
    pub fn restore<W>(&mut self, world: &mut W) -> RestoreReport
    where
        W: WorldAccess + ?Sized,
    {
        let Some(checkpoint) = self.active.take() else {
            return RestoreReport::default();
        };

        let origin = checkpoint.origin;
        let mut report = RestoreReport {
            had_checkpoint: true,
            ..RestoreReport::default()
        };

        for (key, prior) in checkpoint.entries {
            let applied = match (key, prior) {
                (LocationKey::Block(pos), PriorState::Block(state)) => {
                    world.current_state_of(pos).is_some() && world.apply_state(pos, state)
                }
                (LocationKey::Inventory(id), PriorState::Inventory(inventory)) => {
                    match world.inventory_mut(id) {
                        Some(slot) => {
                            *slot = inventory;
                            true
                        }
                        None => false,
                    }
                }
                _ => false,
            };

            if applied {
                report.restored += 1;
            } else {
                tracing::warn!(entity = %self.owner, location = %key, "restore_entry_skipped");
                report.skipped.push(key);
            }
        }

        report.relocated = world.relocate(self.owner, origin);
        if !report.relocated {
            tracing::warn!(entity = %self.owner, origin = %origin.pos, "restore_relocate_failed");
        }

        if report.is_partial() {
            tracing::warn!(
                entity = %self.owner,
                restored = report.restored,
                skipped = report.skipped.len(),
                "partial_restore"
            );
        } else {
            tracing::info!(entity = %self.owner, restored = report.restored, "checkpoint_restored");
        }
        report
    }
}
