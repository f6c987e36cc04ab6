//! # In-Memory Voxel World
//!
//! A small, sparse [`WorldAccess`] implementation used by the headless server
//! and the tests.
//!
//! ## Layout
//!
//! ```text
//!   loaded: HashSet<ChunkCoord>        16x16 columns that may be read or written
//!   blocks: HashMap<BlockPos, State>   non-air cells only
//!   actors: HashMap<EntityId, Actor>   placement + inventory
//!   protected: Vec<Volume>             regions no actor may edit
//! ```
//!
//! Unloading a chunk keeps its blocks but makes every cell in it unreadable,
//! which is how a location "becomes invalid" between capture and restore.

use crate::block::{BlockKind, BlockState};
use crate::inventory::Inventory;
use crate::location::{BlockPos, ChunkCoord, Placement, Volume};
use crate::world::{BlockChange, WorldAccess};
use marionette_core::EntityId;
use std::collections::{HashMap, HashSet};

/// Lowest buildable Y.
pub const MIN_BUILD_Y: i32 = -64;
/// Highest buildable Y.
pub const MAX_BUILD_Y: i32 = 319;

#[derive(Clone, Debug)]
struct Actor {
    placement: Placement,
    inventory: Inventory,
}

/// Sparse block world with actors.
#[derive(Clone, Debug, Default)]
pub struct VoxelWorld {
    blocks: HashMap<BlockPos, BlockState>,
    loaded: HashSet<ChunkCoord>,
    actors: HashMap<EntityId, Actor>,
    protected: Vec<Volume>,
    changes: Vec<BlockChange>,
}

impl VoxelWorld {
    /// Creates an empty world with nothing loaded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a world with a square of chunks loaded around the origin.
    #[must_use]
    pub fn with_loaded_radius(radius: i32) -> Self {
        let mut world = Self::new();
        for x in -radius..=radius {
            for z in -radius..=radius {
                world.load_chunk(ChunkCoord::new(x, z));
            }
        }
        world
    }

    /// Marks a chunk as loaded.
    pub fn load_chunk(&mut self, chunk: ChunkCoord) {
        self.loaded.insert(chunk);
    }

    /// Marks a chunk as unloaded. Its blocks are kept but become unreadable.
    pub fn unload_chunk(&mut self, chunk: ChunkCoord) {
        self.loaded.remove(&chunk);
    }

    /// Whether the chunk containing `pos` is loaded.
    #[must_use]
    pub fn is_loaded(&self, pos: BlockPos) -> bool {
        self.loaded.contains(&pos.chunk())
    }

    /// Forbids edits inside a volume.
    pub fn protect(&mut self, volume: Volume) {
        self.protected.push(volume);
    }

    /// Fills a volume without going through the change journal.
    pub fn fill(&mut self, volume: Volume, kind: BlockKind) {
        for x in volume.min.x..=volume.max.x {
            for y in volume.min.y..=volume.max.y {
                for z in volume.min.z..=volume.max.z {
                    self.put(BlockPos::new(x, y, z), BlockState::of(kind));
                }
            }
        }
    }

    fn put(&mut self, pos: BlockPos, state: BlockState) {
        if state.kind.is_air() {
            self.blocks.remove(&pos);
        } else {
            self.blocks.insert(pos, state);
        }
    }

    /// Block at `pos`, ignoring load state. Missing cells are air.
    #[must_use]
    pub fn block(&self, pos: BlockPos) -> BlockState {
        self.blocks.get(&pos).copied().unwrap_or(BlockState::AIR)
    }

    /// Adds an actor. Returns false if the id is taken.
    pub fn spawn_actor(&mut self, id: EntityId, placement: Placement) -> bool {
        if self.actors.contains_key(&id) {
            return false;
        }
        self.actors.insert(
            id,
            Actor {
                placement,
                inventory: Inventory::new(),
            },
        );
        true
    }

    /// Removes an actor, returning its inventory.
    pub fn despawn_actor(&mut self, id: EntityId) -> Option<Inventory> {
        self.actors.remove(&id).map(|actor| actor.inventory)
    }

    /// Ids of all actors.
    #[must_use]
    pub fn actor_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.actors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of non-air cells.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

impl WorldAccess for VoxelWorld {
    fn can_mutate_at(&self, pos: BlockPos, actor: EntityId) -> bool {
        self.actors.contains_key(&actor)
            && self.is_loaded(pos)
            && (MIN_BUILD_Y..=MAX_BUILD_Y).contains(&pos.y)
            && !self.protected.iter().any(|volume| volume.contains(pos))
    }

    fn current_state_of(&self, pos: BlockPos) -> Option<BlockState> {
        self.is_loaded(pos).then(|| self.block(pos))
    }

    fn apply_state(&mut self, pos: BlockPos, state: BlockState) -> bool {
        if !self.is_loaded(pos) {
            return false;
        }
        let before = self.block(pos);
        if before != state {
            self.put(pos, state);
            self.changes.push(BlockChange {
                pos,
                before,
                after: state,
            });
        }
        true
    }

    fn relocate(&mut self, actor: EntityId, to: Placement) -> bool {
        let loaded = self.is_loaded(to.pos);
        match self.actors.get_mut(&actor) {
            Some(entry) if loaded => {
                entry.placement = to;
                true
            }
            _ => false,
        }
    }

    fn placement_of(&self, actor: EntityId) -> Option<Placement> {
        self.actors.get(&actor).map(|entry| entry.placement)
    }

    fn inventory(&self, actor: EntityId) -> Option<&Inventory> {
        self.actors.get(&actor).map(|entry| &entry.inventory)
    }

    fn inventory_mut(&mut self, actor: EntityId) -> Option<&mut Inventory> {
        self.actors.get_mut(&actor).map(|entry| &mut entry.inventory)
    }

    fn drain_changes(&mut self) -> Vec<BlockChange> {
        std::mem::take(&mut self.changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> (VoxelWorld, EntityId) {
        let mut world = VoxelWorld::with_loaded_radius(1);
        let id = EntityId::new(1);
        assert!(world.spawn_actor(id, Placement::new(BlockPos::new(0, 64, 0), 0)));
        (world, id)
    }

    #[test]
    fn test_apply_and_read() {
        let (mut world, _) = world();
        let pos = BlockPos::new(3, 64, 3);
        assert_eq!(world.current_state_of(pos), Some(BlockState::AIR));
        assert!(world.apply_state(pos, BlockState::of(BlockKind::Stone)));
        assert_eq!(world.kind_at(pos), Some(BlockKind::Stone));
        assert_eq!(world.block_count(), 1);
    }

    #[test]
    fn test_unloaded_is_unreadable() {
        let (mut world, id) = world();
        let pos = BlockPos::new(3, 64, 3);
        world.apply_state(pos, BlockState::of(BlockKind::Stone));
        world.unload_chunk(pos.chunk());

        assert_eq!(world.current_state_of(pos), None);
        assert!(!world.apply_state(pos, BlockState::AIR));
        assert!(!world.can_mutate_at(pos, id));
        assert_eq!(world.block(pos).kind, BlockKind::Stone);
    }

    #[test]
    fn test_protected_volume() {
        let (mut world, id) = world();
        world.protect(Volume::new(BlockPos::new(0, 0, 0), BlockPos::new(4, 100, 4)));
        assert!(!world.can_mutate_at(BlockPos::new(2, 64, 2), id));
        assert!(world.can_mutate_at(BlockPos::new(5, 64, 2), id));
    }

    #[test]
    fn test_change_journal() {
        let (mut world, _) = world();
        let pos = BlockPos::new(1, 64, 1);
        world.apply_state(pos, BlockState::of(BlockKind::Lever));
        world.apply_state(pos, BlockState::of(BlockKind::Lever).toggled().unwrap());
        world.apply_state(pos, BlockState::AIR);
        // Writing the same state again is not a change.
        world.apply_state(pos, BlockState::AIR);

        let changes = world.drain_changes();
        assert_eq!(changes.len(), 3);
        assert!(changes[1].power_changed());
        assert!(changes[2].is_break());
        assert!(world.drain_changes().is_empty());
    }

    #[test]
    fn test_relocate() {
        let (mut world, id) = world();
        let target = Placement::new(BlockPos::new(2, 64, 2), 90);
        assert!(world.relocate(id, target));
        assert_eq!(world.placement_of(id), Some(target));
        assert!(!world.relocate(EntityId::new(99), target));
        assert!(!world.relocate(id, Placement::new(BlockPos::new(500, 64, 0), 0)));
    }
}
