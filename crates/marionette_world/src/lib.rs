//! # Marionette World
//!
//! The world-facing half of the command layer.
//!
//! ## Modules
//!
//! - [`block`]: closed block-kind enumeration and capability lookup
//! - [`location`]: positions, facings, coordinate modes, volumes
//! - [`inventory`]: slot inventories carried by entities
//! - [`world`]: the [`WorldAccess`] seam to the authoritative simulation
//! - [`voxel`]: an in-memory [`WorldAccess`] implementation
//! - [`snapshot`]: checkpoints that undo an entity's edits as one unit
//!
//! Every type here is used from the authoritative loop thread only.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod block;
pub mod error;
pub mod inventory;
pub mod location;
pub mod snapshot;
pub mod voxel;
pub mod world;

pub use block::{BlockKind, BlockState, Capabilities, UnknownBlockKind};
pub use error::{WorldError, WorldResult};
pub use inventory::{Inventory, ItemStack, INVENTORY_SLOTS, MAX_STACK};
pub use location::{
    BlockPos, ChunkCoord, CoordMode, Direction, Facing, ParseTokenError, PlaceSide, Placement,
    Volume,
};
pub use snapshot::{Checkpoint, LocationKey, PriorState, RestoreReport, SnapshotStore};
pub use voxel::VoxelWorld;
pub use world::{BlockChange, WorldAccess};
