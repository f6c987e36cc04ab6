//! # Block Kinds
//!
//! Closed enumeration of block kinds with a capability lookup.
//!
//! Commands never test a block's "type hierarchy"; they ask what it can do:
//!
//! ```text
//!   BlockKind::Lever.capabilities() = POWERABLE | ATTACHABLE | DIRECTIONAL | BREAKABLE
//!   BlockKind::Door.capabilities()  = OPENABLE  | DIRECTIONAL | BREAKABLE
//! ```

use crate::location::Facing;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Capability flags for block kinds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Capabilities(u32);

impl Capabilities {
    /// No capabilities.
    pub const NONE: Self = Self(0);
    /// Can be opened and closed (doors, trapdoors, gates).
    pub const OPENABLE: Self = Self(1 << 0);
    /// Can be switched on and off (levers, buttons, lamps).
    pub const POWERABLE: Self = Self(1 << 1);
    /// Stores a facing when placed.
    pub const DIRECTIONAL: Self = Self(1 << 2);
    /// Must be attached to a neighbouring solid block.
    pub const ATTACHABLE: Self = Self(1 << 3);
    /// Holds items.
    pub const CONTAINER: Self = Self(1 << 4);
    /// Entities can move through it.
    pub const PASSABLE: Self = Self(1 << 5);
    /// Can be dug.
    pub const BREAKABLE: Self = Self(1 << 6);
    /// Placing a block here overwrites it.
    pub const REPLACEABLE: Self = Self(1 << 7);

    /// Returns the raw bits.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Checks if every flag in `flag` is set.
    #[inline]
    #[must_use]
    pub const fn has(self, flag: Self) -> bool {
        (self.0 & flag.0) == flag.0
    }

    /// Combines two flag sets.
    #[inline]
    #[must_use]
    pub const fn with(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }
}

/// Every block kind the world knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Empty space.
    Air,
    /// Stone.
    Stone,
    /// Cobblestone.
    Cobblestone,
    /// Dirt.
    Dirt,
    /// Grass block.
    Grass,
    /// Sand.
    Sand,
    /// Gravel.
    Gravel,
    /// Water source.
    Water,
    /// Lava source.
    Lava,
    /// Wooden planks.
    Planks,
    /// Log (oriented).
    Log,
    /// Glass.
    Glass,
    /// Bedrock; cannot be dug.
    Bedrock,
    /// Wall or floor torch.
    Torch,
    /// Lever.
    Lever,
    /// Stone button.
    Button,
    /// Wooden door.
    Door,
    /// Wooden trapdoor.
    Trapdoor,
    /// Fence gate.
    FenceGate,
    /// Chest.
    Chest,
    /// Furnace.
    Furnace,
    /// Redstone lamp.
    RedstoneLamp,
    /// Redstone dust.
    RedstoneWire,
    /// Piston.
    Piston,
}

impl BlockKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 24] = [
        Self::Air,
        Self::Stone,
        Self::Cobblestone,
        Self::Dirt,
        Self::Grass,
        Self::Sand,
        Self::Gravel,
        Self::Water,
        Self::Lava,
        Self::Planks,
        Self::Log,
        Self::Glass,
        Self::Bedrock,
        Self::Torch,
        Self::Lever,
        Self::Button,
        Self::Door,
        Self::Trapdoor,
        Self::FenceGate,
        Self::Chest,
        Self::Furnace,
        Self::RedstoneLamp,
        Self::RedstoneWire,
        Self::Piston,
    ];

    /// Capability lookup.
    #[must_use]
    pub const fn capabilities(self) -> Capabilities {
        const SOLID: Capabilities = Capabilities::BREAKABLE;
        match self {
            Self::Air | Self::Water | Self::Lava => {
                Capabilities::PASSABLE.with(Capabilities::REPLACEABLE)
            }
            Self::Bedrock => Capabilities::NONE,
            Self::Stone
            | Self::Cobblestone
            | Self::Dirt
            | Self::Grass
            | Self::Sand
            | Self::Gravel
            | Self::Planks
            | Self::Glass => SOLID,
            Self::Log => SOLID.with(Capabilities::DIRECTIONAL),
            Self::Torch => SOLID
                .with(Capabilities::PASSABLE)
                .with(Capabilities::ATTACHABLE)
                .with(Capabilities::DIRECTIONAL),
            Self::Lever | Self::Button => SOLID
                .with(Capabilities::POWERABLE)
                .with(Capabilities::ATTACHABLE)
                .with(Capabilities::DIRECTIONAL)
                .with(Capabilities::PASSABLE),
            Self::Door | Self::Trapdoor | Self::FenceGate => SOLID
                .with(Capabilities::OPENABLE)
                .with(Capabilities::DIRECTIONAL),
            Self::Chest => SOLID
                .with(Capabilities::CONTAINER)
                .with(Capabilities::DIRECTIONAL),
            Self::Furnace => SOLID
                .with(Capabilities::CONTAINER)
                .with(Capabilities::DIRECTIONAL)
                .with(Capabilities::POWERABLE),
            Self::RedstoneLamp => SOLID.with(Capabilities::POWERABLE),
            Self::RedstoneWire => SOLID
                .with(Capabilities::POWERABLE)
                .with(Capabilities::PASSABLE),
            Self::Piston => SOLID
                .with(Capabilities::POWERABLE)
                .with(Capabilities::DIRECTIONAL),
        }
    }

    /// Shorthand for a single capability check.
    #[inline]
    #[must_use]
    pub const fn has(self, flag: Capabilities) -> bool {
        self.capabilities().has(flag)
    }

    /// Returns true for air.
    #[inline]
    #[must_use]
    pub const fn is_air(self) -> bool {
        matches!(self, Self::Air)
    }

    /// Identifier used in scripts and files.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Air => "air",
            Self::Stone => "stone",
            Self::Cobblestone => "cobblestone",
            Self::Dirt => "dirt",
            Self::Grass => "grass",
            Self::Sand => "sand",
            Self::Gravel => "gravel",
            Self::Water => "water",
            Self::Lava => "lava",
            Self::Planks => "planks",
            Self::Log => "log",
            Self::Glass => "glass",
            Self::Bedrock => "bedrock",
            Self::Torch => "torch",
            Self::Lever => "lever",
            Self::Button => "button",
            Self::Door => "door",
            Self::Trapdoor => "trapdoor",
            Self::FenceGate => "fence_gate",
            Self::Chest => "chest",
            Self::Furnace => "furnace",
            Self::RedstoneLamp => "redstone_lamp",
            Self::RedstoneWire => "redstone_wire",
            Self::Piston => "piston",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for an unknown block name.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown block kind: {0}")]
pub struct UnknownBlockKind(pub String);

impl FromStr for BlockKind {
    type Err = UnknownBlockKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches("minecraft:").to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| UnknownBlockKind(s.to_string()))
    }
}

/// Full state of one block cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockState {
    /// Block kind.
    pub kind: BlockKind,
    /// Facing, for directional kinds.
    pub facing: Option<Facing>,
    /// Powered flag, for powerable kinds.
    pub powered: bool,
    /// Open flag, for openable kinds.
    pub open: bool,
}

impl BlockState {
    /// Air.
    pub const AIR: Self = Self::of(BlockKind::Air);

    /// Default state of a kind.
    #[inline]
    #[must_use]
    pub const fn of(kind: BlockKind) -> Self {
        Self {
            kind,
            facing: None,
            powered: false,
            open: false,
        }
    }

    /// Same state with a facing; ignored for non-directional kinds.
    #[must_use]
    pub const fn facing(mut self, facing: Facing) -> Self {
        if self.kind.has(Capabilities::DIRECTIONAL) {
            self.facing = Some(facing);
        }
        self
    }

    /// Toggles the interactive part of the block.
    ///
    /// Openable blocks flip `open`, powerable blocks flip `powered`.
    /// Returns `None` for kinds with nothing to toggle.
    #[must_use]
    pub const fn toggled(self) -> Option<Self> {
        let mut next = self;
        if self.kind.has(Capabilities::OPENABLE) {
            next.open = !self.open;
            Some(next)
        } else if self.kind.has(Capabilities::POWERABLE) {
            next.powered = !self.powered;
            Some(next)
        } else {
            None
        }
    }
}

impl Default for BlockState {
    fn default() -> Self {
        Self::AIR
    }
}
