//! # Positions, Facings and Coordinate Modes
//!
//! Commands address blocks with an offset plus a [`CoordMode`]:
//!
//! ```text
//!   Absolute  (x, y, z)             world coordinates
//!   Relative  ~x ~y ~z              offset from the entity's block
//!   Local     ^x ^y ^z              x = right, y = up, z = forward
//! ```
//!
//! Horizontal facings follow the yaw convention used by the world:
//! yaw 0 faces south (+z), 90 west, 180 north, 270 east.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::str::FromStr;

/// Integer block position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    /// X coordinate (east is positive).
    pub x: i32,
    /// Y coordinate (up is positive).
    pub y: i32,
    /// Z coordinate (south is positive).
    pub z: i32,
}

impl BlockPos {
    /// The origin.
    pub const ZERO: Self = Self::new(0, 0, 0);

    /// Creates a position.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Position offset by a vector.
    #[inline]
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Position `n` steps along `facing`.
    #[inline]
    #[must_use]
    pub const fn step(self, facing: Facing, n: i32) -> Self {
        let (dx, dy, dz) = facing.vector();
        self.offset(dx * n, dy * n, dz * n)
    }

    /// The chunk column containing this position.
    #[inline]
    #[must_use]
    pub const fn chunk(self) -> ChunkCoord {
        ChunkCoord::new(self.x.div_euclid(16), self.z.div_euclid(16))
    }
}

impl Add for BlockPos {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.offset(rhs.x, rhs.y, rhs.z)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Chunk column coordinate (16x16 blocks).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    /// Chunk X.
    pub x: i32,
    /// Chunk Z.
    pub z: i32,
}

impl ChunkCoord {
    /// Creates a chunk coordinate.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// One of the six block faces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    /// +z
    South,
    /// -x
    West,
    /// -z
    North,
    /// +x
    East,
    /// +y
    Up,
    /// -y
    Down,
}

impl Facing {
    /// Horizontal facings in clockwise order, starting at yaw 0.
    pub const HORIZONTAL: [Self; 4] = [Self::South, Self::West, Self::North, Self::East];

    /// Unit vector.
    #[must_use]
    pub const fn vector(self) -> (i32, i32, i32) {
        match self {
            Self::South => (0, 0, 1),
            Self::West => (-1, 0, 0),
            Self::North => (0, 0, -1),
            Self::East => (1, 0, 0),
            Self::Up => (0, 1, 0),
            Self::Down => (0, -1, 0),
        }
    }

    /// The opposite face.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::South => Self::North,
            Self::West => Self::East,
            Self::North => Self::South,
            Self::East => Self::West,
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }

    /// Quarter turn clockwise seen from above. Vertical faces are unchanged.
    #[must_use]
    pub const fn rotate_cw(self) -> Self {
        match self {
            Self::North => Self::East,
            Self::East => Self::South,
            Self::South => Self::West,
            Self::West => Self::North,
            vertical => vertical,
        }
    }

    /// Quarter turn counter-clockwise seen from above.
    #[must_use]
    pub const fn rotate_ccw(self) -> Self {
        self.rotate_cw().opposite()
    }

    /// Nearest horizontal facing for a yaw in degrees.
    #[must_use]
    pub fn from_yaw(yaw: i32) -> Self {
        let quadrant = (normalize_yaw(yaw) + 45) / 90 % 4;
        Self::HORIZONTAL[quadrant as usize]
    }

    /// Yaw in degrees for a horizontal facing; vertical faces map to 0.
    #[must_use]
    pub const fn yaw(self) -> i32 {
        match self {
            Self::West => 90,
            Self::North => 180,
            Self::East => 270,
            _ => 0,
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::South => "south",
            Self::West => "west",
            Self::North => "north",
            Self::East => "east",
            Self::Up => "up",
            Self::Down => "down",
        };
        f.write_str(name)
    }
}

/// Normalizes a yaw into `0..360`.
#[inline]
#[must_use]
pub const fn normalize_yaw(yaw: i32) -> i32 {
    yaw.rem_euclid(360)
}

/// Where an entity stands and which way it looks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placement {
    /// Block the entity occupies.
    pub pos: BlockPos,
    /// Yaw in degrees, `0..360`.
    pub yaw: i32,
}

impl Placement {
    /// Creates a placement, normalizing the yaw.
    #[must_use]
    pub const fn new(pos: BlockPos, yaw: i32) -> Self {
        Self {
            pos,
            yaw: normalize_yaw(yaw),
        }
    }

    /// Horizontal facing derived from the yaw.
    #[must_use]
    pub fn facing(self) -> Facing {
        Facing::from_yaw(self.yaw)
    }

    /// Same position, rotated by `degrees` (positive turns right).
    #[must_use]
    pub const fn turned(self, degrees: i32) -> Self {
        Self::new(self.pos, self.yaw + degrees)
    }

    /// Same yaw, different position.
    #[must_use]
    pub const fn moved_to(self, pos: BlockPos) -> Self {
        Self { pos, yaw: self.yaw }
    }
}

/// How a command's offset is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordMode {
    /// World coordinates.
    Absolute,
    /// Offset from the entity's block (`~`).
    Relative,
    /// Offset in the entity's own frame (`^`).
    #[default]
    Local,
}

impl CoordMode {
    /// Resolves an offset against an entity placement.
    #[must_use]
    pub fn resolve(self, origin: Placement, offset: BlockPos) -> BlockPos {
        match self {
            Self::Absolute => offset,
            Self::Relative => origin.pos + offset,
            Self::Local => {
                let forward = origin.facing();
                origin
                    .pos
                    .step(forward.rotate_cw(), offset.x)
                    .offset(0, offset.y, 0)
                    .step(forward, offset.z)
            }
        }
    }
}

/// Error for an unknown coordinate mode, side or direction token.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {what}: {value}")]
pub struct ParseTokenError {
    /// What was being parsed.
    pub what: &'static str,
    /// The rejected input.
    pub value: String,
}

impl FromStr for CoordMode {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "absolute" => Ok(Self::Absolute),
            "~" | "relative" => Ok(Self::Relative),
            "^" | "local" => Ok(Self::Local),
            other => Err(ParseTokenError {
                what: "coordinate mode",
                value: other.to_string(),
            }),
        }
    }
}

/// Which way a placed directional block faces, relative to the placer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceSide {
    /// Same way as the entity.
    #[default]
    Front,
    /// Toward the entity.
    Back,
    /// The entity's left.
    Left,
    /// The entity's right.
    Right,
}

impl PlaceSide {
    /// Facing of the placed block for an entity facing `facing`.
    #[must_use]
    pub const fn resolve(self, facing: Facing) -> Facing {
        match self {
            Self::Front => facing,
            Self::Back => facing.opposite(),
            Self::Left => facing.rotate_ccw(),
            Self::Right => facing.rotate_cw(),
        }
    }
}

impl FromStr for PlaceSide {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "front" => Ok(Self::Front),
            "back" => Ok(Self::Back),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(ParseTokenError {
                what: "place side",
                value: other.to_string(),
            }),
        }
    }
}

/// Direction relative to the entity, for probes like `is_blocked`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Ahead.
    Forward,
    /// Behind.
    Back,
    /// Left.
    Left,
    /// Right.
    Right,
    /// Above.
    Up,
    /// Below.
    Down,
}

impl Direction {
    /// Local-frame offset of the neighbouring block in this direction.
    #[must_use]
    pub const fn local_offset(self) -> BlockPos {
        match self {
            Self::Forward => BlockPos::new(0, 0, 1),
            Self::Back => BlockPos::new(0, 0, -1),
            Self::Left => BlockPos::new(-1, 0, 0),
            Self::Right => BlockPos::new(1, 0, 0),
            Self::Up => BlockPos::new(0, 1, 0),
            Self::Down => BlockPos::new(0, -1, 0),
        }
    }

    /// World facing for an entity facing `facing`.
    #[must_use]
    pub const fn heading(self, facing: Facing) -> Facing {
        match self {
            Self::Forward => facing,
            Self::Back => facing.opposite(),
            Self::Left => facing.rotate_ccw(),
            Self::Right => facing.rotate_cw(),
            Self::Up => Facing::Up,
            Self::Down => Facing::Down,
        }
    }
}

impl FromStr for Direction {
    type Err = ParseTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" | "front" => Ok(Self::Forward),
            "back" => Ok(Self::Back),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => Err(ParseTokenError {
                what: "direction",
                value: other.to_string(),
            }),
        }
    }
}

/// Axis-aligned box of blocks, inclusive on both corners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Volume {
    /// Smallest corner.
    pub min: BlockPos,
    /// Largest corner.
    pub max: BlockPos,
}

impl Volume {
    /// Creates a volume from any two opposite corners.
    #[must_use]
    pub fn new(a: BlockPos, b: BlockPos) -> Self {
        Self {
            min: BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: BlockPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Checks if `pos` lies inside.
    #[must_use]
    pub const fn contains(&self, pos: BlockPos) -> bool {
        pos.x >= self.min.x
            && pos.x <= self.max.x
            && pos.y >= self.min.y
            && pos.y <= self.max.y
            && pos.z >= self.min.z
            && pos.z <= self.max.z
    }
}
