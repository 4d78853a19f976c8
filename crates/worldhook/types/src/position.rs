//! Coordinates, directions and world bounds

use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest valid horizontal block coordinate
pub const HORIZONTAL_LIMIT: i32 = 30_000_000;

/// Height of the world volume (valid y is `0..WORLD_HEIGHT`)
pub const WORLD_HEIGHT: i32 = 256;

/// Discrete block position
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    /// X coordinate
    pub x: i32,
    /// Y coordinate (height)
    pub y: i32,
    /// Z coordinate
    pub z: i32,
}

impl BlockPos {
    /// Create a new block position
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Whether this position lies inside the finite world volume
    pub fn is_valid(&self) -> bool {
        self.x >= -HORIZONTAL_LIMIT
            && self.z >= -HORIZONTAL_LIMIT
            && self.x < HORIZONTAL_LIMIT
            && self.z < HORIZONTAL_LIMIT
            && self.y >= 0
            && self.y < WORLD_HEIGHT
    }

    /// Position one step in `direction`
    pub fn offset(&self, direction: Direction) -> Self {
        let (dx, dy, dz) = direction.delta();
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Position directly below
    pub fn below(&self) -> Self {
        self.offset(Direction::Down)
    }

    /// Chunk containing this position
    pub fn chunk(&self) -> ChunkPos {
        ChunkPos::new(self.x >> 4, self.z >> 4)
    }

    /// Centre of this block as a continuous position
    pub fn center(&self) -> Vec3 {
        Vec3::new(
            f64::from(self.x) + 0.5,
            f64::from(self.y),
            f64::from(self.z) + 0.5,
        )
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Chunk column position (16x16 blocks)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPos {
    /// Chunk X
    pub x: i32,
    /// Chunk Z
    pub z: i32,
}

impl ChunkPos {
    /// Create a new chunk position
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}

/// Continuous position used by entities
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Z coordinate
    pub z: f64,
}

impl Vec3 {
    /// Create a new vector
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Block containing this point
    pub fn block_pos(&self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }

    /// Chunk containing this point
    pub fn chunk(&self) -> ChunkPos {
        self.block_pos().chunk()
    }
}

/// Entity facing
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotation {
    /// Pitch in degrees
    pub pitch: f32,
    /// Yaw in degrees
    pub yaw: f32,
}

impl Rotation {
    /// Create a new rotation
    pub const fn new(pitch: f32, yaw: f32) -> Self {
        Self { pitch, yaw }
    }
}

/// The six block faces
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    /// Negative Y
    Down,
    /// Positive Y
    Up,
    /// Negative Z
    North,
    /// Positive Z
    South,
    /// Negative X
    West,
    /// Positive X
    East,
}

impl Direction {
    /// All directions in engine notification order
    pub const ALL: [Direction; 6] = [
        Direction::West,
        Direction::East,
        Direction::Down,
        Direction::Up,
        Direction::North,
        Direction::South,
    ];

    /// Horizontal directions
    pub const HORIZONTAL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    fn delta(self) -> (i32, i32, i32) {
        match self {
            Direction::Down => (0, -1, 0),
            Direction::Up => (0, 1, 0),
            Direction::North => (0, 0, -1),
            Direction::South => (0, 0, 1),
            Direction::West => (-1, 0, 0),
            Direction::East => (1, 0, 0),
        }
    }
}
