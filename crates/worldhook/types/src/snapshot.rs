//! Immutable block and entity snapshots
//!
//! A snapshot is a fully detached copy of observable state at one point in
//! time. Nothing in a snapshot refers back to live world objects; "with"
//! operations always return a new snapshot.

use crate::block::BlockState;
use crate::ids::{EntityId, UserId, WorldId};
use crate::position::{BlockPos, Rotation, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque serialized payload (tile-entity or entity auxiliary data)
///
/// The capture pipeline never interprets the contents.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Blob(Vec<u8>);

impl Blob {
    /// Wrap raw bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload length
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Write-mode bit flags of a block write
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UpdateFlags(u8);

impl UpdateFlags {
    /// Notify neighbouring blocks
    pub const NOTIFY_NEIGHBORS: u8 = 1;
    /// Send the change to clients
    pub const SEND_TO_CLIENTS: u8 = 2;

    /// No side effects at all
    pub const fn none() -> Self {
        Self(0)
    }

    /// Notify neighbours and clients (the engine default, 3)
    pub const fn all() -> Self {
        Self(Self::NOTIFY_NEIGHBORS | Self::SEND_TO_CLIENTS)
    }

    /// Clients only (2)
    pub const fn clients_only() -> Self {
        Self(Self::SEND_TO_CLIENTS)
    }

    /// Raw bits
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Whether neighbours should be notified
    pub const fn notify_neighbors(&self) -> bool {
        self.0 & Self::NOTIFY_NEIGHBORS != 0
    }

    /// Whether clients should be updated
    pub const fn send_to_clients(&self) -> bool {
        self.0 & Self::SEND_TO_CLIENTS != 0
    }
}

/// Classification of a captured block mutation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CaptureType {
    /// A block was replaced by air
    Break,
    /// A block decayed into air while decay capture was active
    Decay,
    /// Same block type, different properties
    Modify,
    /// A different block type was placed
    Place,
    /// Written by a world-generation populator
    Populate,
}

impl fmt::Display for CaptureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureType::Break => "break",
            CaptureType::Decay => "decay",
            CaptureType::Modify => "modify",
            CaptureType::Place => "place",
            CaptureType::Populate => "populate",
        };
        write!(f, "{}", name)
    }
}

/// Immutable copy of one block's observable state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockSnapshot {
    world_id: WorldId,
    position: BlockPos,
    state: BlockState,
    extended_state: BlockState,
    creator: Option<UserId>,
    notifier: Option<UserId>,
    tile_data: Option<Blob>,
    capture_type: Option<CaptureType>,
    update_flags: UpdateFlags,
}

impl BlockSnapshot {
    /// Start building a snapshot
    pub fn builder(world_id: WorldId, position: BlockPos, state: BlockState) -> BlockSnapshotBuilder {
        BlockSnapshotBuilder::new(world_id, position, state)
    }

    /// World the block belongs to
    pub fn world_id(&self) -> WorldId {
        self.world_id
    }

    /// Block position
    pub fn position(&self) -> BlockPos {
        self.position
    }

    /// Stored block state
    pub fn state(&self) -> &BlockState {
        &self.state
    }

    /// Extended (actual) state, including neighbour-derived properties
    pub fn extended_state(&self) -> &BlockState {
        &self.extended_state
    }

    /// Owning user
    pub fn creator(&self) -> Option<UserId> {
        self.creator
    }

    /// Last notifying user
    pub fn notifier(&self) -> Option<UserId> {
        self.notifier
    }

    /// Serialized tile-entity data
    pub fn tile_data(&self) -> Option<&Blob> {
        self.tile_data.as_ref()
    }

    /// Capture classification, if this snapshot was captured
    pub fn capture_type(&self) -> Option<CaptureType> {
        self.capture_type
    }

    /// Write-mode flags of the write that produced this snapshot
    pub fn update_flags(&self) -> UpdateFlags {
        self.update_flags
    }

    /// Copy of this snapshot holding a different state
    ///
    /// Tile data is dropped since it belonged to the old state.
    pub fn with_state(&self, state: BlockState) -> Self {
        Self {
            extended_state: state.clone(),
            state,
            tile_data: None,
            ..self.clone()
        }
    }

    /// Copy of this snapshot with a capture classification
    pub fn with_capture_type(&self, capture_type: CaptureType) -> Self {
        Self {
            capture_type: Some(capture_type),
            ..self.clone()
        }
    }

    /// Copy of this snapshot at another position
    pub fn with_position(&self, position: BlockPos) -> Self {
        Self {
            position,
            ..self.clone()
        }
    }
}

/// Builder for [`BlockSnapshot`]
#[derive(Clone, Debug)]
pub struct BlockSnapshotBuilder {
    world_id: WorldId,
    position: BlockPos,
    state: BlockState,
    extended_state: Option<BlockState>,
    creator: Option<UserId>,
    notifier: Option<UserId>,
    tile_data: Option<Blob>,
    capture_type: Option<CaptureType>,
    update_flags: UpdateFlags,
}

impl BlockSnapshotBuilder {
    /// Create a builder for a state at a position
    pub fn new(world_id: WorldId, position: BlockPos, state: BlockState) -> Self {
        Self {
            world_id,
            position,
            state,
            extended_state: None,
            creator: None,
            notifier: None,
            tile_data: None,
            capture_type: None,
            update_flags: UpdateFlags::none(),
        }
    }

    /// Set the extended state
    pub fn extended_state(mut self, state: BlockState) -> Self {
        self.extended_state = Some(state);
        self
    }

    /// Set the owning user
    pub fn creator(mut self, user: Option<UserId>) -> Self {
        self.creator = user;
        self
    }

    /// Set the notifying user
    pub fn notifier(mut self, user: Option<UserId>) -> Self {
        self.notifier = user;
        self
    }

    /// Attach serialized tile-entity data
    pub fn tile_data(mut self, data: Option<Blob>) -> Self {
        self.tile_data = data;
        self
    }

    /// Set the capture classification
    pub fn capture_type(mut self, capture_type: CaptureType) -> Self {
        self.capture_type = Some(capture_type);
        self
    }

    /// Set the write-mode flags
    pub fn update_flags(mut self, flags: UpdateFlags) -> Self {
        self.update_flags = flags;
        self
    }

    /// Build the snapshot
    pub fn build(self) -> BlockSnapshot {
        BlockSnapshot {
            world_id: self.world_id,
            position: self.position,
            extended_state: self.extended_state.unwrap_or_else(|| self.state.clone()),
            state: self.state,
            creator: self.creator,
            notifier: self.notifier,
            tile_data: self.tile_data,
            capture_type: self.capture_type,
            update_flags: self.update_flags,
        }
    }
}

/// Kind of entity, used for spawn routing and attribution
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// A connected player
    Player,
    /// A dropped item stack
    Item,
    /// A decoration anchored to a block face (painting, item frame)
    Hanging,
    /// A lightning bolt (weather effect)
    Lightning,
    /// A falling block
    FallingBlock,
    /// A living creature
    Living,
    /// Any other entity type
    Other(String),
}

impl EntityKind {
    /// Whether this entity is routed to the item buffer
    pub fn is_item(&self) -> bool {
        matches!(self, EntityKind::Item)
    }

    /// Whether this entity is a player
    pub fn is_player(&self) -> bool {
        matches!(self, EntityKind::Player)
    }

    /// Whether this entity is a weather effect
    pub fn is_weather_effect(&self) -> bool {
        matches!(self, EntityKind::Lightning)
    }
}

/// Immutable copy of one entity's observable state
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// World the entity belongs to
    pub world_id: WorldId,
    /// Entity identity
    pub entity_id: EntityId,
    /// Entity kind
    pub kind: EntityKind,
    /// Position
    pub position: Vec3,
    /// Facing
    pub rotation: Rotation,
    /// Tracked creator
    pub creator: Option<UserId>,
    /// Tracked notifier
    pub notifier: Option<UserId>,
    /// Serialized auxiliary data
    pub data: Option<Blob>,
}

/// Minimal item stack, used when re-sending an inventory slot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    /// Item type
    pub item: String,
    /// Stack size
    pub quantity: u32,
}

impl ItemStack {
    /// Create an item stack
    pub fn new(item: impl Into<String>, quantity: u32) -> Self {
        Self {
            item: item.into(),
            quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> BlockSnapshot {
        BlockSnapshot::builder(WorldId::generate(), BlockPos::new(1, 2, 3), BlockState::of("chest"))
            .tile_data(Some(Blob::new(vec![1, 2, 3])))
            .update_flags(UpdateFlags::all())
            .build()
    }

    #[test]
    fn test_builder_defaults_extended_state() {
        let snap = snapshot();
        assert_eq!(snap.extended_state(), snap.state());
        assert_eq!(snap.capture_type(), None);
        assert!(snap.update_flags().notify_neighbors());
    }

    #[test]
    fn test_with_state_returns_new_snapshot() {
        let snap = snapshot();
        let air = snap.with_state(BlockState::air());
        assert_eq!(snap.state(), &BlockState::of("chest"));
        assert!(snap.tile_data().is_some());
        assert!(air.state().is_air());
        assert!(air.tile_data().is_none());
        assert_eq!(air.position(), snap.position());
    }

    #[test]
    fn test_update_flags() {
        let flags = UpdateFlags::clients_only();
        assert!(!flags.notify_neighbors());
        assert!(flags.send_to_clients());
        assert_eq!(UpdateFlags::all().bits(), 3);
    }

    #[test]
    fn test_snapshot_serde() {
        let snap = snapshot().with_capture_type(CaptureType::Break);
        let json = serde_json::to_string(&snap).unwrap();
        let back: BlockSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
