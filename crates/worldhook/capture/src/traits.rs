//! Collaborator seams of the mediator
//!
//! The mediator owns capture, classification, dispatch and commit. Everything
//! else (chunk storage, ownership tracking, client connections, block and
//! entity game logic) is reached through these traits.

use crate::entity::Entity;
use crate::errors::CaptureResult;
use crate::events::WorldEvent;
use worldhook_types::{
    Blob, BlockPos, BlockSnapshot, BlockState, BlockType, CauseChain, ChunkPos, EntityId,
    ItemStack, LightProperties, Rotation, UpdateFlags, UserId, WorldId,
};

/// Low-level world state primitives
pub trait WorldStorage {
    /// Identity of this world
    fn world_id(&self) -> WorldId;

    /// Current state at `pos`
    fn block_state(&self, pos: BlockPos) -> BlockState;

    /// Write without any capture or side effects
    ///
    /// Returns the previous state, or `None` if the write did not happen.
    fn write_block_state_raw(&mut self, pos: BlockPos, state: BlockState) -> Option<BlockState>;

    /// Lighting-relevant properties of a state
    fn light_properties(&self, state: &BlockState) -> LightProperties;

    /// Recompute lighting around `pos`
    fn recheck_light(&mut self, pos: BlockPos);

    /// Serialized tile-entity data at `pos`
    fn tile_data(&self, pos: BlockPos) -> Option<Blob>;

    /// Replace the tile-entity data at `pos`
    fn restore_tile_data(&mut self, pos: BlockPos, data: Option<Blob>);

    /// Whether the chunk is loaded
    fn is_chunk_loaded(&self, chunk: ChunkPos) -> bool;

    /// Whether the chunk finished world generation
    fn is_chunk_populated(&self, chunk: ChunkPos) -> bool;

    /// Queue `pos` for a client block update
    fn mark_block_for_update(&mut self, pos: BlockPos);
}

/// Kind of per-position user tracking
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackerKind {
    /// User who placed (owns) the block
    Owner,
    /// User who last caused an update of the block
    Notifier,
}

/// Per-chunk block ownership and notification tracking
pub trait TrackingStore {
    /// Tracked user for `pos`
    fn tracked(&self, pos: BlockPos, kind: TrackerKind) -> Option<UserId>;

    /// Set (or clear) the tracked user for `pos`
    fn track(&mut self, pos: BlockPos, kind: TrackerKind, user: Option<UserId>);
}

/// Connection to the users whose actions are being processed
pub trait ClientSink {
    /// Re-send the authoritative state of one block
    fn send_block_change(&mut self, user: UserId, pos: BlockPos, state: &BlockState);

    /// Re-send the tile-entity description of one block
    fn send_tile_description(&mut self, user: UserId, pos: BlockPos, data: &Blob);

    /// Re-send one inventory slot
    fn send_inventory_slot(&mut self, user: UserId, slot: u32, item: &ItemStack);
}

/// Read-only block access
pub trait BlockView {
    /// State at `pos` as seen by game logic
    fn view_block_state(&self, pos: BlockPos) -> BlockState;
}

/// Game logic of one block type
///
/// Every hook has a no-op default.
pub trait BlockBehavior {
    /// State including neighbour-derived properties
    fn actual_state(&self, state: &BlockState, _view: &dyn BlockView, _pos: BlockPos) -> BlockState {
        state.clone()
    }

    /// Whether `state` hosts a tile entity (containers are placed automatically)
    fn has_tile_entity(&self, _state: &BlockState) -> bool {
        false
    }

    /// Whether comparators read this block
    fn has_comparator_input_override(&self) -> bool {
        false
    }

    /// Called once a new state has been committed at `pos`
    fn on_block_added(
        &self,
        _world: &mut dyn WorldAccess,
        _pos: BlockPos,
        _state: &BlockState,
    ) -> CaptureResult<()> {
        Ok(())
    }

    /// Called when a neighbour of `pos` changed
    fn on_neighbor_changed(
        &self,
        _world: &mut dyn WorldAccess,
        _pos: BlockPos,
        _state: &BlockState,
        _source: &BlockType,
    ) -> CaptureResult<()> {
        Ok(())
    }

    /// Called on a comparator next to a block whose output changed
    fn on_comparator_update(
        &self,
        _world: &mut dyn WorldAccess,
        _pos: BlockPos,
        _source: BlockPos,
    ) -> CaptureResult<()> {
        Ok(())
    }

    /// Scheduled or random block tick
    fn on_scheduled_tick(
        &self,
        _world: &mut dyn WorldAccess,
        _pos: BlockPos,
        _state: &BlockState,
    ) -> CaptureResult<()> {
        Ok(())
    }

    /// Tile-entity tick
    fn on_tile_entity_tick(
        &self,
        _world: &mut dyn WorldAccess,
        _pos: BlockPos,
        _state: &BlockState,
    ) -> CaptureResult<()> {
        Ok(())
    }
}

/// Game logic and spawn capabilities of one entity
pub trait EntityBehavior {
    /// Per-tick update
    fn on_update(&self, _world: &mut dyn WorldAccess, _entity: EntityId) -> CaptureResult<()> {
        Ok(())
    }

    /// Contextual spawn pre-check; `false` rejects the spawn
    fn admit_spawn(&self, _entity: &Entity, _cause: &CauseChain) -> bool {
        true
    }

    /// Whether the entity needs a solid block at its anchor
    fn requires_valid_surface(&self) -> bool {
        false
    }

    /// Special construction run once before the first spawn attempt
    fn on_construct(&self, _entity: &mut Entity) {}
}

/// Synchronous event listener
///
/// Listeners may cancel the event or edit it in place before returning.
pub trait EventListener {
    /// Handle one event
    fn handle(&self, event: &mut WorldEvent<'_>);
}

impl<F> EventListener for F
where
    F: Fn(&mut WorldEvent<'_>),
{
    fn handle(&self, event: &mut WorldEvent<'_>) {
        self(event)
    }
}

/// The world surface handed to block and entity behaviors
///
/// Writes and spawns made through it re-enter the mediator and are captured
/// like any other engine mutation.
pub trait WorldAccess {
    /// Identity of this world
    fn world_id(&self) -> WorldId;

    /// State at `pos`, including not-yet-committed batch overlays
    fn block_state(&self, pos: BlockPos) -> BlockState;

    /// Write a block through the capture path
    fn set_block_state(
        &mut self,
        pos: BlockPos,
        state: BlockState,
        flags: UpdateFlags,
    ) -> CaptureResult<bool>;

    /// Spawn an entity through spawn admission
    fn spawn_entity(&mut self, entity: Entity, cause: CauseChain) -> CaptureResult<bool>;

    /// Live entity
    fn entity(&self, id: EntityId) -> Option<&Entity>;

    /// Mutable live entity
    fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity>;

    /// Queue a facing override applied right after the entity's update
    fn add_entity_rotation_update(&mut self, id: EntityId, rotation: Rotation);

    /// Block currently being ticked or committed
    fn current_tick_block(&self) -> Option<&BlockSnapshot>;

    /// Notify the six neighbours of `pos` that `source` changed
    fn notify_neighbors_of_state_change(&mut self, pos: BlockPos, source: &BlockType) -> CaptureResult<()>;
}
