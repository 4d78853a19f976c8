//! Per-tick capture context
//!
//! Every capture-mode flag and "currently ticking" reference lives in one
//! [`TickContext`] owned by the mediator. Tick units set it on entry and the
//! mediator restores the previous value on every exit path.

use worldhook_types::{BlockPos, BlockSnapshot, BlockType, CauseChain, EntityId, ItemStack, PopulatorKind, UserId};

/// What a connected player is doing while a tick unit runs
#[derive(Clone, Debug, PartialEq)]
pub enum PlayerActionKind {
    /// Digging (breaking) a block
    Dig,
    /// Placing a block from the held slot
    PlaceBlock {
        /// Inventory slot the item came from
        slot: u32,
        /// Held stack before the placement consumed it
        item_before: Option<ItemStack>,
    },
    /// Dropping (tossing) the held item
    DropItem {
        /// Inventory slot the item came from
        slot: u32,
        /// Held stack before the drop
        item_before: Option<ItemStack>,
    },
    /// Running a chat command
    Command,
}

/// A player action being processed
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerAction {
    /// Acting player
    pub user: UserId,
    /// Action
    pub kind: PlayerActionKind,
}

impl PlayerAction {
    /// A dig action
    pub fn dig(user: UserId) -> Self {
        Self {
            user,
            kind: PlayerActionKind::Dig,
        }
    }

    /// A block placement from `slot`
    pub fn place(user: UserId, slot: u32, item_before: Option<ItemStack>) -> Self {
        Self {
            user,
            kind: PlayerActionKind::PlaceBlock { slot, item_before },
        }
    }

    /// Whether this is a block placement
    pub fn is_placement(&self) -> bool {
        matches!(self.kind, PlayerActionKind::PlaceBlock { .. })
    }

    /// Whether this is a dig
    pub fn is_dig(&self) -> bool {
        matches!(self.kind, PlayerActionKind::Dig)
    }

    /// Whether the player is tossing the held item
    pub fn is_item_toss(&self) -> bool {
        matches!(self.kind, PlayerActionKind::DropItem { .. })
    }

    /// Inventory slot to re-send when the action is rolled back
    pub fn slot_before(&self) -> Option<(u32, &ItemStack)> {
        match &self.kind {
            PlayerActionKind::PlaceBlock { slot, item_before }
            | PlayerActionKind::DropItem { slot, item_before } => {
                item_before.as_ref().map(|item| (*slot, item))
            }
            PlayerActionKind::Dig | PlayerActionKind::Command => None,
        }
    }
}

/// Tile entity being ticked
#[derive(Clone, Debug, PartialEq)]
pub struct TickingTile {
    /// Position
    pub position: BlockPos,
    /// Hosting block type
    pub block: BlockType,
}

/// Capture modes and current-tick references of one mediator
#[derive(Clone, Debug, Default)]
pub struct TickContext {
    /// A tick unit is in flight; spawns are buffered
    pub processing_capture_cause: bool,
    /// Block being ticked or committed
    pub current_tick_block: Option<BlockSnapshot>,
    /// Entity being ticked
    pub current_tick_entity: Option<EntityId>,
    /// Tile entity being ticked
    pub current_tick_tile_entity: Option<TickingTile>,
    /// Terrain generation in progress
    pub capture_terrain_gen: bool,
    /// Populator whose writes are being captured
    pub running_populator: Option<PopulatorKind>,
    /// Block-decay capture mode
    pub capture_block_decay: bool,
    /// A command is running
    pub capture_command: bool,
    /// Snapshots are being restored; writes bypass capture
    pub restoring_blocks: bool,
    /// Death drops are spawned directly
    pub spawning_death_drops: bool,
    /// The natural world spawner is running
    pub world_spawner_running: bool,
    /// The chunk-load spawner is running
    pub chunk_spawner_running: bool,
    /// Random block ticks are running
    pub processing_block_random_ticks: bool,
    /// Chunks are being prepared; writes are not captured
    pub preparing_chunks: bool,
    /// Cause of an explicit plugin API call; captures drain synchronously
    pub plugin_cause: Option<CauseChain>,
    /// Player action being processed
    pub player_action: Option<PlayerAction>,
    /// Nesting depth of block-capture drains
    pub depth: u32,
}

impl TickContext {
    /// Whether raw writes bypass capture entirely
    pub fn bypasses_capture(&self) -> bool {
        self.restoring_blocks || self.world_spawner_running || self.chunk_spawner_running
    }

    /// Whether any tick unit is in flight
    pub fn in_tick_unit(&self) -> bool {
        self.processing_capture_cause
            || self.current_tick_block.is_some()
            || self.current_tick_entity.is_some()
            || self.current_tick_tile_entity.is_some()
            || self.capture_terrain_gen
            || self.plugin_cause.is_some()
            || self.depth > 0
    }

    /// User acting through the current player action
    pub fn acting_player(&self) -> Option<UserId> {
        self.player_action.as_ref().map(|action| action.user)
    }
}
