//! In-memory collaborators
//!
//! Used by tests and the simulator to drive a mediator without a host engine.

use crate::traits::{ClientSink, TrackerKind, TrackingStore, WorldStorage};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use worldhook_types::{
    Blob, BlockPos, BlockState, BlockType, ChunkPos, ItemStack, LightProperties, UserId, WorldId,
};

/// A sparse block world held in memory
///
/// Unset positions read as air. Every chunk is loaded and populated unless
/// configured otherwise.
pub struct InMemoryWorld {
    world_id: WorldId,
    blocks: HashMap<BlockPos, BlockState>,
    tiles: HashMap<BlockPos, Blob>,
    light: HashMap<BlockType, LightProperties>,
    unloaded_chunks: HashSet<ChunkPos>,
    unpopulated_chunks: HashSet<ChunkPos>,
    failing_writes: HashSet<BlockPos>,
    light_rechecks: Vec<BlockPos>,
    client_updates: Vec<BlockPos>,
    raw_writes: usize,
}

impl InMemoryWorld {
    /// Create an empty world
    pub fn new() -> Self {
        Self {
            world_id: WorldId::generate(),
            blocks: HashMap::new(),
            tiles: HashMap::new(),
            light: HashMap::new(),
            unloaded_chunks: HashSet::new(),
            unpopulated_chunks: HashSet::new(),
            failing_writes: HashSet::new(),
            light_rechecks: Vec::new(),
            client_updates: Vec::new(),
            raw_writes: 0,
        }
    }

    /// Builder-style block placement, bypassing everything
    pub fn with_block(mut self, pos: BlockPos, state: BlockState) -> Self {
        self.put(pos, state);
        self
    }

    /// Place a block directly, bypassing everything
    pub fn put(&mut self, pos: BlockPos, state: BlockState) {
        if state.is_air() {
            self.blocks.remove(&pos);
        } else {
            self.blocks.insert(pos, state);
        }
    }

    /// Attach tile-entity data directly
    pub fn put_tile(&mut self, pos: BlockPos, data: Blob) {
        self.tiles.insert(pos, data);
    }

    /// Register light properties for a block type
    pub fn set_light(&mut self, block: impl Into<String>, light: LightProperties) {
        self.light.insert(BlockType::new(block), light);
    }

    /// Make raw writes at `pos` report failure
    pub fn fail_writes_at(&mut self, pos: BlockPos) {
        self.failing_writes.insert(pos);
    }

    /// Mark a chunk as not loaded
    pub fn unload_chunk(&mut self, chunk: ChunkPos) {
        self.unloaded_chunks.insert(chunk);
    }

    /// Mark a chunk as not yet populated
    pub fn set_unpopulated(&mut self, chunk: ChunkPos) {
        self.unpopulated_chunks.insert(chunk);
    }

    /// Positions whose lighting was rechecked, in order
    pub fn light_rechecks(&self) -> &[BlockPos] {
        &self.light_rechecks
    }

    /// Positions marked for client update, in order
    pub fn client_updates(&self) -> &[BlockPos] {
        &self.client_updates
    }

    /// Number of successful raw writes
    pub fn raw_writes(&self) -> usize {
        self.raw_writes
    }

    /// Non-air blocks
    pub fn blocks(&self) -> impl Iterator<Item = (&BlockPos, &BlockState)> {
        self.blocks.iter()
    }
}

impl Default for InMemoryWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldStorage for InMemoryWorld {
    fn world_id(&self) -> WorldId {
        self.world_id
    }

    fn block_state(&self, pos: BlockPos) -> BlockState {
        self.blocks.get(&pos).cloned().unwrap_or_else(BlockState::air)
    }

    fn write_block_state_raw(&mut self, pos: BlockPos, state: BlockState) -> Option<BlockState> {
        if self.failing_writes.contains(&pos) {
            return None;
        }
        let previous = self.block_state(pos);
        if previous.block() != state.block() {
            self.tiles.remove(&pos);
        }
        self.put(pos, state);
        self.raw_writes += 1;
        Some(previous)
    }

    fn light_properties(&self, state: &BlockState) -> LightProperties {
        if state.is_air() {
            return LightProperties::new(0, 0);
        }
        self.light
            .get(state.block())
            .copied()
            .unwrap_or(LightProperties::new(15, 0))
    }

    fn recheck_light(&mut self, pos: BlockPos) {
        self.light_rechecks.push(pos);
    }

    fn tile_data(&self, pos: BlockPos) -> Option<Blob> {
        self.tiles.get(&pos).cloned()
    }

    fn restore_tile_data(&mut self, pos: BlockPos, data: Option<Blob>) {
        match data {
            Some(data) => {
                self.tiles.insert(pos, data);
            }
            None => {
                self.tiles.remove(&pos);
            }
        }
    }

    fn is_chunk_loaded(&self, chunk: ChunkPos) -> bool {
        !self.unloaded_chunks.contains(&chunk)
    }

    fn is_chunk_populated(&self, chunk: ChunkPos) -> bool {
        !self.unpopulated_chunks.contains(&chunk)
    }

    fn mark_block_for_update(&mut self, pos: BlockPos) {
        self.client_updates.push(pos);
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct TrackedUsers {
    owner: Option<UserId>,
    notifier: Option<UserId>,
}

/// Per-chunk ownership tracking held in memory
#[derive(Debug, Default)]
pub struct InMemoryTrackingStore {
    chunks: HashMap<ChunkPos, HashMap<BlockPos, TrackedUsers>>,
}

impl InMemoryTrackingStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked positions
    pub fn len(&self) -> usize {
        self.chunks.values().map(HashMap::len).sum()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrackingStore for InMemoryTrackingStore {
    fn tracked(&self, pos: BlockPos, kind: TrackerKind) -> Option<UserId> {
        let users = self.chunks.get(&pos.chunk())?.get(&pos)?;
        match kind {
            TrackerKind::Owner => users.owner,
            TrackerKind::Notifier => users.notifier,
        }
    }

    fn track(&mut self, pos: BlockPos, kind: TrackerKind, user: Option<UserId>) {
        let chunk = self.chunks.entry(pos.chunk()).or_default();
        let users = chunk.entry(pos).or_default();
        match kind {
            TrackerKind::Owner => users.owner = user,
            TrackerKind::Notifier => users.notifier = user,
        }
        if users.owner.is_none() && users.notifier.is_none() {
            chunk.remove(&pos);
        }
    }
}

/// Tracking store shared between a mediator and an observer
impl<T: TrackingStore> TrackingStore for Rc<RefCell<T>> {
    fn tracked(&self, pos: BlockPos, kind: TrackerKind) -> Option<UserId> {
        self.borrow().tracked(pos, kind)
    }

    fn track(&mut self, pos: BlockPos, kind: TrackerKind, user: Option<UserId>) {
        self.borrow_mut().track(pos, kind, user)
    }
}

/// A message re-sent to one client
#[derive(Clone, Debug, PartialEq)]
pub enum ClientMessage {
    /// Authoritative block state
    BlockChange {
        /// Recipient
        user: UserId,
        /// Block position
        pos: BlockPos,
        /// State sent
        state: BlockState,
    },
    /// Tile-entity description
    TileDescription {
        /// Recipient
        user: UserId,
        /// Block position
        pos: BlockPos,
    },
    /// Inventory slot contents
    InventorySlot {
        /// Recipient
        user: UserId,
        /// Slot number
        slot: u32,
        /// Stack sent
        item: ItemStack,
    },
}

/// Client sink for worlds without connected users
#[derive(Clone, Copy, Debug, Default)]
pub struct NullClientSink;

impl ClientSink for NullClientSink {
    fn send_block_change(&mut self, _user: UserId, _pos: BlockPos, _state: &BlockState) {}

    fn send_tile_description(&mut self, _user: UserId, _pos: BlockPos, _data: &Blob) {}

    fn send_inventory_slot(&mut self, _user: UserId, _slot: u32, _item: &ItemStack) {}
}

/// Client sink that records every message
///
/// Clones share the same log, so a test can keep one clone while the
/// mediator owns another.
#[derive(Clone, Debug, Default)]
pub struct RecordingClientSink {
    messages: Rc<RefCell<Vec<ClientMessage>>>,
}

impl RecordingClientSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far
    pub fn messages(&self) -> Vec<ClientMessage> {
        self.messages.borrow().clone()
    }
}

impl ClientSink for RecordingClientSink {
    fn send_block_change(&mut self, user: UserId, pos: BlockPos, state: &BlockState) {
        self.messages.borrow_mut().push(ClientMessage::BlockChange {
            user,
            pos,
            state: state.clone(),
        });
    }

    fn send_tile_description(&mut self, user: UserId, pos: BlockPos, _data: &Blob) {
        self.messages
            .borrow_mut()
            .push(ClientMessage::TileDescription { user, pos });
    }

    fn send_inventory_slot(&mut self, user: UserId, slot: u32, item: &ItemStack) {
        self.messages.borrow_mut().push(ClientMessage::InventorySlot {
            user,
            slot,
            item: item.clone(),
        });
    }
}
