//! The world-tick mediator
//!
//! One [`WorldMediator`] owns the capture buffers, the tick context and the
//! event bus of one world. Host engines call its hook points (block writes,
//! entity and tile-entity updates, block ticks, spawns, populator passes);
//! block and entity behaviors re-enter it through [`WorldAccess`].
//!
//! The mediator is split across modules by concern:
//!
//! - `interceptor`: block-write interception and the tick-unit hook points
//! - `spawn`: entity-spawn admission
//! - `dispatch`: classification-grouped event dispatch and rollback
//! - `commit`: commit and secondary-effect propagation
//! - `weather`: weather transitions

use crate::buffers::CaptureBuffers;
use crate::context::TickContext;
use crate::entity::{Entity, EntityArena};
use crate::errors::{CaptureError, CaptureResult};
use crate::events::{EventBus, WorldEvent};
use crate::memory::{InMemoryTrackingStore, NullClientSink};
use crate::registry::BlockRegistry;
use crate::traits::{
    BlockBehavior, BlockView, ClientSink, TrackerKind, TrackingStore, WorldAccess, WorldStorage,
};
use crate::view::PendingView;
use crate::weather::WeatherClock;
use std::collections::HashMap;
use tracing::{debug, warn};
use worldhook_types::{
    BlockPos, BlockSnapshot, BlockState, BlockType, CaptureConfig, CauseChain, CauseValue,
    EntityId, Rotation, UpdateFlags, WorldId,
};

/// Capture-and-event mediator of one world
pub struct WorldMediator<S: WorldStorage> {
    pub(crate) config: CaptureConfig,
    pub(crate) storage: S,
    pub(crate) tracking: Box<dyn TrackingStore>,
    pub(crate) clients: Box<dyn ClientSink>,
    pub(crate) blocks: BlockRegistry,
    pub(crate) events: EventBus,
    pub(crate) entities: EntityArena,
    pub(crate) context: TickContext,
    pub(crate) buffers: CaptureBuffers,
    pub(crate) rotation_updates: HashMap<EntityId, Rotation>,
    pub(crate) pending_views: Vec<PendingView>,
    pub(crate) weather: WeatherClock,
}

impl<S: WorldStorage> WorldMediator<S> {
    /// Create a mediator over `storage`
    ///
    /// Fails with an invalid-configuration error when `config` does not
    /// validate.
    pub fn new(config: CaptureConfig, storage: S) -> CaptureResult<Self> {
        config.validate()?;

        debug!(
            world = %storage.world_id(),
            authoritative = config.authoritative,
            max_capture_depth = config.max_capture_depth,
            "World mediator created"
        );

        let events = EventBus::with_capacity(config.event_log_capacity);
        Ok(Self {
            config,
            storage,
            tracking: Box::new(InMemoryTrackingStore::new()),
            clients: Box::new(NullClientSink),
            blocks: BlockRegistry::new(),
            events,
            entities: EntityArena::new(),
            context: TickContext::default(),
            buffers: CaptureBuffers::new(),
            rotation_updates: HashMap::new(),
            pending_views: Vec::new(),
            weather: WeatherClock::default(),
        })
    }

    /// Replace the tracking store
    pub fn with_tracking(mut self, tracking: impl TrackingStore + 'static) -> Self {
        self.tracking = Box::new(tracking);
        self
    }

    /// Replace the client sink
    pub fn with_client_sink(mut self, clients: impl ClientSink + 'static) -> Self {
        self.clients = Box::new(clients);
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Identity of this world
    pub fn world_id(&self) -> WorldId {
        self.storage.world_id()
    }

    /// Capture configuration
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Underlying storage
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Underlying storage, for host-side setup outside tick units
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Ownership tracking
    pub fn tracking(&self) -> &dyn TrackingStore {
        self.tracking.as_ref()
    }

    /// Event bus
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Event bus, for registering listeners
    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Register a closure listener
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: Fn(&mut WorldEvent<'_>) + 'static,
    {
        self.events.subscribe(listener);
    }

    /// Register block game logic
    pub fn register_block(&mut self, block: impl Into<String>, behavior: impl BlockBehavior + 'static) {
        self.blocks.register(block, behavior);
    }

    /// Live entities
    pub fn entities(&self) -> &EntityArena {
        &self.entities
    }

    /// Pending captures
    pub fn buffers(&self) -> &CaptureBuffers {
        &self.buffers
    }

    /// Current tick context
    pub fn context(&self) -> &TickContext {
        &self.context
    }

    /// Insert an entity without admission, for host-side world setup
    pub fn insert_entity(&mut self, entity: Entity) -> EntityId {
        let id = entity.id;
        self.entities.insert(entity);
        id
    }

    // =========================================================================
    // Tick context scoping
    // =========================================================================

    /// Run `body` with a modified tick context
    ///
    /// The previous context is restored on every exit path. An error aborts
    /// the tick unit: pending captures are dropped before it propagates.
    pub(crate) fn scoped<T>(
        &mut self,
        apply: impl FnOnce(&mut TickContext),
        body: impl FnOnce(&mut Self) -> CaptureResult<T>,
    ) -> CaptureResult<T> {
        let saved = self.context.clone();
        apply(&mut self.context);
        let result = body(self);
        self.context = saved;
        if let Err(err) = &result {
            self.abort_tick_unit(err);
        }
        result
    }

    fn abort_tick_unit(&mut self, err: &CaptureError) {
        if !self.buffers.is_empty() || !self.pending_views.is_empty() {
            warn!(error = %err, "Tick unit aborted, dropping pending captures");
        }
        self.buffers.clear();
        self.pending_views.clear();
    }

    /// Drain captures left over from outside any tick unit
    ///
    /// Host writes made while no hook point is active are captured but have
    /// nobody to drain them; they are attributed to the world itself.
    pub fn flush_captures(&mut self) -> CaptureResult<()> {
        if self.buffers.is_empty() {
            return Ok(());
        }
        let cause = CauseChain::source(CauseValue::World(self.world_id()));
        self.scoped(
            |ctx| ctx.processing_capture_cause = true,
            |world| world.handle_post_tick_captures(cause),
        )
    }

    /// Called on entry of every top-level tick unit
    pub(crate) fn begin_tick_unit(&mut self) -> CaptureResult<()> {
        if self.context.in_tick_unit() || self.buffers.is_empty() {
            return Ok(());
        }
        warn!(
            blocks = self.buffers.blocks().len(),
            entities = self.buffers.entities().len() + self.buffers.entity_items().len(),
            "Captures leaked out of the previous tick unit, draining with world cause"
        );
        self.flush_captures()
    }

    /// Cause describing whatever is ticking right now
    pub(crate) fn ambient_cause(&self) -> CauseChain {
        let ctx = &self.context;
        let root = if let Some(block) = &ctx.current_tick_block {
            CauseValue::block(block.clone())
        } else if let Some(tile) = &ctx.current_tick_tile_entity {
            CauseValue::TileEntity {
                position: tile.position,
                block: tile.block.clone(),
            }
        } else if let Some(entity) = ctx.current_tick_entity.and_then(|id| self.entities.by_id(id)) {
            entity.cause_value()
        } else if let Some(user) = ctx.acting_player() {
            CauseValue::Player(user)
        } else {
            CauseValue::World(self.world_id())
        };
        let mut cause = CauseChain::source(root);
        if let Some(plugin) = &ctx.plugin_cause {
            cause = cause.merge(plugin);
        }
        cause
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// State at `pos` as seen through the pending views of batches being
    /// committed
    pub(crate) fn view_state(&self, pos: BlockPos) -> BlockState {
        let live = self.storage.block_state(pos);
        self.pending_views
            .iter()
            .rev()
            .find_map(|view| view.overlay(pos, &live))
            .unwrap_or(live)
    }

    /// Detached snapshot of `state` at `pos`
    pub(crate) fn create_block_snapshot(
        &self,
        state: BlockState,
        pos: BlockPos,
        flags: UpdateFlags,
    ) -> BlockSnapshot {
        let behavior = self.blocks.behavior(state.block());
        let extended = behavior.actual_state(&state, self, pos);
        let tile_data = if behavior.has_tile_entity(&state) {
            self.storage.tile_data(pos)
        } else {
            None
        };
        BlockSnapshot::builder(self.world_id(), pos, state)
            .extended_state(extended)
            .creator(self.tracking.tracked(pos, TrackerKind::Owner))
            .notifier(self.tracking.tracked(pos, TrackerKind::Notifier))
            .tile_data(tile_data)
            .update_flags(flags)
            .build()
    }
}

impl<S: WorldStorage> BlockView for WorldMediator<S> {
    fn view_block_state(&self, pos: BlockPos) -> BlockState {
        self.view_state(pos)
    }
}

impl<S: WorldStorage> WorldAccess for WorldMediator<S> {
    fn world_id(&self) -> WorldId {
        self.storage.world_id()
    }

    fn block_state(&self, pos: BlockPos) -> BlockState {
        self.view_state(pos)
    }

    fn set_block_state(
        &mut self,
        pos: BlockPos,
        state: BlockState,
        flags: UpdateFlags,
    ) -> CaptureResult<bool> {
        WorldMediator::set_block_state(self, pos, state, flags)
    }

    fn spawn_entity(&mut self, entity: Entity, cause: CauseChain) -> CaptureResult<bool> {
        WorldMediator::spawn_entity(self, entity, cause)
    }

    fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.by_id(id)
    }

    fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.by_id_mut(id)
    }

    fn add_entity_rotation_update(&mut self, id: EntityId, rotation: Rotation) {
        self.rotation_updates.insert(id, rotation);
    }

    fn current_tick_block(&self) -> Option<&BlockSnapshot> {
        self.context.current_tick_block.as_ref()
    }

    fn notify_neighbors_of_state_change(&mut self, pos: BlockPos, source: &BlockType) -> CaptureResult<()> {
        WorldMediator::notify_neighbors_of_state_change(self, pos, source)
    }
}
