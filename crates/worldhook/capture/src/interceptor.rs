//! Block-write interception and tick-unit hook points
//!
//! Every engine block write goes through [`WorldMediator::set_block_state`].
//! Inside a capture scope the pre-write state is snapshotted, classified and
//! buffered; the write's secondary effects are deferred to the drain pass at
//! the end of the tick unit.
//!
//! Tick units (block ticks, entity and tile-entity updates, player actions,
//! commands, spawner runs, populator passes) are entered through the hook
//! points below. Each one scopes the tick context, runs the engine logic and
//! drains the captures with a cause naming what was ticked.

use crate::classify::classify;
use crate::context::{PlayerAction, PlayerActionKind, TickingTile};
use crate::errors::{CaptureError, CaptureResult};
use crate::events::{Cancellable, MoveEntityEvent, WorldEvent};
use crate::mediator::WorldMediator;
use crate::traits::{TrackerKind, WorldStorage};
use tracing::{debug, trace};
use worldhook_types::{
    BlockPos, BlockSnapshot, BlockState, CaptureType, CauseChain, CauseValue, EntityId,
    PopulatorKind, Transaction, UpdateFlags, UserId, Vec3,
};

/// Where a captured write was buffered, so a failed raw write can undo it
enum Captured {
    Block,
    Populator {
        kind: PopulatorKind,
        position: BlockPos,
        replaced: Option<Transaction<BlockSnapshot>>,
    },
}

impl<S: WorldStorage> WorldMediator<S> {
    // =========================================================================
    // Block writes
    // =========================================================================

    /// Intercepted engine block write
    ///
    /// Returns `Ok(false)` when the write is rejected (position outside the
    /// world, debug world, identical state) or the raw write fails.
    pub fn set_block_state(
        &mut self,
        pos: BlockPos,
        state: BlockState,
        flags: UpdateFlags,
    ) -> CaptureResult<bool> {
        if !pos.is_valid() {
            return Ok(false);
        }
        if self.config.authoritative && self.config.is_debug_world() {
            return Ok(false);
        }

        let current = self.storage.block_state(pos);
        if current == state {
            return Ok(false);
        }

        let captured = if self.should_capture_write() {
            Some(self.capture_write(pos, &current, &state, flags))
        } else {
            None
        };

        let Some(previous) = self.storage.write_block_state_raw(pos, state.clone()) else {
            if let Some(captured) = captured {
                self.undo_capture(captured);
            }
            trace!(position = %pos, "Raw block write failed");
            return Ok(false);
        };

        if self.storage.light_properties(&previous) != self.storage.light_properties(&state) {
            self.storage.recheck_light(pos);
        }

        if let Some(cause) = self.context.plugin_cause.clone() {
            self.handle_block_captures(cause)?;
        } else if captured.is_none() {
            self.mark_and_notify_neighbors(pos, &previous, &state, flags)?;
        }
        Ok(true)
    }

    fn should_capture_write(&self) -> bool {
        let ctx = &self.context;
        if !self.config.authoritative || ctx.bypasses_capture() {
            return false;
        }
        if ctx.capture_terrain_gen {
            ctx.running_populator.is_some()
        } else {
            !ctx.preparing_chunks
        }
    }

    fn capture_write(
        &mut self,
        pos: BlockPos,
        current: &BlockState,
        state: &BlockState,
        flags: UpdateFlags,
    ) -> Captured {
        let capture_type = classify(
            current,
            state,
            self.context.running_populator.is_some(),
            self.context.capture_block_decay,
        );
        let original = self
            .create_block_snapshot(current.clone(), pos, flags)
            .with_capture_type(capture_type);
        let transaction = Transaction::new(original.clone(), original.with_state(state.clone()));
        trace!(position = %pos, capture_type = %capture_type, "Block write captured");

        match (capture_type, self.context.running_populator.clone()) {
            (CaptureType::Populate, Some(kind)) => {
                let replaced = self.buffers.populator_mut(&kind).insert(transaction);
                Captured::Populator {
                    kind,
                    position: pos,
                    replaced,
                }
            }
            _ => {
                self.buffers.blocks.push(transaction);
                Captured::Block
            }
        }
    }

    fn undo_capture(&mut self, captured: Captured) {
        match captured {
            Captured::Block => {
                self.buffers.blocks.pop();
            }
            Captured::Populator {
                kind,
                position,
                replaced,
            } => self.buffers.populator_mut(&kind).undo_insert(position, replaced),
        }
    }

    /// Explicit plugin API block write
    ///
    /// The cause root must be a plugin and the position must lie inside the
    /// world; both are checked before anything is written. Captures made by
    /// the write are dispatched before this returns.
    pub fn set_block(
        &mut self,
        pos: BlockPos,
        state: BlockState,
        notify_neighbors: bool,
        cause: CauseChain,
    ) -> CaptureResult<bool> {
        if !cause.root().is_plugin() {
            return Err(CaptureError::PluginCauseRequired {
                found: cause.root().to_string(),
            });
        }
        if !pos.is_valid() {
            return Err(CaptureError::PositionOutOfBounds { position: pos });
        }
        self.begin_tick_unit()?;

        let flags = if notify_neighbors {
            UpdateFlags::all()
        } else {
            UpdateFlags::clients_only()
        };
        self.scoped(
            |ctx| ctx.plugin_cause = Some(cause),
            |world| world.set_block_state(pos, state, flags),
        )
    }

    // =========================================================================
    // Snapshot API
    // =========================================================================

    /// Snapshot of the block at `pos`
    pub fn create_snapshot(&self, pos: BlockPos) -> BlockSnapshot {
        self.create_block_snapshot(self.storage.block_state(pos), pos, UpdateFlags::none())
    }

    /// Write a snapshot back into the world without capturing it
    ///
    /// Without `force`, the restore only happens if the block type at the
    /// position still matches the snapshot's.
    pub fn restore_snapshot(
        &mut self,
        snapshot: &BlockSnapshot,
        force: bool,
        notify_neighbors: bool,
    ) -> CaptureResult<bool> {
        let pos = snapshot.position();
        if !force && self.storage.block_state(pos).block() != snapshot.state().block() {
            return Ok(false);
        }
        let flags = if notify_neighbors {
            UpdateFlags::all()
        } else {
            UpdateFlags::clients_only()
        };

        self.scoped(
            |ctx| {
                ctx.restoring_blocks = true;
                ctx.plugin_cause = None;
            },
            |world| {
                world.set_block_state(pos, snapshot.state().clone(), flags)?;
                world.storage.mark_block_for_update(pos);
                if let Some(data) = snapshot.tile_data() {
                    world.storage.restore_tile_data(pos, Some(data.clone()));
                }
                Ok(true)
            },
        )
    }

    /// User who owns (placed) the block at `pos`
    pub fn creator(&self, pos: BlockPos) -> Option<UserId> {
        self.tracking.tracked(pos, TrackerKind::Owner)
    }

    /// User who last caused an update of the block at `pos`
    pub fn notifier(&self, pos: BlockPos) -> Option<UserId> {
        self.tracking.tracked(pos, TrackerKind::Notifier)
    }

    /// Set or clear the owner of the block at `pos`
    pub fn set_creator(&mut self, pos: BlockPos, user: Option<UserId>) {
        self.tracking.track(pos, TrackerKind::Owner, user);
    }

    /// Set or clear the notifier of the block at `pos`
    pub fn set_notifier(&mut self, pos: BlockPos, user: Option<UserId>) {
        self.tracking.track(pos, TrackerKind::Notifier, user);
    }

    // =========================================================================
    // Tick-unit hook points
    // =========================================================================

    /// Scheduled (or, with `random`, random) tick of the block at `pos`
    pub fn tick_block(&mut self, pos: BlockPos, random: bool) -> CaptureResult<()> {
        let state = self.storage.block_state(pos);
        let behavior = self.blocks.behavior(state.block());
        let ctx = &self.context;
        if !self.config.authoritative
            || ctx.processing_capture_cause
            || ctx.current_tick_block.is_some()
            || ctx.capture_terrain_gen
        {
            return behavior.on_scheduled_tick(self, pos, &state);
        }
        self.begin_tick_unit()?;

        let snapshot = self.create_block_snapshot(state.clone(), pos, UpdateFlags::none());
        let cause = CauseChain::source(CauseValue::block(snapshot.clone()));
        self.scoped(
            |ctx| {
                ctx.processing_capture_cause = true;
                ctx.current_tick_block = Some(snapshot);
                ctx.processing_block_random_ticks = random;
            },
            |world| {
                behavior.on_scheduled_tick(world, pos, &state)?;
                world.handle_post_tick_captures(cause)
            },
        )
    }

    /// Per-tick update of one live entity
    pub fn tick_entity(&mut self, id: EntityId) -> CaptureResult<()> {
        let entity = self.entities.by_id(id).ok_or(CaptureError::EntityNotFound(id))?;
        let behavior = entity.behavior();
        let from = entity.position;
        let cause = CauseChain::source(entity.cause_value());

        if !self.config.authoritative || self.context.processing_capture_cause {
            return match behavior {
                Some(behavior) => behavior.on_update(self, id),
                None => Ok(()),
            };
        }
        self.begin_tick_unit()?;

        self.scoped(
            |ctx| {
                ctx.processing_capture_cause = true;
                ctx.current_tick_entity = Some(id);
            },
            |world| {
                if let Some(behavior) = &behavior {
                    behavior.on_update(world, id)?;
                }
                world.update_rotation(id);
                world.handle_entity_movement(id, from, &cause);
                world.handle_post_tick_captures(cause)
            },
        )
    }

    fn update_rotation(&mut self, id: EntityId) {
        let Some(rotation) = self.rotation_updates.remove(&id) else {
            return;
        };
        if let Some(entity) = self.entities.by_id_mut(id) {
            entity.rotation = rotation;
        }
    }

    fn handle_entity_movement(&mut self, id: EntityId, from: Vec3, cause: &CauseChain) {
        let Some(to) = self.entities.by_id(id).map(|e| e.position) else {
            return;
        };
        if to == from {
            return;
        }

        let mut event = MoveEntityEvent::new(cause.clone(), id, from, to);
        self.events.post(WorldEvent::MoveEntity(&mut event));
        if let Some(entity) = self.entities.by_id_mut(id) {
            entity.position = if event.is_cancelled() { from } else { event.to };
        }
    }

    /// Update of the tile entity at `pos`
    pub fn tick_tile_entity(&mut self, pos: BlockPos) -> CaptureResult<()> {
        let state = self.storage.block_state(pos);
        let behavior = self.blocks.behavior(state.block());
        if !self.config.authoritative || self.context.processing_capture_cause {
            return behavior.on_tile_entity_tick(self, pos, &state);
        }
        self.begin_tick_unit()?;

        let tile = TickingTile {
            position: pos,
            block: state.block().clone(),
        };
        let cause = CauseChain::source(CauseValue::TileEntity {
            position: pos,
            block: state.block().clone(),
        });
        self.scoped(
            |ctx| {
                ctx.processing_capture_cause = true;
                ctx.current_tick_tile_entity = Some(tile);
            },
            |world| {
                behavior.on_tile_entity_tick(world, pos, &state)?;
                world.handle_post_tick_captures(cause)
            },
        )
    }

    /// Process one action of a connected player
    ///
    /// Everything `body` captures is attributed to the player.
    pub fn process_player_action<T>(
        &mut self,
        action: PlayerAction,
        body: impl FnOnce(&mut Self) -> CaptureResult<T>,
    ) -> CaptureResult<T> {
        if !self.config.authoritative {
            return body(self);
        }
        self.begin_tick_unit()?;

        let cause = CauseChain::source(CauseValue::Player(action.user));
        debug!(user = %action.user, action = ?action.kind, "Processing player action");
        self.scoped(
            |ctx| {
                ctx.processing_capture_cause = true;
                ctx.player_action = Some(action);
            },
            |world| {
                let output = body(world)?;
                world.handle_post_tick_captures(cause)?;
                Ok(output)
            },
        )
    }

    /// Run a command on behalf of `source`
    pub fn run_command<T>(
        &mut self,
        source: CauseValue,
        body: impl FnOnce(&mut Self) -> CaptureResult<T>,
    ) -> CaptureResult<T> {
        if !self.config.authoritative {
            return body(self);
        }
        self.begin_tick_unit()?;

        let player_action = match &source {
            CauseValue::Player(user) => Some(PlayerAction {
                user: *user,
                kind: PlayerActionKind::Command,
            }),
            _ => None,
        };
        let cause = CauseChain::source(source);
        self.scoped(
            |ctx| {
                ctx.processing_capture_cause = true;
                ctx.capture_command = true;
                if player_action.is_some() {
                    ctx.player_action = player_action;
                }
            },
            |world| {
                let output = body(world)?;
                world.handle_post_tick_captures(cause)?;
                Ok(output)
            },
        )
    }

    /// Run `body` with block-decay capture (air writes are tagged DECAY)
    pub fn with_block_decay<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> CaptureResult<T>,
    ) -> CaptureResult<T> {
        self.scoped(|ctx| ctx.capture_block_decay = true, body)
    }

    /// Run `body` spawning death drops directly into the world
    pub fn with_death_drops<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> CaptureResult<T>,
    ) -> CaptureResult<T> {
        self.scoped(|ctx| ctx.spawning_death_drops = true, body)
    }

    /// Run the natural world spawner
    ///
    /// Block writes bypass capture; spawned entities are dispatched as one
    /// spawner event at the end.
    pub fn with_world_spawner<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> CaptureResult<T>,
    ) -> CaptureResult<T> {
        self.begin_tick_unit()?;
        let cause = CauseChain::source(CauseValue::World(self.world_id()));
        self.scoped(
            |ctx| {
                ctx.processing_capture_cause = true;
                ctx.world_spawner_running = true;
            },
            |world| {
                let output = body(world)?;
                world.handle_post_tick_captures(cause)?;
                Ok(output)
            },
        )
    }

    /// Run the chunk-load spawner
    pub fn with_chunk_spawner<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> CaptureResult<T>,
    ) -> CaptureResult<T> {
        self.begin_tick_unit()?;
        let cause = CauseChain::source(CauseValue::World(self.world_id()));
        self.scoped(
            |ctx| {
                ctx.processing_capture_cause = true;
                ctx.chunk_spawner_running = true;
            },
            |world| {
                let output = body(world)?;
                world.handle_post_tick_captures(cause)?;
                Ok(output)
            },
        )
    }

    /// Run `body` while chunks are prepared; writes are not captured
    pub fn with_chunk_preparation<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> CaptureResult<T>,
    ) -> CaptureResult<T> {
        self.scoped(|ctx| ctx.preparing_chunks = true, body)
    }

    /// One world-generation populator pass
    ///
    /// Writes made by `body` are captured per position (last write wins) and
    /// dispatched as one populate event for `kind` when the pass ends.
    pub fn run_populator<T>(
        &mut self,
        kind: PopulatorKind,
        body: impl FnOnce(&mut Self) -> CaptureResult<T>,
    ) -> CaptureResult<T> {
        if !self.config.authoritative {
            return body(self);
        }
        self.begin_tick_unit()?;

        let running = kind.clone();
        self.scoped(
            |ctx| {
                ctx.capture_terrain_gen = true;
                ctx.running_populator = Some(running);
            },
            |world| {
                let output = body(world)?;
                world.handle_populator_captures(&kind)?;
                Ok(output)
            },
        )
    }
}
