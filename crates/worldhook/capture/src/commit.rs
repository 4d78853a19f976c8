//! Commit of accepted transactions and secondary-effect propagation
//!
//! Accepted transactions are already written to storage; committing them runs
//! the deferred side effects in capture order: block-added hooks, client
//! updates, neighbour notifications and comparator updates. Writes made by
//! those hooks are captured again and drained one level deeper.

use crate::errors::CaptureResult;
use crate::events::{NotifyNeighborEvent, WorldEvent};
use crate::mediator::WorldMediator;
use crate::traits::{TrackerKind, WorldStorage};
use crate::view::PendingView;
use tracing::{debug, info};
use worldhook_types::{
    BlockPos, BlockSnapshot, BlockState, BlockType, CaptureType, CauseChain, CauseValue,
    Direction, Transaction, UpdateFlags, UserId,
};

impl<S: WorldStorage> WorldMediator<S> {
    // =========================================================================
    // Batch commit
    // =========================================================================

    /// Commit one dispatched batch
    ///
    /// Game logic running during the commit sees the batch through a pending
    /// view: positions not yet committed still show their original state.
    pub(crate) fn mark_and_notify_block_post(
        &mut self,
        transactions: Vec<Transaction<BlockSnapshot>>,
        capture_type: CaptureType,
        cause: CauseChain,
    ) -> CaptureResult<()> {
        if transactions.is_empty() {
            return Ok(());
        }
        self.pending_views.push(PendingView::new(&transactions));
        let view_index = self.pending_views.len() - 1;

        let result = transactions
            .iter()
            .try_for_each(|tx| self.commit_transaction(tx, view_index, capture_type, &cause));

        self.pending_views.truncate(view_index);
        result
    }

    fn commit_transaction(
        &mut self,
        tx: &Transaction<BlockSnapshot>,
        view_index: usize,
        capture_type: CaptureType,
        cause: &CauseChain,
    ) -> CaptureResult<()> {
        if !tx.is_valid() {
            self.proceed_view(view_index);
            return Ok(());
        }
        if let Some(custom) = tx.custom() {
            self.restore_snapshot(custom, true, false)?;
        }

        let original = tx.original();
        let committed = tx.effective_final().clone();
        let pos = original.position();
        let new_state = committed.state().clone();

        if self.config.log_block_actions {
            info!(
                position = %pos,
                capture_type = %capture_type,
                from = %original.state(),
                to = %new_state,
                cause = %cause.root(),
                "Block committed"
            );
        }

        let behavior = self.blocks.behavior(new_state.block());
        let runs_added_hook = !behavior.has_tile_entity(&new_state);
        let chained = if runs_added_hook && self.should_chain_cause(cause, &committed) {
            cause.prepend_source(CauseValue::block(committed.clone()))
        } else {
            cause.clone()
        };

        let old_state = original.state().clone();
        let flags = original.update_flags();
        self.scoped(
            |ctx| {
                if runs_added_hook {
                    ctx.current_tick_block = Some(committed);
                }
            },
            |world| {
                if runs_added_hook {
                    behavior.on_block_added(world, pos, &new_state)?;
                }
                world.proceed_view(view_index);
                world.mark_and_notify_neighbors(pos, &old_state, &new_state, flags)?;
                if !world.buffers.blocks.is_empty() && world.context.plugin_cause.is_none() {
                    world.handle_post_tick_captures(chained)?;
                }
                Ok(())
            },
        )
    }

    fn proceed_view(&mut self, view_index: usize) {
        if let Some(view) = self.pending_views.get_mut(view_index) {
            view.proceed();
        }
    }

    /// Whether nested captures of a committed block name that block as source
    fn should_chain_cause(&self, cause: &CauseChain, committed: &BlockSnapshot) -> bool {
        let ctx = &self.context;
        if ctx.capture_terrain_gen
            || ctx.world_spawner_running
            || ctx.chunk_spawner_running
            || ctx.processing_block_random_ticks
            || ctx.capture_command
        {
            return false;
        }
        !cause.contains(&CauseValue::block(committed.clone()))
    }

    // =========================================================================
    // Secondary effects
    // =========================================================================

    /// Client update, neighbour notification and comparator update of one
    /// committed write
    pub(crate) fn mark_and_notify_neighbors(
        &mut self,
        pos: BlockPos,
        old: &BlockState,
        new: &BlockState,
        flags: UpdateFlags,
    ) -> CaptureResult<()> {
        if flags.send_to_clients() && self.storage.is_chunk_populated(pos.chunk()) {
            self.storage.mark_block_for_update(pos);
        }
        if !self.config.authoritative || !flags.notify_neighbors() {
            return Ok(());
        }

        self.notify_neighbors_of_state_change(pos, old.block())?;
        if self.blocks.behavior(new.block()).has_comparator_input_override() {
            self.update_comparator_output_level(pos)?;
        }
        Ok(())
    }

    /// Notify the six neighbours of `pos` that the block there changed
    ///
    /// A neighbour-notify event is fired first when enabled; listeners may
    /// cancel it or drop directions.
    pub fn notify_neighbors_of_state_change(
        &mut self,
        pos: BlockPos,
        source: &BlockType,
    ) -> CaptureResult<()> {
        let mut directions = Direction::ALL.to_vec();
        if self.config.authoritative && self.config.fire_neighbor_events {
            let mut event =
                NotifyNeighborEvent::new(self.ambient_cause(), self.world_id(), pos, directions);
            if self.events.post(WorldEvent::NotifyNeighbor(&mut event)) {
                debug!(position = %pos, "Neighbour notification cancelled");
                return Ok(());
            }
            directions = event.directions;
        }

        for direction in directions {
            self.notify_block_of_state_change(pos.offset(direction), source)?;
        }
        Ok(())
    }

    fn notify_block_of_state_change(&mut self, target: BlockPos, source: &BlockType) -> CaptureResult<()> {
        if !target.is_valid() {
            return Ok(());
        }
        let state = self.view_state(target);
        if self.config.authoritative && !self.context.restoring_blocks && !state.is_air() {
            if let Some(user) = self.notifying_user() {
                self.tracking.track(target, TrackerKind::Notifier, Some(user));
            }
        }
        let behavior = self.blocks.behavior(state.block());
        behavior.on_neighbor_changed(self, target, &state, source)
    }

    /// User to record as notifier of blocks updated right now
    fn notifying_user(&self) -> Option<UserId> {
        let ctx = &self.context;
        if let Some(user) = ctx.acting_player() {
            return Some(user);
        }
        if let Some(block) = &ctx.current_tick_block {
            let source = block.position();
            return self
                .tracking
                .tracked(source, TrackerKind::Notifier)
                .or_else(|| self.tracking.tracked(source, TrackerKind::Owner));
        }
        if let Some(tile) = &ctx.current_tick_tile_entity {
            return self
                .tracking
                .tracked(tile.position, TrackerKind::Notifier)
                .or_else(|| self.tracking.tracked(tile.position, TrackerKind::Owner));
        }
        let entity = ctx.current_tick_entity.and_then(|id| self.entities.by_id(id))?;
        entity.notifier.or(entity.creator)
    }

    fn update_comparator_output_level(&mut self, pos: BlockPos) -> CaptureResult<()> {
        for direction in Direction::HORIZONTAL {
            let target = pos.offset(direction);
            if !self.storage.is_chunk_loaded(target.chunk()) {
                continue;
            }
            let state = self.view_state(target);
            let behavior = self.blocks.behavior(state.block());
            behavior.on_comparator_update(self, target, pos)?;
        }
        Ok(())
    }
}
