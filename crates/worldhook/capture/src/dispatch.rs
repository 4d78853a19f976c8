//! Drain pass: classification-grouped event dispatch and rollback
//!
//! At the end of a tick unit the block buffer is drained into one aggregate
//! event per capture tag, always in the order break, modify, place. When
//! more than one of them fired, a combined post event over every drained
//! transaction follows; cancelling it rolls the whole pass back. Decay is
//! dispatched last, outside the post gate. Captured items and entities are
//! dispatched after the blocks.

use crate::entity::Entity;
use crate::errors::{CaptureError, CaptureResult};
use crate::events::{ChangeBlockEvent, ChangeBlockKind, SpawnEntityEvent, SpawnKind, WorldEvent};
use crate::mediator::WorldMediator;
use crate::traits::{TrackerKind, WorldStorage};
use tracing::{debug, error, info};
use worldhook_types::{
    BlockPos, BlockSnapshot, CaptureType, CauseChain, CauseValue, NamedCause, PopulatorKind,
    Transaction, UpdateFlags, UserId,
};

/// Transactions of one drain pass, in capture order
struct DrainPass {
    transactions: Vec<Transaction<BlockSnapshot>>,
    restored: Vec<bool>,
}

impl DrainPass {
    fn new(transactions: Vec<Transaction<BlockSnapshot>>) -> Self {
        let restored = vec![false; transactions.len()];
        Self {
            transactions,
            restored,
        }
    }

    fn all(&self) -> Vec<usize> {
        (0..self.transactions.len()).collect()
    }

    fn tagged(&self, tag: CaptureType) -> Vec<usize> {
        self.transactions
            .iter()
            .enumerate()
            .filter(|(_, tx)| tx.original().capture_type() == Some(tag))
            .map(|(i, _)| i)
            .collect()
    }

    fn select(&self, indices: &[usize]) -> Vec<Transaction<BlockSnapshot>> {
        indices.iter().map(|&i| self.transactions[i].clone()).collect()
    }

    /// Whether an earlier-captured transaction at the same position was restored
    ///
    /// The restore brought back the state from before that write, so this
    /// transaction's final state no longer exists in storage.
    fn superseded(&self, i: usize) -> bool {
        let pos = self.transactions[i].original().position();
        self.transactions[..i]
            .iter()
            .zip(&self.restored)
            .any(|(tx, &restored)| restored && tx.original().position() == pos)
    }

    /// Copy listener edits back into the pass
    fn write_back(&mut self, indices: &[usize], edited: Vec<Transaction<BlockSnapshot>>) {
        for (&i, transaction) in indices.iter().zip(edited) {
            self.transactions[i] = transaction;
        }
    }
}

/// One aggregate event of the pass and its verdict
struct FiredEvent {
    tag: CaptureType,
    indices: Vec<usize>,
    cancelled: bool,
}

/// Name under which a fired aggregate event joins the post cause
fn event_cause_name(tag: CaptureType) -> &'static str {
    match tag {
        CaptureType::Break => "BreakEvent",
        CaptureType::Modify => "ModifyEvent",
        CaptureType::Place => "PlaceEvent",
        CaptureType::Decay => "DecayEvent",
        CaptureType::Populate => "PopulateEvent",
    }
}

fn change_block_kind(tag: CaptureType) -> ChangeBlockKind {
    ChangeBlockKind::for_capture(tag).unwrap_or(ChangeBlockKind::Post)
}

impl<S: WorldStorage> WorldMediator<S> {
    // =========================================================================
    // End of tick unit
    // =========================================================================

    /// Drain everything captured during the tick unit
    pub(crate) fn handle_post_tick_captures(&mut self, cause: CauseChain) -> CaptureResult<()> {
        if !self.config.authoritative || self.context.restoring_blocks || self.buffers.is_empty() {
            return Ok(());
        }

        let cause = self.enrich_cause(cause);
        self.handle_block_captures(cause.clone())?;

        let tossing = self
            .context
            .player_action
            .as_ref()
            .map(|action| action.is_item_toss())
            .unwrap_or(false);
        if tossing {
            self.buffers.destruct_item_drop = false;
        }

        let leftover: Vec<PopulatorKind> = self
            .buffers
            .populators
            .iter()
            .map(|(kind, _)| kind.clone())
            .collect();
        for kind in leftover {
            self.handle_populator_captures(&kind)?;
        }

        if !self.buffers.entity_items.is_empty() {
            self.handle_dropped_items(&cause);
        }
        if !self.buffers.entities.is_empty() {
            self.handle_entity_spawns(&cause);
        }

        self.buffers.destruct_item_drop = false;
        self.buffers.invalid_transactions.clear();
        Ok(())
    }

    /// Add tracked users when the cause names none
    fn enrich_cause(&self, cause: CauseChain) -> CauseChain {
        if cause.first_user().is_some() {
            return cause;
        }
        let first_tag = self
            .buffers
            .blocks
            .first()
            .and_then(|tx| tx.original().capture_type());
        if first_tag == Some(CaptureType::Decay) {
            return cause;
        }

        let source = cause
            .first_block()
            .map(|block| block.position())
            .or_else(|| cause.first_tile_entity());
        if let Some(pos) = source {
            let mut cause = cause;
            if let Some(notifier) = self.tracking.tracked(pos, TrackerKind::Notifier) {
                if !cause.contains_named(NamedCause::NOTIFIER) {
                    cause = cause.with(NamedCause::NOTIFIER, CauseValue::User(notifier));
                }
            }
            if let Some(owner) = self.tracking.tracked(pos, TrackerKind::Owner) {
                if !cause.contains_named(NamedCause::OWNER) {
                    cause = cause.with(NamedCause::OWNER, CauseValue::User(owner));
                }
            }
            return cause;
        }

        match cause.first_entity() {
            Some((_, owner, creator)) if !cause.contains_named(NamedCause::OWNER) => {
                match owner.or(creator) {
                    Some(user) => cause.with(NamedCause::OWNER, CauseValue::User(user)),
                    None => cause,
                }
            }
            _ => cause,
        }
    }

    // =========================================================================
    // Block captures
    // =========================================================================

    /// Classify, dispatch and commit the captured block writes
    pub(crate) fn handle_block_captures(&mut self, cause: CauseChain) -> CaptureResult<()> {
        if self.buffers.blocks.is_empty() {
            return Ok(());
        }

        let depth = self.context.depth;
        if depth >= self.config.max_capture_depth {
            let position = self
                .buffers
                .blocks
                .first()
                .map(|tx| tx.original().position().to_string())
                .unwrap_or_default();
            error!(depth, position = %position, cause = %cause, "Capture recursion overflow");
            return Err(CaptureError::RecursionOverflow {
                depth,
                position,
                chain: cause.to_string(),
            });
        }

        self.scoped(
            |ctx| ctx.depth += 1,
            |world| world.dispatch_block_captures(cause),
        )
    }

    fn dispatch_block_captures(&mut self, cause: CauseChain) -> CaptureResult<()> {
        let captured = std::mem::take(&mut self.buffers.blocks);
        let drained = captured
            .into_iter()
            .map(|mut tx| {
                // Later writes in the same unit may have changed the block again.
                let pos = tx.original().position();
                let live = self.storage.block_state(pos);
                tx.set_final(self.create_block_snapshot(live, pos, UpdateFlags::none()));
                tx
            })
            .collect();
        let mut pass = DrainPass::new(drained);

        let mut fired = Vec::new();
        for tag in [CaptureType::Break, CaptureType::Modify, CaptureType::Place] {
            let indices = pass.tagged(tag);
            if indices.is_empty() {
                continue;
            }
            let cancelled = self.post_block_event(change_block_kind(tag), &cause, &mut pass, &indices);
            fired.push(FiredEvent {
                tag,
                indices,
                cancelled,
            });
        }

        let mut cause = cause;
        if fired.len() > 1 {
            // Repeated names are suffixed by the chain itself.
            for event in &fired {
                cause = cause.with(
                    event_cause_name(event.tag),
                    CauseValue::Event {
                        kind: change_block_kind(event.tag).name().to_string(),
                        transactions: event.indices.len(),
                    },
                );
            }

            let all = pass.all();
            if self.post_block_event(ChangeBlockKind::Post, &cause, &mut pass, &all) {
                info!(transactions = all.len(), cause = %cause.root(), "Post event cancelled, rolling back drain pass");
                self.restore_reversed(&mut pass, &all)?;
                self.revert_client_for_action(&cause, &pass, &all);
                self.buffers.clear_entities();
                return Ok(());
            }
        }

        let decay = pass.tagged(CaptureType::Decay);
        if !decay.is_empty() {
            let cancelled = self.post_block_event(ChangeBlockKind::Decay, &cause, &mut pass, &decay);
            fired.push(FiredEvent {
                tag: CaptureType::Decay,
                indices: decay,
                cancelled,
            });
        }

        let first_was_break = fired
            .first()
            .map(|event| event.tag == CaptureType::Break)
            .unwrap_or(false);

        for event in &fired {
            if event.cancelled {
                info!(
                    capture_type = %event.tag,
                    transactions = event.indices.len(),
                    "Block event cancelled, rolling back"
                );
                self.restore_reversed(&mut pass, &event.indices)?;
                self.revert_client(event.tag, &cause, &pass, &event.indices);
                self.buffers.clear_entities();
                return Ok(());
            }

            let (valid, invalid): (Vec<usize>, Vec<usize>) = event
                .indices
                .iter()
                .copied()
                .partition(|&i| pass.transactions[i].is_valid());

            if !invalid.is_empty() {
                debug!(
                    capture_type = %event.tag,
                    invalid = invalid.len(),
                    "Restoring invalidated transactions"
                );
                self.restore_reversed(&mut pass, &invalid)?;
                self.revert_client(event.tag, &cause, &pass, &invalid);
                self.buffers
                    .invalid_transactions
                    .extend(pass.select(&invalid));
            }

            let (valid, superseded): (Vec<usize>, Vec<usize>) =
                valid.into_iter().partition(|&i| !pass.superseded(i));
            if !superseded.is_empty() {
                debug!(
                    capture_type = %event.tag,
                    superseded = superseded.len(),
                    "Dropping transactions overwritten by a restore"
                );
                for &i in &superseded {
                    pass.transactions[i].invalidate();
                }
                self.revert_client(event.tag, &cause, &pass, &superseded);
                self.buffers
                    .invalid_transactions
                    .extend(pass.select(&superseded));
            }

            for &i in &valid {
                let original = pass.transactions[i].original().clone();
                self.apply_tag_side_effects(event.tag, &cause, &original);
            }

            if first_was_break && !self.buffers.entity_items.is_empty() {
                self.buffers.destruct_item_drop = true;
            }

            let batch = pass.select(&event.indices);
            self.mark_and_notify_block_post(batch, event.tag, cause.clone())?;
        }
        Ok(())
    }

    fn post_block_event(
        &mut self,
        kind: ChangeBlockKind,
        cause: &CauseChain,
        pass: &mut DrainPass,
        indices: &[usize],
    ) -> bool {
        debug!(
            kind = kind.name(),
            transactions = indices.len(),
            cause = %cause.root(),
            "Dispatching block event"
        );
        let mut event = ChangeBlockEvent::new(kind, cause.clone(), self.world_id(), pass.select(indices));
        let cancelled = self.events.post(WorldEvent::ChangeBlock(&mut event));
        pass.write_back(indices, event.into_transactions());
        cancelled
    }

    /// Restore originals last-captured first
    fn restore_reversed(&mut self, pass: &mut DrainPass, indices: &[usize]) -> CaptureResult<()> {
        for &i in indices.iter().rev() {
            pass.restored[i] = true;
            let original = pass.transactions[i].original().clone();
            self.restore_snapshot(&original, true, false)?;
        }
        Ok(())
    }

    fn apply_tag_side_effects(&mut self, tag: CaptureType, cause: &CauseChain, original: &BlockSnapshot) {
        let pos = original.position();
        match tag {
            CaptureType::Break => {
                if let Some(user) = cause.first_user() {
                    self.detach_hanging(pos, user);
                }
            }
            CaptureType::Place => {
                let placer = self
                    .context
                    .player_action
                    .as_ref()
                    .filter(|action| action.is_placement())
                    .map(|action| action.user);
                if let Some(user) = placer {
                    self.tracking.track(pos, TrackerKind::Owner, Some(user));
                    self.tracking.track(pos, TrackerKind::Notifier, Some(user));
                }
            }
            CaptureType::Modify | CaptureType::Decay | CaptureType::Populate => {}
        }
    }

    /// Remove decorations hanging on a broken block, dropping what they held
    fn detach_hanging(&mut self, pos: BlockPos, user: UserId) {
        for handle in self.entities.hanging_at(pos) {
            let Some(hanging) = self.entities.remove(handle) else {
                continue;
            };
            debug!(entity = %hanging.id, position = %pos, "Detached hanging entity");
            if let Some(data) = hanging.data {
                let mut drop = Entity::item(hanging.position).with_creator(user);
                drop.data = Some(data);
                self.buffers.push_entity(drop);
            }
        }
    }

    // =========================================================================
    // Client reverts
    // =========================================================================

    fn reverting_player(&self, cause: &CauseChain) -> Option<UserId> {
        cause.first_player().or_else(|| self.context.acting_player())
    }

    fn revert_client(&mut self, tag: CaptureType, cause: &CauseChain, pass: &DrainPass, indices: &[usize]) {
        let Some(user) = self.reverting_player(cause) else {
            return;
        };
        match tag {
            CaptureType::Break => self.send_block_reverts(user, pass, indices),
            CaptureType::Place => self.send_inventory_revert(user),
            CaptureType::Modify | CaptureType::Decay | CaptureType::Populate => {}
        }
    }

    /// Revert the client by what the acting player was doing
    fn revert_client_for_action(&mut self, cause: &CauseChain, pass: &DrainPass, indices: &[usize]) {
        let Some(user) = self.reverting_player(cause) else {
            return;
        };
        let action = self
            .context
            .player_action
            .as_ref()
            .filter(|action| action.user == user)
            .map(|action| (action.is_dig(), action.is_placement()));
        match action {
            Some((true, _)) => self.send_block_reverts(user, pass, indices),
            Some((_, true)) => self.send_inventory_revert(user),
            _ => {}
        }
    }

    /// Re-send the restored blocks as they now stand in storage
    fn send_block_reverts(&mut self, user: UserId, pass: &DrainPass, indices: &[usize]) {
        for &i in indices {
            let pos = pass.transactions[i].original().position();
            let state = self.storage.block_state(pos);
            self.clients.send_block_change(user, pos, &state);
            if let Some(data) = self.storage.tile_data(pos) {
                self.clients.send_tile_description(user, pos, &data);
            }
        }
    }

    fn send_inventory_revert(&mut self, user: UserId) {
        let slot = self
            .context
            .player_action
            .as_ref()
            .filter(|action| action.user == user)
            .and_then(|action| action.slot_before())
            .map(|(slot, item)| (slot, item.clone()));
        if let Some((slot, item)) = slot {
            self.clients.send_inventory_slot(user, slot, &item);
        }
    }

    // =========================================================================
    // Entity captures
    // =========================================================================

    fn at_invalid_position(&self, entity: &Entity) -> bool {
        let pos = entity.block_pos();
        self.buffers
            .invalid_transactions
            .iter()
            .any(|tx| tx.original().position() == pos)
    }

    /// Record the acting user as creator of freshly captured entities
    fn attribute_creators(&self, cause: &CauseChain, entities: &mut [Entity]) -> CauseChain {
        if let Some(user) = cause.first_user() {
            for entity in entities.iter_mut() {
                entity.creator = Some(user);
            }
            return cause.clone();
        }
        if let Some((_, _, Some(creator))) = cause.first_entity() {
            for entity in entities.iter_mut() {
                entity.creator = Some(creator);
            }
            if !cause.contains_named(NamedCause::OWNER) {
                return cause.with(NamedCause::OWNER, CauseValue::User(creator));
            }
        }
        cause.clone()
    }

    fn handle_dropped_items(&mut self, cause: &CauseChain) {
        let mut items = std::mem::take(&mut self.buffers.entity_items);
        let cause = self.attribute_creators(cause, &mut items);
        let world_id = self.world_id();
        let snapshots = items.iter().map(|e| e.snapshot(world_id)).collect();
        let kind = if self.buffers.destruct_item_drop {
            SpawnKind::DropItemDestruct
        } else {
            SpawnKind::DropItemDispense
        };

        let mut event = SpawnEntityEvent::new(kind, cause.clone(), world_id, items, snapshots);
        if self.events.post(WorldEvent::SpawnEntity(&mut event)) {
            info!(kind = kind.name(), cause = %cause.root(), "Item drop cancelled");
            if let Some(user) = cause.root().user() {
                if self.context.acting_player() == Some(user) {
                    self.send_inventory_revert(user);
                }
            }
            return;
        }

        for entity in event.into_entities() {
            if entity.removed || self.at_invalid_position(&entity) {
                continue;
            }
            self.insert_live(entity, &cause);
        }
    }

    fn handle_entity_spawns(&mut self, cause: &CauseChain) {
        let mut entities = std::mem::take(&mut self.buffers.entities);
        let cause = self.attribute_creators(cause, &mut entities);
        let world_id = self.world_id();
        let snapshots = entities.iter().map(|e| e.snapshot(world_id)).collect();
        let kind = if self.context.world_spawner_running {
            SpawnKind::Spawner
        } else if self.context.chunk_spawner_running {
            SpawnKind::ChunkLoad
        } else {
            SpawnKind::Custom
        };

        let mut event = SpawnEntityEvent::new(kind, cause.clone(), world_id, entities, snapshots);
        if self.events.post(WorldEvent::SpawnEntity(&mut event)) {
            info!(kind = kind.name(), cause = %cause.root(), "Entity spawn cancelled");
            return;
        }

        for entity in event.into_entities() {
            if entity.removed || self.at_invalid_position(&entity) {
                continue;
            }
            if entity.kind.is_weather_effect() {
                self.add_weather_effect(entity, cause.clone());
            } else {
                self.insert_live(entity, &cause);
            }
        }
    }

    // =========================================================================
    // Populator captures
    // =========================================================================

    /// Dispatch the populate event of one populator kind
    pub(crate) fn handle_populator_captures(&mut self, kind: &PopulatorKind) -> CaptureResult<()> {
        let Some(capture) = self.buffers.take_populator(kind) else {
            return Ok(());
        };
        if capture.is_empty() {
            return Ok(());
        }

        let cause = CauseChain::source(CauseValue::World(self.world_id()))
            .with("Populator", CauseValue::Custom(kind.to_string()));
        debug!(populator = %kind, transactions = capture.len(), "Dispatching populate event");
        let mut event = ChangeBlockEvent::new(
            ChangeBlockKind::Populate(kind.clone()),
            cause,
            self.world_id(),
            capture.into_transactions(),
        );
        let cancelled = self.events.post(WorldEvent::ChangeBlock(&mut event));
        let transactions = event.into_transactions();

        if cancelled {
            info!(populator = %kind, transactions = transactions.len(), "Populate event cancelled, rolling back");
            for tx in transactions.iter().rev() {
                self.restore_snapshot(tx.original(), true, false)?;
            }
            return Ok(());
        }

        for tx in &transactions {
            if !tx.is_valid() {
                self.restore_snapshot(tx.original(), true, false)?;
            } else if let Some(custom) = tx.custom() {
                self.restore_snapshot(custom, true, false)?;
            }
        }
        Ok(())
    }
}
