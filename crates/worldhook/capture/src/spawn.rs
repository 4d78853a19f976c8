//! Entity-spawn admission

use crate::entity::Entity;
use crate::errors::CaptureResult;
use crate::events::{LightningEvent, SpawnEntityEvent, SpawnKind, WorldEvent};
use crate::mediator::WorldMediator;
use crate::traits::{TrackerKind, WorldStorage};
use tracing::{debug, info};
use worldhook_types::CauseChain;

impl<S: WorldStorage> WorldMediator<S> {
    /// Decide whether `entity` enters the world now, later, or not at all
    ///
    /// Inside a tick unit the entity is buffered and `true` is returned; the
    /// actual insertion happens when the unit drains. Outside one, a spawn
    /// event is dispatched synchronously.
    pub fn spawn_entity(&mut self, mut entity: Entity, cause: CauseChain) -> CaptureResult<bool> {
        if let Some(behavior) = entity.behavior() {
            if entity.in_construct_phase {
                behavior.on_construct(&mut entity);
                entity.in_construct_phase = false;
            }
            if !behavior.admit_spawn(&entity, &cause) {
                debug!(entity = %entity.id, kind = ?entity.kind, "Spawn rejected by entity");
                return Ok(false);
            }
            if behavior.requires_valid_surface() && !self.has_valid_surface(&entity) {
                debug!(entity = %entity.id, "Spawn rejected, no valid surface");
                return Ok(false);
            }
        }

        // Items spawned while restoring would duplicate drops.
        if self.config.authoritative && entity.kind.is_item() && self.context.restoring_blocks {
            return Ok(false);
        }

        let forced = entity.force_spawn || entity.kind.is_player();
        if entity.kind.is_weather_effect() {
            entity.spawn_cause = Some(cause.clone());
        }
        if !forced && !self.storage.is_chunk_loaded(entity.position.chunk()) {
            return Ok(false);
        }

        if !self.config.authoritative || forced || self.context.spawning_death_drops {
            self.insert_live(entity, &cause);
            return Ok(true);
        }

        if self.context.processing_capture_cause && self.config.capture_entity_spawns {
            self.attribute_to_current_tick(&mut entity);
            self.buffers.push_entity(entity);
            return Ok(true);
        }

        if entity.kind.is_weather_effect() {
            return Ok(self.add_weather_effect(entity, cause));
        }
        Ok(self.spawn_synchronously(entity, cause))
    }

    fn has_valid_surface(&self, entity: &Entity) -> bool {
        entity
            .anchor
            .map(|anchor| !self.view_state(anchor).is_air())
            .unwrap_or(false)
    }

    fn attribute_to_current_tick(&self, entity: &mut Entity) {
        if let Some(block) = &self.context.current_tick_block {
            let source = block.position();
            let user = self
                .tracking
                .tracked(source, TrackerKind::Notifier)
                .or_else(|| self.tracking.tracked(source, TrackerKind::Owner))
                .or(block.notifier())
                .or(block.creator());
            if entity.notifier.is_none() {
                entity.notifier = user;
            }
        }
        if let Some(ticking) = self.context.current_tick_entity {
            // Falling blocks turning into items keep their creator.
            if let Some(creator) = self.entities.by_id(ticking).and_then(|e| e.creator) {
                entity.creator = Some(creator);
            }
        }
    }

    fn spawn_synchronously(&mut self, entity: Entity, cause: CauseChain) -> bool {
        let id = entity.id;
        let world_id = self.world_id();
        let snapshots = vec![entity.snapshot(world_id)];
        self.buffers.push_entity(entity.clone());

        let mut event = SpawnEntityEvent::new(SpawnKind::Custom, cause.clone(), world_id, vec![entity], snapshots);
        let cancelled = self.events.post(WorldEvent::SpawnEntity(&mut event));
        self.buffers.remove_entity(id);
        if cancelled {
            debug!(entity = %id, "Spawn cancelled");
            return false;
        }

        match event.into_entities().into_iter().find(|e| e.id == id) {
            Some(entity) if !entity.removed => {
                self.insert_live(entity, &cause);
                true
            }
            _ => false,
        }
    }

    /// Admit a weather effect, firing a lightning event first
    pub(crate) fn add_weather_effect(&mut self, entity: Entity, cause: CauseChain) -> bool {
        let cause = entity.spawn_cause.clone().unwrap_or(cause);
        let mut event = LightningEvent::new(cause.clone(), entity.id, entity.position);
        if self.events.post(WorldEvent::Lightning(&mut event)) {
            info!(entity = %entity.id, position = ?entity.position, "Lightning cancelled");
            return false;
        }
        if entity.removed {
            return false;
        }
        self.insert_live(entity, &cause);
        true
    }

    /// Put an admitted entity into the live world
    pub(crate) fn insert_live(&mut self, entity: Entity, cause: &CauseChain) {
        if self.config.log_entity_spawns {
            info!(
                entity = %entity.id,
                kind = ?entity.kind,
                position = %entity.block_pos(),
                cause = %cause.root(),
                "Entity spawned"
            );
        }
        self.entities.insert(entity);
    }
}
