//! Live entities and the generation-checked entity arena
//!
//! Nothing outside the arena holds a reference to a live entity. Callers keep
//! an [`EntityHandle`] (or an [`EntityId`]) and ask the arena whether it is
//! still live.

use crate::traits::EntityBehavior;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use worldhook_types::{
    Blob, BlockPos, CauseChain, CauseValue, EntityId, EntityKind, EntitySnapshot, Rotation,
    UserId, Vec3, WorldId,
};

/// A live (or pending) entity
#[derive(Clone)]
pub struct Entity {
    /// Identity
    pub id: EntityId,
    /// Kind
    pub kind: EntityKind,
    /// Position
    pub position: Vec3,
    /// Facing
    pub rotation: Rotation,
    /// Spawn even in unloaded chunks, bypassing capture
    pub force_spawn: bool,
    /// Set by listeners (or game logic) to drop the entity before insertion
    pub removed: bool,
    /// Tracked creator
    pub creator: Option<UserId>,
    /// Tracked notifier
    pub notifier: Option<UserId>,
    /// Taming owner
    pub owner: Option<UserId>,
    /// Block face a hanging entity is attached to
    pub anchor: Option<BlockPos>,
    /// Opaque auxiliary data
    pub data: Option<Blob>,
    /// Cause recorded at spawn time (weather effects)
    pub spawn_cause: Option<CauseChain>,
    /// Whether post-construction hooks still have to run
    pub in_construct_phase: bool,
    behavior: Option<Rc<dyn EntityBehavior>>,
}

impl Entity {
    /// Create a new entity of `kind` at `position`
    pub fn new(kind: EntityKind, position: Vec3) -> Self {
        Self {
            id: EntityId::generate(),
            kind,
            position,
            rotation: Rotation::default(),
            force_spawn: false,
            removed: false,
            creator: None,
            notifier: None,
            owner: None,
            anchor: None,
            data: None,
            spawn_cause: None,
            in_construct_phase: false,
            behavior: None,
        }
    }

    /// A dropped item
    pub fn item(position: Vec3) -> Self {
        Self::new(EntityKind::Item, position)
    }

    /// A decoration attached to the block at `anchor`
    pub fn hanging(anchor: BlockPos) -> Self {
        let mut entity = Self::new(EntityKind::Hanging, anchor.center());
        entity.anchor = Some(anchor);
        entity
    }

    /// Attach host behavior
    pub fn with_behavior(mut self, behavior: Rc<dyn EntityBehavior>) -> Self {
        self.behavior = Some(behavior);
        self
    }

    /// Set the force-spawn flag
    pub fn forced(mut self) -> Self {
        self.force_spawn = true;
        self
    }

    /// Set the tracked creator
    pub fn with_creator(mut self, creator: UserId) -> Self {
        self.creator = Some(creator);
        self
    }

    /// Host behavior, if any
    pub fn behavior(&self) -> Option<Rc<dyn EntityBehavior>> {
        self.behavior.clone()
    }

    /// Block containing this entity
    pub fn block_pos(&self) -> BlockPos {
        self.position.block_pos()
    }

    /// This entity as a cause value
    pub fn cause_value(&self) -> CauseValue {
        CauseValue::Entity {
            id: self.id,
            kind: self.kind.clone(),
            owner: self.owner,
            creator: self.creator,
        }
    }

    /// Detached snapshot of this entity
    pub fn snapshot(&self, world_id: WorldId) -> EntitySnapshot {
        EntitySnapshot {
            world_id,
            entity_id: self.id,
            kind: self.kind.clone(),
            position: self.position,
            rotation: self.rotation,
            creator: self.creator,
            notifier: self.notifier,
            data: self.data.clone(),
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("position", &self.position)
            .field("removed", &self.removed)
            .field("creator", &self.creator)
            .field("has_behavior", &self.behavior.is_some())
            .finish()
    }
}

/// Generation-checked reference to a slot in an [`EntityArena`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityHandle {
    index: usize,
    generation: u64,
}

struct Slot {
    generation: u64,
    entity: Option<Entity>,
}

/// Storage for live entities
#[derive(Default)]
pub struct EntityArena {
    slots: Vec<Slot>,
    free: Vec<usize>,
    by_id: HashMap<EntityId, EntityHandle>,
}

impl EntityArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a live entity
    pub fn insert(&mut self, entity: Entity) -> EntityHandle {
        let id = entity.id;
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.generation += 1;
                slot.entity = Some(entity);
                EntityHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entity: Some(entity),
                });
                EntityHandle {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        };
        self.by_id.insert(id, handle);
        handle
    }

    /// Remove an entity, invalidating its handle
    pub fn remove(&mut self, handle: EntityHandle) -> Option<Entity> {
        if !self.is_live(handle) {
            return None;
        }
        let entity = self.slots[handle.index].entity.take()?;
        self.by_id.remove(&entity.id);
        self.free.push(handle.index);
        Some(entity)
    }

    /// Whether the handle still refers to the entity it was issued for
    pub fn is_live(&self, handle: EntityHandle) -> bool {
        self.slots
            .get(handle.index)
            .map(|slot| slot.generation == handle.generation && slot.entity.is_some())
            .unwrap_or(false)
    }

    /// Handle of a live entity
    pub fn handle_of(&self, id: EntityId) -> Option<EntityHandle> {
        self.by_id.get(&id).copied()
    }

    /// Entity behind a handle
    pub fn get(&self, handle: EntityHandle) -> Option<&Entity> {
        if !self.is_live(handle) {
            return None;
        }
        self.slots[handle.index].entity.as_ref()
    }

    /// Mutable entity behind a handle
    pub fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut Entity> {
        if !self.is_live(handle) {
            return None;
        }
        self.slots[handle.index].entity.as_mut()
    }

    /// Entity by identity
    pub fn by_id(&self, id: EntityId) -> Option<&Entity> {
        self.handle_of(id).and_then(|handle| self.get(handle))
    }

    /// Mutable entity by identity
    pub fn by_id_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        let handle = self.handle_of(id)?;
        self.get_mut(handle)
    }

    /// Hanging entities attached to `pos`
    pub fn hanging_at(&self, pos: BlockPos) -> Vec<EntityHandle> {
        self.by_id
            .values()
            .copied()
            .filter(|handle| {
                self.get(*handle)
                    .map(|e| e.kind == EntityKind::Hanging && e.anchor == Some(pos))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// All live entities
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.slots.iter().filter_map(|slot| slot.entity.as_ref())
    }

    /// Number of live entities
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether no entity is live
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
