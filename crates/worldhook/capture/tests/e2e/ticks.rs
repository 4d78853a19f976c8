//! End-to-end test: entity, tile-entity and spawner tick units.

use std::cell::RefCell;
use std::rc::Rc;
use worldhook_capture::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Walks one block east per update and turns north
struct Walker;

impl EntityBehavior for Walker {
    fn on_update(&self, world: &mut dyn WorldAccess, entity: EntityId) -> CaptureResult<()> {
        if let Some(walker) = world.entity_mut(entity) {
            walker.position.x += 1.0;
        }
        world.add_entity_rotation_update(entity, Rotation::new(0.0, 180.0));
        Ok(())
    }
}

/// Lays an item where it stands on every update
struct Hen;

impl EntityBehavior for Hen {
    fn on_update(&self, world: &mut dyn WorldAccess, entity: EntityId) -> CaptureResult<()> {
        let Some(position) = world.entity(entity).map(|e| e.position) else {
            return Ok(());
        };
        let cause = CauseChain::source(CauseValue::World(world.world_id()));
        world.spawn_entity(Entity::item(position), cause)?;
        Ok(())
    }
}

/// Smelts the block below on every tile tick
struct Furnace;

impl BlockBehavior for Furnace {
    fn has_tile_entity(&self, _state: &BlockState) -> bool {
        true
    }

    fn on_tile_entity_tick(
        &self,
        world: &mut dyn WorldAccess,
        pos: BlockPos,
        _state: &BlockState,
    ) -> CaptureResult<()> {
        world.set_block_state(pos.offset(Direction::Down), BlockState::of("glass"), UpdateFlags::none())?;
        Ok(())
    }
}

fn record_roots(world: &mut WorldMediator<InMemoryWorld>) -> Rc<RefCell<Vec<String>>> {
    let roots = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&roots);
    world.subscribe(move |event: &mut WorldEvent<'_>| {
        seen.borrow_mut().push(event.cause().root().to_string());
    });
    roots
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_entity_move_and_rotation() {
    let mut world = WorldMediator::new(CaptureConfig::default(), InMemoryWorld::new()).unwrap();
    let walker = Entity::new(EntityKind::Living, Vec3::new(0.5, 64.0, 0.5)).with_behavior(Rc::new(Walker));
    let id = world.insert_entity(walker);

    world.tick_entity(id).unwrap();

    let walker = world.entities().by_id(id).unwrap();
    assert_eq!(walker.position, Vec3::new(1.5, 64.0, 0.5));
    assert_eq!(walker.rotation, Rotation::new(0.0, 180.0));
    assert_eq!(world.events().kinds(), vec!["move_entity"]);
}

#[test]
fn test_cancelled_move_restores_position() {
    let mut world = WorldMediator::new(CaptureConfig::default(), InMemoryWorld::new()).unwrap();
    world.subscribe(|event: &mut WorldEvent<'_>| {
        if let WorldEvent::MoveEntity(_) = event {
            event.set_cancelled(true);
        }
    });
    let walker = Entity::new(EntityKind::Living, Vec3::new(0.5, 64.0, 0.5)).with_behavior(Rc::new(Walker));
    let id = world.insert_entity(walker);

    world.tick_entity(id).unwrap();
    assert_eq!(world.entities().by_id(id).unwrap().position, Vec3::new(0.5, 64.0, 0.5));
}

#[test]
fn test_unknown_entity_tick_fails() {
    let mut world = WorldMediator::new(CaptureConfig::default(), InMemoryWorld::new()).unwrap();
    let err = world.tick_entity(EntityId::generate()).unwrap_err();
    assert!(matches!(err, CaptureError::EntityNotFound(_)));
}

#[test]
fn test_entity_drops_inherit_creator_as_owner() {
    let mut world = WorldMediator::new(CaptureConfig::default(), InMemoryWorld::new()).unwrap();
    let names = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&names);
    world.subscribe(move |event: &mut WorldEvent<'_>| {
        if let WorldEvent::SpawnEntity(e) = event {
            seen.borrow_mut().extend(e.cause().names().iter().map(|n| n.to_string()));
        }
    });

    let user = UserId::generate();
    let hen = Entity::new(EntityKind::Living, Vec3::new(4.5, 64.0, 4.5))
        .with_behavior(Rc::new(Hen))
        .with_creator(user);
    let hen_id = world.insert_entity(hen);

    world.tick_entity(hen_id).unwrap();

    assert_eq!(world.events().kinds(), vec!["drop_item.dispense"]);
    assert!(names.borrow().iter().any(|n| n == NamedCause::OWNER));
    let egg = world.entities().iter().find(|e| e.kind.is_item()).unwrap();
    assert_eq!(egg.creator, Some(user));
}

#[test]
fn test_tile_entity_tick_is_the_cause() {
    let furnace = BlockPos::new(0, 64, 0);
    let below = furnace.offset(Direction::Down);
    let storage = InMemoryWorld::new()
        .with_block(furnace, BlockState::of("furnace"))
        .with_block(below, BlockState::of("sand"));
    let mut world = WorldMediator::new(CaptureConfig::default(), storage).unwrap();
    world.register_block("furnace", Furnace);
    let roots = record_roots(&mut world);

    world.tick_tile_entity(furnace).unwrap();

    assert_eq!(world.storage().block_state(below), BlockState::of("glass"));
    assert_eq!(world.events().kinds(), vec!["change_block.place"]);
    assert_eq!(roots.borrow()[0], format!("tile:furnace@{}", furnace));
}

#[test]
fn test_world_spawner_batches_spawns() {
    let mut world = WorldMediator::new(CaptureConfig::default(), InMemoryWorld::new()).unwrap();
    let pos = BlockPos::new(0, 64, 0);

    world
        .with_world_spawner(|world| {
            let cause = CauseChain::source(CauseValue::World(world.world_id()));
            for x in 0..3 {
                let zombie = Entity::new(EntityKind::Living, Vec3::new(x as f64, 64.0, 0.0));
                world.spawn_entity(zombie, cause.clone())?;
            }
            // Spawner block writes bypass capture.
            world.set_block_state(pos, BlockState::of("spawner"), UpdateFlags::none())
        })
        .unwrap();

    assert_eq!(world.events().kinds(), vec!["spawn_entity.spawner"]);
    assert_eq!(world.events().records()[0].size, 3);
    assert_eq!(world.entities().len(), 3);
    assert_eq!(world.storage().block_state(pos), BlockState::of("spawner"));
    assert!(world.buffers().is_empty());
}

#[test]
fn test_death_drops_skip_events() {
    let mut world = WorldMediator::new(CaptureConfig::default(), InMemoryWorld::new()).unwrap();
    let user = UserId::generate();

    world
        .process_player_action(PlayerAction::dig(user), |world| {
            world.with_death_drops(|world| {
                let cause = CauseChain::source(CauseValue::Player(user));
                world.spawn_entity(Entity::item(Vec3::new(0.5, 64.0, 0.5)), cause)
            })
        })
        .unwrap();

    assert_eq!(world.entities().len(), 1);
    assert_eq!(world.events().event_count(), 0);
}
