//! End-to-end test: writes made while committing are captured and drained
//! recursively, with bounded depth.

use std::cell::RefCell;
use std::rc::Rc;
use worldhook_capture::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Grows upwards forever when placed
struct Vine;

impl BlockBehavior for Vine {
    fn on_block_added(
        &self,
        world: &mut dyn WorldAccess,
        pos: BlockPos,
        state: &BlockState,
    ) -> CaptureResult<()> {
        world.set_block_state(pos.offset(Direction::Up), state.clone(), UpdateFlags::none())?;
        Ok(())
    }
}

/// Lights the lamp to its east on every scheduled tick
struct Lever;

impl BlockBehavior for Lever {
    fn on_scheduled_tick(
        &self,
        world: &mut dyn WorldAccess,
        pos: BlockPos,
        _state: &BlockState,
    ) -> CaptureResult<()> {
        world.set_block_state(pos.offset(Direction::East), BlockState::of("lamp"), UpdateFlags::none())?;
        Ok(())
    }
}

/// Places a glow block above itself once added
struct Lamp;

impl BlockBehavior for Lamp {
    fn on_block_added(
        &self,
        world: &mut dyn WorldAccess,
        pos: BlockPos,
        _state: &BlockState,
    ) -> CaptureResult<()> {
        world.set_block_state(pos.offset(Direction::Up), BlockState::of("glow"), UpdateFlags::none())?;
        Ok(())
    }

    fn has_comparator_input_override(&self) -> bool {
        true
    }
}

#[derive(Clone, Default)]
struct Comparator {
    updates: Rc<RefCell<Vec<(BlockPos, BlockPos)>>>,
}

impl BlockBehavior for Comparator {
    fn on_comparator_update(
        &self,
        _world: &mut dyn WorldAccess,
        pos: BlockPos,
        source: BlockPos,
    ) -> CaptureResult<()> {
        self.updates.borrow_mut().push((pos, source));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_runaway_cascade_hits_depth_bound() {
    let config = CaptureConfig {
        max_capture_depth: 4,
        ..Default::default()
    };
    let mut world = WorldMediator::new(config, InMemoryWorld::new()).unwrap();
    world.register_block("vine", Vine);

    let root = BlockPos::new(0, 64, 0);
    let cause = CauseChain::source(CauseValue::Plugin(PluginId::new("garden")));
    let err = world
        .set_block(root, BlockState::of("vine"), false, cause)
        .unwrap_err();

    match &err {
        CaptureError::RecursionOverflow { depth, chain, .. } => {
            assert_eq!(*depth, 4);
            assert!(chain.contains("plugin:garden"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_fatal());

    // The aborted unit leaves nothing pending and the context idle.
    assert!(world.buffers().is_empty());
    assert!(!world.context().in_tick_unit());
    assert!(world.context().plugin_cause.is_none());
}

#[test]
fn test_cascade_below_bound_completes() {
    let mut world = WorldMediator::new(CaptureConfig::default(), InMemoryWorld::new()).unwrap();
    world.register_block("vine", Vine);

    // Growth stops at the world ceiling, well inside the default depth.
    let root = BlockPos::new(0, 250, 0);
    let cause = CauseChain::source(CauseValue::Plugin(PluginId::new("garden")));
    assert!(world.set_block(root, BlockState::of("vine"), false, cause).unwrap());

    for y in 250..256 {
        assert_eq!(world.storage().block_state(BlockPos::new(0, y, 0)), BlockState::of("vine"));
    }
    assert_eq!(world.events().records_of("change_block.place").len(), 6);
}

#[test]
fn test_nested_capture_names_committed_block_as_source() {
    let lever = BlockPos::new(0, 64, 0);
    let lamp = lever.offset(Direction::East);
    let storage = InMemoryWorld::new().with_block(lever, BlockState::of("lever"));
    let mut world = WorldMediator::new(CaptureConfig::default(), storage).unwrap();
    world.register_block("lever", Lever);
    world.register_block("lamp", Lamp);

    let causes = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&causes);
    world.subscribe(move |event: &mut WorldEvent<'_>| {
        if let WorldEvent::ChangeBlock(e) = event {
            seen.borrow_mut().push(e.cause().clone());
        }
    });

    world.tick_block(lever, false).unwrap();

    let causes = causes.borrow();
    assert_eq!(causes.len(), 2);
    let first = causes[0].first_block().unwrap();
    assert_eq!(first.state(), &BlockState::of("lever"));

    // The lamp committed first, so it became the source of the glow write.
    let nested = &causes[1];
    assert_eq!(nested.first_block().unwrap().state(), &BlockState::of("lamp"));
    assert!(matches!(
        nested.named("AdditionalSource"),
        Some(CauseValue::Block(block)) if block.position() == lever
    ));
    assert_eq!(world.storage().block_state(lamp.offset(Direction::Up)), BlockState::of("glow"));
}

#[test]
fn test_random_ticks_do_not_chain_cause() {
    let lever = BlockPos::new(0, 64, 0);
    let storage = InMemoryWorld::new().with_block(lever, BlockState::of("lever"));
    let mut world = WorldMediator::new(CaptureConfig::default(), storage).unwrap();
    world.register_block("lever", Lever);
    world.register_block("lamp", Lamp);

    let roots = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&roots);
    world.subscribe(move |event: &mut WorldEvent<'_>| {
        if let WorldEvent::ChangeBlock(e) = event {
            seen.borrow_mut().push(e.cause().first_block().map(|b| b.state().clone()));
        }
    });

    world.tick_block(lever, true).unwrap();
    assert_eq!(
        roots.borrow().as_slice(),
        &[Some(BlockState::of("lever")), Some(BlockState::of("lever"))]
    );
}

#[test]
fn test_comparator_override_updates_horizontal_neighbours() {
    let lamp = BlockPos::new(0, 64, 0);
    let north = lamp.offset(Direction::North);
    let above = lamp.offset(Direction::Up);
    let storage = InMemoryWorld::new()
        .with_block(north, BlockState::of("comparator"))
        .with_block(above, BlockState::of("comparator"));
    let mut world = WorldMediator::new(CaptureConfig::default(), storage).unwrap();
    let comparator = Comparator::default();
    world.register_block("comparator", comparator.clone());
    world.register_block("lamp", Lamp);

    let cause = CauseChain::source(CauseValue::Plugin(PluginId::new("redstone")));
    world.set_block(lamp, BlockState::of("lamp"), true, cause).unwrap();

    // Only horizontal neighbours are updated; the glow write above replaces
    // the comparator there anyway.
    assert_eq!(comparator.updates.borrow().as_slice(), &[(north, lamp)]);
}
