//! End-to-end test: cancelled and partially rejected drain passes roll back.

use std::cell::RefCell;
use std::rc::Rc;
use worldhook_capture::prelude::*;
use worldhook_capture::{ClientMessage, RecordingClientSink};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_post_cancel_restores_in_reverse_capture_order() {
    let pos = BlockPos::new(0, 64, 0);
    let other = BlockPos::new(3, 64, 0);
    let storage = InMemoryWorld::new().with_block(pos, BlockState::of("stone"));
    let sink = RecordingClientSink::new();
    let mut world = WorldMediator::new(CaptureConfig::default(), storage)
        .unwrap()
        .with_client_sink(sink.clone());
    world.subscribe(|event: &mut WorldEvent<'_>| {
        if let WorldEvent::ChangeBlock(e) = event {
            if e.kind() == &ChangeBlockKind::Post {
                e.set_cancelled(true);
            }
        }
    });

    let user = UserId::generate();
    world
        .process_player_action(PlayerAction::dig(user), |world| {
            // stone -> dirt (place), dirt -> air (break), air -> torch elsewhere (place)
            world.set_block_state(pos, BlockState::of("dirt"), UpdateFlags::all())?;
            world.set_block_state(pos, BlockState::air(), UpdateFlags::all())?;
            world.set_block_state(other, BlockState::of("torch"), UpdateFlags::all())
        })
        .unwrap();

    // Restoring last-captured first leaves the earliest original in place.
    assert_eq!(world.storage().block_state(pos), BlockState::of("stone"));
    assert!(world.storage().block_state(other).is_air());
    assert_eq!(
        world.events().kinds(),
        vec!["change_block.break", "change_block.place", "change_block.post"]
    );
    assert_eq!(world.events().records_of("change_block.post")[0].size, 3);

    // The client is told what the world holds after the rollback.
    let messages = sink.messages();
    assert_eq!(messages.len(), 3);
    assert!(messages.iter().all(|m| match m {
        ClientMessage::BlockChange { pos: p, state, .. } if *p == pos => state == &BlockState::of("stone"),
        ClientMessage::BlockChange { pos: p, state, .. } if *p == other => state.is_air(),
        _ => false,
    }));
    assert!(world.buffers().is_empty());
}

#[test]
fn test_post_cause_names_fired_events() {
    let a = BlockPos::new(0, 64, 0);
    let b = BlockPos::new(1, 64, 0);
    let storage = InMemoryWorld::new().with_block(a, BlockState::of("stone"));
    let mut world = WorldMediator::new(CaptureConfig::default(), storage).unwrap();
    let names = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&names);
    world.subscribe(move |event: &mut WorldEvent<'_>| {
        if let WorldEvent::ChangeBlock(e) = event {
            if e.kind() == &ChangeBlockKind::Post {
                *seen.borrow_mut() = e.cause().names().iter().map(|n| n.to_string()).collect();
            }
        }
    });

    let user = UserId::generate();
    world
        .process_player_action(PlayerAction::dig(user), |world| {
            world.set_block_state(a, BlockState::air(), UpdateFlags::none())?;
            world.set_block_state(b, BlockState::of("sand"), UpdateFlags::none())
        })
        .unwrap();

    assert_eq!(
        names.borrow().as_slice(),
        &["Source".to_string(), "BreakEvent".to_string(), "PlaceEvent".to_string()]
    );
}

#[test]
fn test_cancelled_modify_keeps_earlier_break() {
    let a = BlockPos::new(0, 64, 0);
    let b = BlockPos::new(1, 64, 0);
    let storage = InMemoryWorld::new()
        .with_block(a, BlockState::of("stone"))
        .with_block(b, BlockState::of("wool"));
    let mut world = WorldMediator::new(CaptureConfig::default(), storage).unwrap();
    world.subscribe(|event: &mut WorldEvent<'_>| {
        if let WorldEvent::ChangeBlock(e) = event {
            if e.kind() == &ChangeBlockKind::Modify {
                e.set_cancelled(true);
            }
        }
    });

    let cause = CauseValue::Plugin(PluginId::new("painter"));
    world
        .run_command(cause, |world| {
            world.set_block_state(a, BlockState::air(), UpdateFlags::none())?;
            world.set_block_state(
                b,
                BlockState::of("wool").with_property("color", "red"),
                UpdateFlags::none(),
            )
        })
        .unwrap();

    // Break was committed before the modify verdict was read.
    assert!(world.storage().block_state(a).is_air());
    assert_eq!(world.storage().block_state(b), BlockState::of("wool"));
}

#[test]
fn test_invalidated_transaction_is_restored_and_its_drops_filtered() {
    let keep = BlockPos::new(0, 64, 0);
    let reject = BlockPos::new(2, 64, 0);
    let storage = InMemoryWorld::new()
        .with_block(keep, BlockState::of("glass"))
        .with_block(reject, BlockState::of("glass"));
    let mut world = WorldMediator::new(CaptureConfig::default(), storage).unwrap();
    world.subscribe(move |event: &mut WorldEvent<'_>| {
        if let WorldEvent::ChangeBlock(e) = event {
            e.invalidate_where(|tx| tx.original().position() == reject);
        }
    });

    let user = UserId::generate();
    world
        .process_player_action(PlayerAction::dig(user), |world| {
            let cause = CauseChain::source(CauseValue::Player(user));
            world.set_block_state(keep, BlockState::air(), UpdateFlags::none())?;
            world.set_block_state(reject, BlockState::air(), UpdateFlags::none())?;
            world.spawn_entity(Entity::item(keep.center()), cause.clone())?;
            world.spawn_entity(Entity::item(reject.center()), cause)
        })
        .unwrap();

    assert!(world.storage().block_state(keep).is_air());
    assert_eq!(world.storage().block_state(reject), BlockState::of("glass"));

    let drops: Vec<_> = world.entities().iter().map(|e| e.block_pos()).collect();
    assert_eq!(drops, vec![keep]);
    assert_eq!(world.events().kinds().last(), Some(&"drop_item.destruct"));
    assert!(world.buffers().invalid_transactions().is_empty());
}

#[test]
fn test_populate_cancel_and_replacement() {
    let trunk = BlockPos::new(8, 70, 8);
    let crown = BlockPos::new(8, 71, 8);
    let mut world = WorldMediator::new(CaptureConfig::default(), InMemoryWorld::new()).unwrap();
    let captured = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&captured);
    world.subscribe(move |event: &mut WorldEvent<'_>| {
        if let WorldEvent::ChangeBlock(e) = event {
            if let ChangeBlockKind::Populate(kind) = e.kind() {
                let summary: Vec<(BlockPos, BlockState)> = e
                    .transactions()
                    .iter()
                    .map(|tx| (tx.original().position(), tx.final_snapshot().state().clone()))
                    .collect();
                seen.borrow_mut().push(summary);
                if kind.to_string() == "lake" {
                    e.set_cancelled(true);
                }
            }
        }
    });

    world
        .run_populator(PopulatorKind::new("tree"), |world| {
            world.set_block_state(trunk, BlockState::of("log"), UpdateFlags::clients_only())?;
            world.set_block_state(crown, BlockState::of("leaves"), UpdateFlags::clients_only())?;
            world.set_block_state(trunk, BlockState::of("leaves"), UpdateFlags::clients_only())
        })
        .unwrap();

    // Last write wins per position, in first-insertion order.
    assert_eq!(
        captured.borrow()[0],
        vec![(trunk, BlockState::of("leaves")), (crown, BlockState::of("leaves"))]
    );
    assert_eq!(world.storage().block_state(trunk), BlockState::of("leaves"));

    let pool = BlockPos::new(20, 62, 20);
    world
        .run_populator(PopulatorKind::new("lake"), |world| {
            world.set_block_state(pool, BlockState::of("water"), UpdateFlags::clients_only())
        })
        .unwrap();
    assert!(world.storage().block_state(pool).is_air());
    assert_eq!(
        world.events().kinds(),
        vec!["change_block.populate.tree", "change_block.populate.lake"]
    );
}

#[test]
fn test_cancelled_populate_restores_state_before_the_pass() {
    let pos = BlockPos::new(4, 70, 4);
    let mut world = WorldMediator::new(CaptureConfig::default(), InMemoryWorld::new()).unwrap();
    world.subscribe(|event: &mut WorldEvent<'_>| {
        if let WorldEvent::ChangeBlock(e) = event {
            if matches!(e.kind(), ChangeBlockKind::Populate(_)) {
                e.set_cancelled(true);
            }
        }
    });

    world
        .run_populator(PopulatorKind::new("tree"), |world| {
            world.set_block_state(pos, BlockState::of("log"), UpdateFlags::clients_only())?;
            world.set_block_state(pos, BlockState::of("leaves"), UpdateFlags::clients_only())
        })
        .unwrap();

    // The intermediate log never becomes the restore target.
    assert!(world.storage().block_state(pos).is_air());
    assert_eq!(world.events().records_of("change_block.populate.tree")[0].size, 1);
}

#[test]
fn test_post_cancel_of_placement_reverts_inventory_only() {
    let grass = BlockPos::new(0, 64, 0);
    let target = BlockPos::new(0, 65, 0);
    let storage = InMemoryWorld::new().with_block(grass, BlockState::of("tall_grass"));
    let sink = RecordingClientSink::new();
    let mut world = WorldMediator::new(CaptureConfig::default(), storage)
        .unwrap()
        .with_client_sink(sink.clone());
    world.subscribe(|event: &mut WorldEvent<'_>| {
        if let WorldEvent::ChangeBlock(e) = event {
            if e.kind() == &ChangeBlockKind::Post {
                e.set_cancelled(true);
            }
        }
    });

    let user = UserId::generate();
    let stack = ItemStack::new("torch", 16);
    world
        .process_player_action(PlayerAction::place(user, 4, Some(stack.clone())), |world| {
            world.set_block_state(grass, BlockState::air(), UpdateFlags::all())?;
            world.set_block_state(target, BlockState::of("torch"), UpdateFlags::all())
        })
        .unwrap();

    assert_eq!(world.storage().block_state(grass), BlockState::of("tall_grass"));
    assert!(world.storage().block_state(target).is_air());
    assert_eq!(
        sink.messages(),
        vec![ClientMessage::InventorySlot {
            user,
            slot: 4,
            item: stack
        }]
    );
}

#[test]
fn test_restored_position_drops_later_accepted_write() {
    let pos = BlockPos::new(2, 64, 2);
    let storage = InMemoryWorld::new().with_block(pos, BlockState::of("stone"));
    let sink = RecordingClientSink::new();
    let mut world = WorldMediator::new(CaptureConfig::default(), storage)
        .unwrap()
        .with_client_sink(sink.clone());
    world.subscribe(|event: &mut WorldEvent<'_>| {
        if let WorldEvent::ChangeBlock(e) = event {
            if e.kind() == &ChangeBlockKind::Break {
                e.invalidate_where(|_| true);
            }
        }
    });

    let user = UserId::generate();
    let stack = ItemStack::new("torch", 16);
    world
        .process_player_action(PlayerAction::place(user, 1, Some(stack.clone())), |world| {
            // stone -> air (break), air -> torch (place) at one position
            world.set_block_state(pos, BlockState::air(), UpdateFlags::all())?;
            world.set_block_state(pos, BlockState::of("torch"), UpdateFlags::all())
        })
        .unwrap();

    // The rejected break brings back stone; the placement on top of it is dropped.
    assert_eq!(world.storage().block_state(pos), BlockState::of("stone"));
    assert_eq!(world.creator(pos), None);
    assert_eq!(
        world.events().kinds(),
        vec!["change_block.break", "change_block.place", "change_block.post"]
    );
    assert_eq!(
        sink.messages(),
        vec![
            ClientMessage::BlockChange {
                user,
                pos,
                state: BlockState::of("stone")
            },
            ClientMessage::InventorySlot {
                user,
                slot: 1,
                item: stack
            },
        ]
    );
}
