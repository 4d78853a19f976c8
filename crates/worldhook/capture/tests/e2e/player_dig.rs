//! End-to-end test: a connected player digs, places and tosses.
//!
//! Covers attribution of dropped items to the acting player, hanging-entity
//! detachment, client reverts after a cancelled event and ownership tracking.

use std::cell::RefCell;
use std::rc::Rc;
use worldhook_capture::prelude::*;
use worldhook_capture::{ClientMessage, RecordingClientSink};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Chest;

impl BlockBehavior for Chest {
    fn has_tile_entity(&self, _state: &BlockState) -> bool {
        true
    }
}

fn grass_world(pos: BlockPos) -> WorldMediator<InMemoryWorld> {
    let storage = InMemoryWorld::new().with_block(pos, BlockState::of("grass"));
    WorldMediator::new(CaptureConfig::default(), storage).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_dig_drops_hanging_item_attributed_to_player() {
    let pos = BlockPos::new(0, 64, 0);
    let mut world = grass_world(pos);
    let mut frame = Entity::hanging(pos);
    frame.data = Some(Blob::new(vec![1, 2, 3]));
    let frame_id = world.insert_entity(frame);
    let user = UserId::generate();

    world
        .process_player_action(PlayerAction::dig(user), |world| {
            world.set_block_state(pos, BlockState::air(), UpdateFlags::all())
        })
        .unwrap();

    assert!(world.storage().block_state(pos).is_air());
    assert_eq!(
        world.events().kinds(),
        vec!["change_block.break", "notify_neighbor", "drop_item.destruct"]
    );

    assert!(world.entities().by_id(frame_id).is_none());
    let dropped: Vec<_> = world.entities().iter().collect();
    assert_eq!(dropped.len(), 1);
    assert!(dropped[0].kind.is_item());
    assert_eq!(dropped[0].creator, Some(user));
    assert_eq!(dropped[0].data, Some(Blob::new(vec![1, 2, 3])));

    // Nobody owned the grass, and breaking never assigns an owner.
    assert_eq!(world.creator(pos), None);
    assert!(world.buffers().is_empty());
    assert!(!world.context().in_tick_unit());
}

#[test]
fn test_cancelled_break_restores_block_and_tile_for_client() {
    let pos = BlockPos::new(2, 64, 2);
    let mut storage = InMemoryWorld::new().with_block(pos, BlockState::of("chest"));
    storage.put_tile(pos, Blob::new(vec![9, 9]));
    let sink = RecordingClientSink::new();
    let mut world = WorldMediator::new(CaptureConfig::default(), storage)
        .unwrap()
        .with_client_sink(sink.clone());
    world.register_block("chest", Chest);
    world.subscribe(|event: &mut WorldEvent<'_>| {
        if let WorldEvent::ChangeBlock(e) = event {
            if e.kind() == &ChangeBlockKind::Break {
                e.set_cancelled(true);
            }
        }
    });

    let user = UserId::generate();
    world
        .process_player_action(PlayerAction::dig(user), |world| {
            world.set_block_state(pos, BlockState::air(), UpdateFlags::all())
        })
        .unwrap();

    assert_eq!(world.storage().block_state(pos), BlockState::of("chest"));
    assert_eq!(world.storage().tile_data(pos), Some(Blob::new(vec![9, 9])));
    assert_eq!(
        sink.messages(),
        vec![
            ClientMessage::BlockChange {
                user,
                pos,
                state: BlockState::of("chest"),
            },
            ClientMessage::TileDescription { user, pos },
        ]
    );
    assert_eq!(world.events().kinds(), vec!["change_block.break"]);
}

#[test]
fn test_cancelled_break_discards_drops() {
    let pos = BlockPos::new(0, 64, 0);
    let mut world = grass_world(pos);
    let mut frame = Entity::hanging(pos);
    frame.data = Some(Blob::new(vec![4]));
    world.insert_entity(frame);
    world.subscribe(|event: &mut WorldEvent<'_>| {
        if let WorldEvent::ChangeBlock(e) = event {
            e.set_cancelled(true);
        }
    });

    let user = UserId::generate();
    world
        .process_player_action(PlayerAction::dig(user), |world| {
            world.spawn_entity(Entity::item(pos.center()), CauseChain::source(CauseValue::Player(user)))?;
            world.set_block_state(pos, BlockState::air(), UpdateFlags::all())
        })
        .unwrap();

    // The frame stays because detachment only follows an accepted break.
    assert_eq!(world.entities().len(), 1);
    assert_eq!(world.entities().hanging_at(pos).len(), 1);
    assert!(world.buffers().is_empty());
}

#[test]
fn test_placement_records_owner_and_notifier() {
    let pos = BlockPos::new(5, 70, -5);
    let mut world = WorldMediator::new(CaptureConfig::default(), InMemoryWorld::new()).unwrap();
    let user = UserId::generate();

    world
        .process_player_action(
            PlayerAction::place(user, 1, Some(ItemStack::new("torch", 3))),
            |world| world.set_block_state(pos, BlockState::of("torch"), UpdateFlags::all()),
        )
        .unwrap();

    assert_eq!(world.creator(pos), Some(user));
    assert_eq!(world.notifier(pos), Some(user));
    assert_eq!(world.create_snapshot(pos).creator(), Some(user));
}

#[test]
fn test_tossed_item_is_dispensed_and_revertible() {
    let user = UserId::generate();
    let stack = ItemStack::new("diamond", 1);
    let sink = RecordingClientSink::new();
    let mut world = WorldMediator::new(CaptureConfig::default(), InMemoryWorld::new())
        .unwrap()
        .with_client_sink(sink.clone());
    let cancel = Rc::new(RefCell::new(false));
    let flag = Rc::clone(&cancel);
    world.subscribe(move |event: &mut WorldEvent<'_>| {
        if let WorldEvent::SpawnEntity(e) = event {
            if *flag.borrow() {
                e.set_cancelled(true);
            }
        }
    });

    let toss = PlayerAction {
        user,
        kind: PlayerActionKind::DropItem {
            slot: 0,
            item_before: Some(stack.clone()),
        },
    };
    let position = Vec3::new(0.5, 65.0, 0.5);

    world
        .process_player_action(toss.clone(), |world| {
            world.spawn_entity(Entity::item(position), CauseChain::source(CauseValue::Player(user)))
        })
        .unwrap();
    assert_eq!(world.events().kinds(), vec!["drop_item.dispense"]);
    assert_eq!(world.entities().len(), 1);

    *cancel.borrow_mut() = true;
    world
        .process_player_action(toss, |world| {
            world.spawn_entity(Entity::item(position), CauseChain::source(CauseValue::Player(user)))
        })
        .unwrap();
    assert_eq!(world.entities().len(), 1);
    assert_eq!(
        sink.messages(),
        vec![ClientMessage::InventorySlot {
            user,
            slot: 0,
            item: stack
        }]
    );
}

#[test]
fn test_api_write_with_player_root_is_rejected() {
    let pos = BlockPos::new(0, 64, 0);
    let mut world = grass_world(pos);
    let user = UserId::generate();

    let err = world
        .set_block(pos, BlockState::of("stone"), true, CauseChain::source(CauseValue::Player(user)))
        .unwrap_err();

    assert!(matches!(err, CaptureError::PluginCauseRequired { .. }));
    assert_eq!(world.storage().block_state(pos), BlockState::of("grass"));
    assert_eq!(world.events().event_count(), 0);
}
