//! Property tests: cancelling every block event leaves the world as it was.
//!
//! Whatever mix of break, modify and place writes a tick unit makes, a
//! listener that cancels all aggregate block events must see every touched
//! position restored to its state before the unit began.

use proptest::prelude::*;
use std::collections::HashMap;
use worldhook_capture::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn arb_state() -> impl Strategy<Value = BlockState> {
    prop_oneof![
        Just(BlockState::air()),
        Just(BlockState::of("stone")),
        Just(BlockState::of("dirt")),
        Just(BlockState::of("wool").with_property("color", "red")),
        Just(BlockState::of("wool").with_property("color", "blue")),
    ]
}

fn arb_pos() -> impl Strategy<Value = BlockPos> {
    (0i32..3, 0i32..3).prop_map(|(x, z)| BlockPos::new(x, 64, z))
}

fn arb_writes() -> impl Strategy<Value = Vec<(BlockPos, BlockState)>> {
    prop::collection::vec((arb_pos(), arb_state()), 1..16)
}

fn arb_initial() -> impl Strategy<Value = Vec<(BlockPos, BlockState)>> {
    prop::collection::vec((arb_pos(), arb_state()), 0..9)
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Cancelled drain passes restore every touched position.
    #[test]
    fn property_cancel_all_restores_initial_world(
        initial in arb_initial(),
        writes in arb_writes(),
        flags_all in any::<bool>(),
    ) {
        let mut storage = InMemoryWorld::new();
        for (pos, state) in &initial {
            storage.put(*pos, state.clone());
        }
        let before: HashMap<BlockPos, BlockState> = writes
            .iter()
            .map(|(pos, _)| (*pos, storage.block_state(*pos)))
            .collect();

        let mut world = WorldMediator::new(CaptureConfig::default(), storage).unwrap();
        world.subscribe(|event: &mut WorldEvent<'_>| {
            if let WorldEvent::ChangeBlock(e) = event {
                e.set_cancelled(true);
            }
        });

        let flags = if flags_all { UpdateFlags::all() } else { UpdateFlags::none() };
        let user = UserId::generate();
        world
            .process_player_action(PlayerAction::dig(user), |world| {
                for (pos, state) in &writes {
                    world.set_block_state(*pos, state.clone(), flags)?;
                }
                Ok(())
            })
            .unwrap();

        for (pos, state) in &before {
            prop_assert_eq!(&world.storage().block_state(*pos), state);
        }
        prop_assert!(world.buffers().is_empty());
        prop_assert!(!world.context().in_tick_unit());
        prop_assert!(world.events().kinds().iter().all(|k| k.starts_with("change_block.")));
    }

    /// Writing the state already present never captures or dispatches.
    #[test]
    fn property_identical_write_is_noop(
        pos in arb_pos(),
        state in arb_state(),
    ) {
        let storage = InMemoryWorld::new().with_block(pos, state.clone());
        let mut world = WorldMediator::new(CaptureConfig::default(), storage).unwrap();

        let written = world.set_block_state(pos, state, UpdateFlags::all()).unwrap();

        prop_assert!(!written);
        prop_assert!(world.buffers().is_empty());
        prop_assert_eq!(world.storage().raw_writes(), 0);
        prop_assert_eq!(world.events().event_count(), 0);
    }
}
