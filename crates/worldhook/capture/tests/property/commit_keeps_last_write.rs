//! Property tests: accepted drain passes keep the last write per position.

use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use worldhook_capture::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn arb_state() -> impl Strategy<Value = BlockState> {
    prop_oneof![
        Just(BlockState::air()),
        Just(BlockState::of("stone")),
        Just(BlockState::of("log").with_property("axis", "y")),
        Just(BlockState::of("log").with_property("axis", "x")),
    ]
}

fn arb_writes() -> impl Strategy<Value = Vec<(BlockPos, BlockState)>> {
    let pos = (0i32..4).prop_map(|x| BlockPos::new(x, 70, 0));
    prop::collection::vec((pos, arb_state()), 1..20)
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Without listeners, every position ends at its last written state and
    /// each captured write shows up in exactly one tag event.
    #[test]
    fn property_last_write_survives_commit(writes in arb_writes()) {
        let mut world = WorldMediator::new(CaptureConfig::default(), InMemoryWorld::new()).unwrap();
        let source = CauseValue::Plugin(PluginId::new("terraform"));

        let mut captured = 0usize;
        world
            .run_command(source, |world| {
                for (pos, state) in &writes {
                    if world.set_block_state(*pos, state.clone(), UpdateFlags::none())? {
                        captured += 1;
                    }
                }
                Ok(())
            })
            .unwrap();

        let expected: HashMap<BlockPos, BlockState> = writes.iter().cloned().collect();
        for (pos, state) in &expected {
            prop_assert_eq!(&world.storage().block_state(*pos), state);
        }

        let carried: usize = world
            .events()
            .records()
            .iter()
            .filter(|r| r.kind != "change_block.post")
            .map(|r| r.size)
            .sum();
        prop_assert_eq!(carried, captured);
    }

    /// Populator passes report one transaction per distinct position.
    #[test]
    fn property_populator_keys_by_position(writes in arb_writes()) {
        let mut world = WorldMediator::new(CaptureConfig::default(), InMemoryWorld::new()).unwrap();

        world
            .run_populator(PopulatorKind::new("forest"), |world| {
                for (pos, state) in &writes {
                    world.set_block_state(*pos, state.clone(), UpdateFlags::clients_only())?;
                }
                Ok(())
            })
            .unwrap();

        let mut live = HashSet::new();
        let mut current: HashMap<BlockPos, BlockState> = HashMap::new();
        for (pos, state) in &writes {
            let before = current.get(pos).cloned().unwrap_or_else(BlockState::air);
            if &before != state {
                live.insert(*pos);
                current.insert(*pos, state.clone());
            }
        }

        let records = world.events().records_of("change_block.populate.forest");
        if live.is_empty() {
            prop_assert!(records.is_empty());
        } else {
            prop_assert_eq!(records.len(), 1);
            prop_assert_eq!(records[0].size, live.len());
        }
    }
}
