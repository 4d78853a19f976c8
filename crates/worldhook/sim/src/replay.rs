//! Scenario replay against the in-memory world

use crate::scenario::{BlockWrite, ListenerRules, Scenario, Step};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use worldhook_capture::prelude::*;
use worldhook_capture::{EventBusStats, EventRecord};

/// Outcome of one replayed step
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    /// Position in the scenario
    pub index: usize,
    /// Operation name
    pub op: &'static str,
    /// Writes the interceptor accepted
    pub accepted: usize,
    /// Error the step ended with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything a replay produced
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    /// Scenario name
    pub scenario: String,
    /// Player names and the ids they were given
    pub players: BTreeMap<String, UserId>,
    /// Per-step outcomes
    pub steps: Vec<StepOutcome>,
    /// Dispatch log in post order
    pub events: Vec<EventRecord>,
    /// Event bus statistics
    pub stats: EventBusStats,
    /// Weather after the last step
    pub weather: Weather,
    /// Non-air blocks after the last step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<BlockWrite>>,
}

/// Drives one mediator through a scenario
pub struct Replay {
    world: WorldMediator<InMemoryWorld>,
    players: BTreeMap<String, UserId>,
}

impl Replay {
    /// Build the world described by `scenario`
    pub fn new(config: CaptureConfig, scenario: &Scenario) -> CaptureResult<Self> {
        let storage = scenario
            .blocks
            .iter()
            .fold(InMemoryWorld::new(), |storage, write| {
                storage.with_block(write.pos, write.state.clone())
            });
        let mut world = WorldMediator::new(config, storage)?;

        for (block, behavior) in &scenario.behaviors {
            world.register_block(block.clone(), behavior.clone());
        }
        world.subscribe(scripted_listener(scenario.listeners.clone()));

        Ok(Self {
            world,
            players: BTreeMap::new(),
        })
    }

    /// The mediator being driven
    pub fn world(&self) -> &WorldMediator<InMemoryWorld> {
        &self.world
    }

    /// Replay every step, collecting outcomes
    ///
    /// A failing step is recorded and the replay moves on; the mediator has
    /// already discarded the failed tick unit.
    pub fn run(&mut self, scenario: &Scenario) -> Vec<StepOutcome> {
        info!(scenario = %scenario.name, steps = scenario.steps.len(), "Replaying scenario");
        scenario
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let outcome = match self.run_step(step) {
                    Ok(accepted) => StepOutcome {
                        index,
                        op: step.op(),
                        accepted,
                        error: None,
                    },
                    Err(e) => {
                        warn!(index, op = step.op(), error = %e, fatal = e.is_fatal(), "Step failed");
                        StepOutcome {
                            index,
                            op: step.op(),
                            accepted: 0,
                            error: Some(e.to_string()),
                        }
                    }
                };
                debug!(index, op = step.op(), accepted = outcome.accepted, "Step replayed");
                outcome
            })
            .collect()
    }

    /// Assemble the report
    pub fn report(&self, scenario: &Scenario, steps: Vec<StepOutcome>, include_blocks: bool) -> ReplayReport {
        let blocks = include_blocks.then(|| {
            let mut blocks: Vec<BlockWrite> = self
                .world
                .storage()
                .blocks()
                .filter(|(_, state)| !state.is_air())
                .map(|(pos, state)| BlockWrite {
                    pos: *pos,
                    state: state.clone(),
                })
                .collect();
            blocks.sort_by_key(|write| write.pos);
            blocks
        });

        ReplayReport {
            scenario: scenario.name.clone(),
            players: self.players.clone(),
            steps,
            events: self.world.events().records().iter().cloned().collect(),
            stats: self.world.events().stats(),
            weather: self.world.weather().current(),
            blocks,
        }
    }

    fn run_step(&mut self, step: &Step) -> CaptureResult<usize> {
        match step {
            Step::SetBlock {
                plugin,
                pos,
                state,
                notify,
            } => {
                let cause = CauseChain::source(CauseValue::Plugin(PluginId::new(plugin.as_str())));
                let accepted = self.world.set_block(*pos, state.clone(), *notify, cause)?;
                Ok(usize::from(accepted))
            }
            Step::Dig { player, writes } => {
                let action = PlayerAction::dig(self.player(player));
                self.world
                    .process_player_action(action, |world| write_all(world, writes, UpdateFlags::all()))
            }
            Step::Place {
                player,
                slot,
                item,
                writes,
            } => {
                let action = PlayerAction::place(self.player(player), *slot, item.clone());
                self.world
                    .process_player_action(action, |world| write_all(world, writes, UpdateFlags::all()))
            }
            Step::Command { plugin, writes } => {
                let source = CauseValue::Plugin(PluginId::new(plugin.as_str()));
                self.world
                    .run_command(source, |world| write_all(world, writes, UpdateFlags::all()))
            }
            Step::Populate { kind, writes } => self
                .world
                .run_populator(PopulatorKind::new(kind.as_str()), |world| {
                    write_all(world, writes, UpdateFlags::clients_only())
                }),
            Step::TickBlock { pos, random } => {
                self.world.tick_block(*pos, *random)?;
                Ok(0)
            }
            Step::Weather { weather, duration } => {
                let applied = self.world.update_weather(*weather, *duration);
                Ok(usize::from(applied == *weather))
            }
            Step::AdvanceTime { ticks } => {
                self.world.advance_time(*ticks);
                Ok(0)
            }
        }
    }

    fn player(&mut self, name: &str) -> UserId {
        *self
            .players
            .entry(name.to_string())
            .or_insert_with(UserId::generate)
    }
}

fn write_all(
    world: &mut WorldMediator<InMemoryWorld>,
    writes: &[BlockWrite],
    flags: UpdateFlags,
) -> CaptureResult<usize> {
    let mut accepted = 0;
    for write in writes {
        if world.set_block_state(write.pos, write.state.clone(), flags)? {
            accepted += 1;
        }
    }
    Ok(accepted)
}

/// Plugin listener applying the scenario's rules
fn scripted_listener(rules: ListenerRules) -> impl Fn(&mut WorldEvent<'_>) + 'static {
    move |event: &mut WorldEvent<'_>| {
        if let WorldEvent::ChangeBlock(e) = event {
            if e.kind() != &ChangeBlockKind::Post && !rules.reject.is_empty() {
                e.invalidate_where(|tx| rules.reject.contains(&tx.original().position()));
            }
        }
        if rules.cancels(&event.kind()) {
            event.set_cancelled(true);
        }
    }
}
