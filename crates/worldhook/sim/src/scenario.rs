//! Scripted scenarios
//!
//! A scenario is a JSON document describing an initial world, the engine
//! block behaviours in play, plugin listener rules and a list of steps. Each
//! step maps onto one tick unit of the mediator.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use worldhook_capture::{BlockBehavior, CaptureResult, Weather, WorldAccess};
use worldhook_types::{BlockPos, BlockState, Direction, ItemStack, UpdateFlags};

/// A replayable scenario
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Display name
    #[serde(default)]
    pub name: String,

    /// Blocks present before the first step
    #[serde(default)]
    pub blocks: Vec<BlockWrite>,

    /// Scripted behaviour per block type
    #[serde(default)]
    pub behaviors: BTreeMap<String, ScriptedBlock>,

    /// Listener rules applied to every dispatched event
    #[serde(default)]
    pub listeners: ListenerRules,

    /// Steps in replay order
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Parse a scenario from JSON text
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("invalid scenario document")
    }

    /// Read and parse a scenario file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_json(&text)
    }
}

/// One block write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockWrite {
    /// Target position
    pub pos: BlockPos,
    /// State to write
    pub state: BlockState,
}

/// What the scripted plugin listeners do
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListenerRules {
    /// Event kinds to cancel, matched exactly or by `kind.` prefix
    #[serde(default)]
    pub cancel: Vec<String>,

    /// Positions whose block transactions are rejected individually
    #[serde(default)]
    pub reject: Vec<BlockPos>,
}

impl ListenerRules {
    /// Whether an event of `kind` is cancelled by these rules
    pub fn cancels(&self, kind: &str) -> bool {
        self.cancel.iter().any(|rule| {
            kind == rule
                || kind
                    .strip_prefix(rule.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }
}

/// A scripted step
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Plugin API write
    SetBlock {
        /// Plugin making the call
        plugin: String,
        /// Target position
        pos: BlockPos,
        /// New state
        state: BlockState,
        /// Whether neighbours are notified
        #[serde(default = "default_true")]
        notify: bool,
    },
    /// A connected player digs
    Dig {
        /// Player name
        player: String,
        /// Writes the dig makes
        writes: Vec<BlockWrite>,
    },
    /// A connected player places from a hotbar slot
    Place {
        /// Player name
        player: String,
        /// Inventory slot
        #[serde(default)]
        slot: u32,
        /// Held stack before placing
        #[serde(default)]
        item: Option<ItemStack>,
        /// Writes the placement makes
        writes: Vec<BlockWrite>,
    },
    /// A plugin command
    Command {
        /// Plugin running the command
        plugin: String,
        /// Writes the command makes
        writes: Vec<BlockWrite>,
    },
    /// A world-generation populator pass
    Populate {
        /// Populator kind
        kind: String,
        /// Writes the populator makes
        writes: Vec<BlockWrite>,
    },
    /// A scheduled or random block tick
    TickBlock {
        /// Ticked position
        pos: BlockPos,
        /// Random tick
        #[serde(default)]
        random: bool,
    },
    /// The host updated the weather
    Weather {
        /// New weather
        weather: Weather,
        /// Remaining ticks
        duration: u64,
    },
    /// Advance world time
    AdvanceTime {
        /// Ticks to advance
        ticks: u64,
    },
}

impl Step {
    /// Operation name, as written in the scenario
    pub fn op(&self) -> &'static str {
        match self {
            Step::SetBlock { .. } => "set_block",
            Step::Dig { .. } => "dig",
            Step::Place { .. } => "place",
            Step::Command { .. } => "command",
            Step::Populate { .. } => "populate",
            Step::TickBlock { .. } => "tick_block",
            Step::Weather { .. } => "weather",
            Step::AdvanceTime { .. } => "advance_time",
        }
    }
}

fn default_true() -> bool {
    true
}

/// A write relative to the block running a hook
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelativeWrite {
    /// Face of the hooked block to write to
    pub direction: Direction,
    /// State to write
    pub state: BlockState,
}

/// Engine behaviour of a block type, driven by the scenario
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptedBlock {
    /// Whether the block carries a tile entity
    #[serde(default)]
    pub tile_entity: bool,

    /// Write made when the block is committed
    #[serde(default)]
    pub on_added: Option<RelativeWrite>,

    /// Write made on every scheduled or random tick
    #[serde(default)]
    pub on_tick: Option<RelativeWrite>,
}

impl ScriptedBlock {
    fn apply(
        write: Option<&RelativeWrite>,
        world: &mut dyn WorldAccess,
        pos: BlockPos,
    ) -> CaptureResult<()> {
        if let Some(write) = write {
            let target = pos.offset(write.direction);
            world.set_block_state(target, write.state.clone(), UpdateFlags::all())?;
        }
        Ok(())
    }
}

impl BlockBehavior for ScriptedBlock {
    fn has_tile_entity(&self, _state: &BlockState) -> bool {
        self.tile_entity
    }

    fn on_block_added(
        &self,
        world: &mut dyn WorldAccess,
        pos: BlockPos,
        _state: &BlockState,
    ) -> CaptureResult<()> {
        Self::apply(self.on_added.as_ref(), world, pos)
    }

    fn on_scheduled_tick(
        &self,
        world: &mut dyn WorldAccess,
        pos: BlockPos,
        _state: &BlockState,
    ) -> CaptureResult<()> {
        Self::apply(self.on_tick.as_ref(), world, pos)
    }
}
