//! Capture configuration
//!
//! Knobs that control how a mediator captures and reports world mutations.

use crate::errors::{WorldhookError, WorldhookResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default bound on nested capture drains
pub const DEFAULT_MAX_CAPTURE_DEPTH: u32 = 32;

/// Default number of dispatch records an event bus keeps
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 4096;

/// World mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorldMode {
    /// Regular world accepting writes
    #[default]
    Normal,
    /// Reserved debug world; every block write is rejected
    Debug,
}

impl fmt::Display for WorldMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorldMode::Normal => write!(f, "normal"),
            WorldMode::Debug => write!(f, "debug"),
        }
    }
}

/// Configuration of one world mediator
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Whether this is the authoritative (server-side) world
    ///
    /// Non-authoritative worlds call straight through every hook.
    pub authoritative: bool,

    /// World mode
    pub world_mode: WorldMode,

    /// Maximum nesting depth of capture drains before aborting the tick unit
    pub max_capture_depth: u32,

    /// Whether entity spawns inside a tick unit are buffered for events
    pub capture_entity_spawns: bool,

    /// Whether neighbour notification fires a cancelable event
    pub fire_neighbor_events: bool,

    /// Audit-log every committed block action
    pub log_block_actions: bool,

    /// Audit-log every admitted entity spawn
    pub log_entity_spawns: bool,

    /// Dispatch records kept by the event bus; the oldest are dropped first
    pub event_log_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            authoritative: true,
            world_mode: WorldMode::Normal,
            max_capture_depth: DEFAULT_MAX_CAPTURE_DEPTH,
            capture_entity_spawns: true,
            fire_neighbor_events: true,
            log_block_actions: false,
            log_entity_spawns: false,
            event_log_capacity: DEFAULT_EVENT_LOG_CAPACITY,
        }
    }
}

impl CaptureConfig {
    /// Configuration for a client-side (non-authoritative) world
    pub fn client() -> Self {
        Self {
            authoritative: false,
            ..Default::default()
        }
    }

    /// Configuration for a debug world
    pub fn debug_world() -> Self {
        Self {
            world_mode: WorldMode::Debug,
            ..Default::default()
        }
    }

    /// Whether the world rejects every write
    pub fn is_debug_world(&self) -> bool {
        self.world_mode == WorldMode::Debug
    }

    /// Validate the configuration
    pub fn validate(&self) -> WorldhookResult<()> {
        if self.max_capture_depth == 0 {
            return Err(WorldhookError::InvalidConfiguration {
                reason: "max_capture_depth must be greater than 0".to_string(),
            });
        }
        if self.event_log_capacity == 0 {
            return Err(WorldhookError::InvalidConfiguration {
                reason: "event_log_capacity must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}
