//! # Worldhook Types
//!
//! Core data model for the Worldhook capture-and-event pipeline.
//!
//! Low-level world mutations (block writes, entity spawns) are captured while a
//! unit of work runs, turned into [`Transaction`]s over immutable snapshots, and
//! handed to plugin listeners together with a [`CauseChain`] that explains who
//! or what triggered them.
//!
//! ## Module Organization
//!
//! - [`ids`]: World, user, entity, plugin and populator identifiers
//! - [`position`]: Block and entity coordinates, directions and world bounds
//! - [`block`]: Block types and block states
//! - [`cause`]: The ordered, append-only cause chain
//! - [`snapshot`]: Immutable block and entity snapshots plus capture tags
//! - [`transaction`]: Original/final snapshot pairs with validity
//! - [`config`]: Capture configuration
//! - [`errors`]: Error types for the types layer

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block;
pub mod cause;
pub mod config;
pub mod errors;
pub mod ids;
pub mod position;
pub mod snapshot;
pub mod transaction;

// Re-export commonly used types
pub use block::{BlockState, BlockType, LightProperties};
pub use cause::{CauseChain, CauseValue, NamedCause};
pub use config::{CaptureConfig, WorldMode};
pub use errors::{WorldhookError, WorldhookResult};
pub use ids::{EntityId, PluginId, PopulatorKind, UserId, WorldId};
pub use position::{BlockPos, ChunkPos, Direction, Rotation, Vec3};
pub use snapshot::{
    Blob, BlockSnapshot, BlockSnapshotBuilder, CaptureType, EntityKind, EntitySnapshot, ItemStack,
    UpdateFlags,
};
pub use transaction::Transaction;

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for Worldhook types
    pub use super::block::{BlockState, BlockType, LightProperties};
    pub use super::cause::{CauseChain, CauseValue, NamedCause};
    pub use super::config::{CaptureConfig, WorldMode};
    pub use super::errors::{WorldhookError, WorldhookResult};
    pub use super::ids::{EntityId, PluginId, PopulatorKind, UserId, WorldId};
    pub use super::position::{BlockPos, ChunkPos, Direction, Rotation, Vec3};
    pub use super::snapshot::{
        Blob, BlockSnapshot, CaptureType, EntityKind, EntitySnapshot, ItemStack, UpdateFlags,
    };
    pub use super::transaction::Transaction;
}
