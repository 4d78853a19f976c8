//! # Worldhook Capture
//!
//! World-tick mediator for a voxel world simulation.
//!
//! Every block write and entity spawn the engine makes during a unit of work
//! (a block tick, an entity update, a player action, a command, a populator
//! pass) is intercepted by the [`WorldMediator`]. Writes are applied to
//! storage immediately but their secondary effects are deferred: the pre-write
//! state is snapshotted and classified, and at the end of the unit the
//! buffered transactions are handed to plugin listeners as aggregate events.
//! Listeners may cancel a whole batch (rolled back in reverse capture order),
//! reject individual transactions, or substitute replacement snapshots.
//! Accepted writes are then committed, which runs neighbour notifications and
//! block-added hooks; writes made by those hooks are captured again and
//! drained recursively up to a configured depth.
//!
//! ## Components
//!
//! - [`WorldMediator`]: Per-world capture buffers, tick context and event bus
//! - [`EventBus`]: Synchronous listener dispatch with a dispatch log
//! - [`TickContext`]: Capture modes and current-tick references
//! - [`CaptureBuffers`]: Pending block, entity and populator captures
//! - [`PendingView`]: Shadow block access while a batch commits
//! - [`EntityArena`]: Generation-checked live entity storage
//! - [`memory`]: In-memory storage, tracking and client collaborators
//!
//! ## Example
//!
//! ```rust,ignore
//! use worldhook_capture::prelude::*;
//!
//! let mut world = WorldMediator::new(CaptureConfig::default(), InMemoryWorld::new())?;
//! world.subscribe(|event: &mut WorldEvent<'_>| {
//!     if let WorldEvent::ChangeBlock(e) = event {
//!         if e.kind() == &ChangeBlockKind::Break {
//!             e.set_cancelled(true);
//!         }
//!     }
//! });
//!
//! let user = UserId::generate();
//! world.process_player_action(PlayerAction::dig(user), |world| {
//!     world.set_block_state(BlockPos::new(0, 64, 0), BlockState::air(), UpdateFlags::all())
//! })?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffers;
pub mod classify;
mod commit;
pub mod context;
mod dispatch;
pub mod entity;
pub mod errors;
pub mod events;
mod interceptor;
pub mod mediator;
pub mod memory;
pub mod registry;
mod spawn;
pub mod traits;
pub mod view;
pub mod weather;

// Re-export commonly used types
pub use buffers::{CaptureBuffers, PopulatorCapture};
pub use classify::classify;
pub use context::{PlayerAction, PlayerActionKind, TickContext, TickingTile};
pub use entity::{Entity, EntityArena, EntityHandle};
pub use errors::{CaptureError, CaptureResult};
pub use events::{
    Cancellable, ChangeBlockEvent, ChangeBlockKind, ChangeWeatherEvent, EventBus, EventBusStats,
    EventRecord, LightningEvent, MoveEntityEvent, NotifyNeighborEvent, SpawnEntityEvent,
    SpawnKind, WorldEvent,
};
pub use mediator::WorldMediator;
pub use memory::{ClientMessage, InMemoryTrackingStore, InMemoryWorld, NullClientSink, RecordingClientSink};
pub use registry::{BlockRegistry, InertBlock};
pub use traits::{
    BlockBehavior, BlockView, ClientSink, EntityBehavior, EventListener, TrackerKind,
    TrackingStore, WorldAccess, WorldStorage,
};
pub use view::PendingView;
pub use weather::{Weather, WeatherClock};

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for driving a mediator
    pub use super::context::{PlayerAction, PlayerActionKind};
    pub use super::entity::Entity;
    pub use super::errors::{CaptureError, CaptureResult};
    pub use super::events::{
        Cancellable, ChangeBlockEvent, ChangeBlockKind, EventBus, SpawnEntityEvent, SpawnKind,
        WorldEvent,
    };
    pub use super::mediator::WorldMediator;
    pub use super::memory::{InMemoryTrackingStore, InMemoryWorld, RecordingClientSink};
    pub use super::traits::{
        BlockBehavior, EntityBehavior, TrackerKind, TrackingStore, WorldAccess, WorldStorage,
    };
    pub use super::weather::Weather;
    pub use worldhook_types::prelude::*;
}
