//! Events dispatched to plugin listeners, and the synchronous event bus
//!
//! Events are plain records. A listener receives `&mut WorldEvent` and may
//! cancel it or edit it in place (invalidate transactions, remove entities,
//! drop notification directions) before the post call returns. The mediator
//! checks the verdict after every post.

use crate::entity::Entity;
use crate::traits::EventListener;
use crate::weather::Weather;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::trace;
use uuid::Uuid;
use worldhook_types::config::DEFAULT_EVENT_LOG_CAPACITY;
use worldhook_types::{
    BlockPos, BlockSnapshot, CaptureType, CauseChain, Direction, EntityId, EntitySnapshot,
    PopulatorKind, Transaction, Vec3, WorldId,
};

/// Cancellation verdict shared by every event
pub trait Cancellable {
    /// Whether a listener cancelled the event
    fn is_cancelled(&self) -> bool;

    /// Set the verdict
    fn set_cancelled(&mut self, cancelled: bool);
}

macro_rules! impl_cancellable {
    ($($event:ty),* $(,)?) => {
        $(
            impl Cancellable for $event {
                fn is_cancelled(&self) -> bool {
                    self.cancelled
                }

                fn set_cancelled(&mut self, cancelled: bool) {
                    self.cancelled = cancelled;
                }
            }
        )*
    };
}

/// Which aggregate block event this is
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChangeBlockKind {
    /// Blocks replaced by air
    Break,
    /// Same block type, different properties
    Modify,
    /// New block types placed
    Place,
    /// Blocks decayed into air
    Decay,
    /// Combined event over every transaction of the drain pass
    Post,
    /// World-generation writes of one populator kind
    Populate(PopulatorKind),
}

impl ChangeBlockKind {
    /// Kind of event dispatched for a capture tag
    ///
    /// Populate events are keyed by populator kind and have no fixed mapping.
    pub fn for_capture(capture_type: CaptureType) -> Option<Self> {
        match capture_type {
            CaptureType::Break => Some(Self::Break),
            CaptureType::Modify => Some(Self::Modify),
            CaptureType::Place => Some(Self::Place),
            CaptureType::Decay => Some(Self::Decay),
            CaptureType::Populate => None,
        }
    }

    /// Short name (`"break"`, `"post"`, ...)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Break => "break",
            Self::Modify => "modify",
            Self::Place => "place",
            Self::Decay => "decay",
            Self::Post => "post",
            Self::Populate(_) => "populate",
        }
    }
}

/// Aggregate event over a batch of same-tag block transactions
#[derive(Clone, Debug)]
pub struct ChangeBlockEvent {
    kind: ChangeBlockKind,
    cause: CauseChain,
    world_id: WorldId,
    transactions: Vec<Transaction<BlockSnapshot>>,
    cancelled: bool,
}

impl ChangeBlockEvent {
    /// Create an uncancelled event
    pub fn new(
        kind: ChangeBlockKind,
        cause: CauseChain,
        world_id: WorldId,
        transactions: Vec<Transaction<BlockSnapshot>>,
    ) -> Self {
        Self {
            kind,
            cause,
            world_id,
            transactions,
            cancelled: false,
        }
    }

    /// Event kind
    pub fn kind(&self) -> &ChangeBlockKind {
        &self.kind
    }

    /// Cause chain
    pub fn cause(&self) -> &CauseChain {
        &self.cause
    }

    /// World the transactions belong to
    pub fn world_id(&self) -> WorldId {
        self.world_id
    }

    /// Transactions in capture order
    pub fn transactions(&self) -> &[Transaction<BlockSnapshot>] {
        &self.transactions
    }

    /// Transactions, editable in place
    ///
    /// The list itself has a fixed length; reject an entry by invalidating it.
    pub fn transactions_mut(&mut self) -> &mut [Transaction<BlockSnapshot>] {
        &mut self.transactions
    }

    /// Invalidate every transaction matching `predicate`
    pub fn invalidate_where(&mut self, predicate: impl Fn(&Transaction<BlockSnapshot>) -> bool) {
        for transaction in self.transactions.iter_mut() {
            if predicate(transaction) {
                transaction.invalidate();
            }
        }
    }

    /// Take the (possibly edited) transactions back
    pub fn into_transactions(self) -> Vec<Transaction<BlockSnapshot>> {
        self.transactions
    }
}

/// Which entity event this is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpawnKind {
    /// Spawn with no more specific origin
    Custom,
    /// Natural spawning by the world spawner
    Spawner,
    /// Entities spawned while a chunk loads
    ChunkLoad,
    /// Items dropped without destroying anything
    DropItemDispense,
    /// Items dropped because something was destroyed
    DropItemDestruct,
}

impl SpawnKind {
    /// Short name (`"spawn_entity.custom"`, `"drop_item.destruct"`, ...)
    pub fn name(&self) -> &'static str {
        match self {
            Self::Custom => "spawn_entity.custom",
            Self::Spawner => "spawn_entity.spawner",
            Self::ChunkLoad => "spawn_entity.chunk_load",
            Self::DropItemDispense => "drop_item.dispense",
            Self::DropItemDestruct => "drop_item.destruct",
        }
    }
}

/// Batch event over entities about to enter the world
#[derive(Debug)]
pub struct SpawnEntityEvent {
    kind: SpawnKind,
    cause: CauseChain,
    world_id: WorldId,
    entities: Vec<Entity>,
    snapshots: Vec<EntitySnapshot>,
    cancelled: bool,
}

impl SpawnEntityEvent {
    /// Create an uncancelled event
    pub fn new(
        kind: SpawnKind,
        cause: CauseChain,
        world_id: WorldId,
        entities: Vec<Entity>,
        snapshots: Vec<EntitySnapshot>,
    ) -> Self {
        Self {
            kind,
            cause,
            world_id,
            entities,
            snapshots,
            cancelled: false,
        }
    }

    /// Event kind
    pub fn kind(&self) -> SpawnKind {
        self.kind
    }

    /// Cause chain
    pub fn cause(&self) -> &CauseChain {
        &self.cause
    }

    /// World the entities will enter
    pub fn world_id(&self) -> WorldId {
        self.world_id
    }

    /// Candidate entities
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Candidate entities; listeners may remove entries or flag them removed
    pub fn entities_mut(&mut self) -> &mut Vec<Entity> {
        &mut self.entities
    }

    /// Snapshots taken when the event was built
    pub fn snapshots(&self) -> &[EntitySnapshot] {
        &self.snapshots
    }

    /// Take the (possibly edited) entities back
    pub fn into_entities(self) -> Vec<Entity> {
        self.entities
    }
}

/// Fired before the neighbours of a changed block are notified
#[derive(Clone, Debug)]
pub struct NotifyNeighborEvent {
    /// Cause chain
    pub cause: CauseChain,
    /// World
    pub world_id: WorldId,
    /// Changed block
    pub source: BlockPos,
    /// Directions that will be notified
    pub directions: Vec<Direction>,
    cancelled: bool,
}

impl NotifyNeighborEvent {
    /// Create an uncancelled event
    pub fn new(cause: CauseChain, world_id: WorldId, source: BlockPos, directions: Vec<Direction>) -> Self {
        Self {
            cause,
            world_id,
            source,
            directions,
            cancelled: false,
        }
    }

    /// Skip one direction
    pub fn remove_direction(&mut self, direction: Direction) {
        self.directions.retain(|d| *d != direction);
    }
}

/// Fired after an entity update moved the entity
#[derive(Clone, Debug)]
pub struct MoveEntityEvent {
    /// Cause chain
    pub cause: CauseChain,
    /// Moved entity
    pub entity_id: EntityId,
    /// Position before the update
    pub from: Vec3,
    /// Position after the update; listeners may redirect it
    pub to: Vec3,
    cancelled: bool,
}

impl MoveEntityEvent {
    /// Create an uncancelled event
    pub fn new(cause: CauseChain, entity_id: EntityId, from: Vec3, to: Vec3) -> Self {
        Self {
            cause,
            entity_id,
            from,
            to,
            cancelled: false,
        }
    }
}

/// Fired before a lightning bolt enters the world
#[derive(Clone, Debug)]
pub struct LightningEvent {
    /// Cause recorded when the bolt was spawned
    pub cause: CauseChain,
    /// Bolt
    pub entity_id: EntityId,
    /// Strike position
    pub position: Vec3,
    cancelled: bool,
}

impl LightningEvent {
    /// Create an uncancelled event
    pub fn new(cause: CauseChain, entity_id: EntityId, position: Vec3) -> Self {
        Self {
            cause,
            entity_id,
            position,
            cancelled: false,
        }
    }
}

/// Fired when the host changed the weather
#[derive(Clone, Debug)]
pub struct ChangeWeatherEvent {
    /// Cause chain
    pub cause: CauseChain,
    /// Weather before the change
    pub previous: Weather,
    /// New weather; listeners may replace it
    pub weather: Weather,
    /// Ticks the new weather lasts; listeners may replace it
    pub duration: u64,
    cancelled: bool,
}

impl ChangeWeatherEvent {
    /// Create an uncancelled event
    pub fn new(cause: CauseChain, previous: Weather, weather: Weather, duration: u64) -> Self {
        Self {
            cause,
            previous,
            weather,
            duration,
            cancelled: false,
        }
    }
}

impl_cancellable!(
    ChangeBlockEvent,
    SpawnEntityEvent,
    NotifyNeighborEvent,
    MoveEntityEvent,
    LightningEvent,
    ChangeWeatherEvent,
);

/// Any event, borrowed for the duration of one post
#[derive(Debug)]
pub enum WorldEvent<'a> {
    /// Aggregate block event
    ChangeBlock(&'a mut ChangeBlockEvent),
    /// Entity spawn or item drop
    SpawnEntity(&'a mut SpawnEntityEvent),
    /// Neighbour notification
    NotifyNeighbor(&'a mut NotifyNeighborEvent),
    /// Entity movement
    MoveEntity(&'a mut MoveEntityEvent),
    /// Lightning strike
    Lightning(&'a mut LightningEvent),
    /// Weather change
    ChangeWeather(&'a mut ChangeWeatherEvent),
}

impl WorldEvent<'_> {
    /// Kind name used in logs and statistics
    pub fn kind(&self) -> String {
        match self {
            WorldEvent::ChangeBlock(e) => match e.kind() {
                ChangeBlockKind::Populate(populator) => {
                    format!("change_block.populate.{}", populator)
                }
                other => format!("change_block.{}", other.name()),
            },
            WorldEvent::SpawnEntity(e) => e.kind().name().to_string(),
            WorldEvent::NotifyNeighbor(_) => "notify_neighbor".to_string(),
            WorldEvent::MoveEntity(_) => "move_entity".to_string(),
            WorldEvent::Lightning(_) => "lightning".to_string(),
            WorldEvent::ChangeWeather(_) => "change_weather".to_string(),
        }
    }

    /// Cause chain of the event
    pub fn cause(&self) -> &CauseChain {
        match self {
            WorldEvent::ChangeBlock(e) => e.cause(),
            WorldEvent::SpawnEntity(e) => e.cause(),
            WorldEvent::NotifyNeighbor(e) => &e.cause,
            WorldEvent::MoveEntity(e) => &e.cause,
            WorldEvent::Lightning(e) => &e.cause,
            WorldEvent::ChangeWeather(e) => &e.cause,
        }
    }

    /// Number of transactions or entities carried
    pub fn size(&self) -> usize {
        match self {
            WorldEvent::ChangeBlock(e) => e.transactions().len(),
            WorldEvent::SpawnEntity(e) => e.entities().len(),
            WorldEvent::NotifyNeighbor(e) => e.directions.len(),
            _ => 1,
        }
    }

    fn as_cancellable(&self) -> &dyn Cancellable {
        match self {
            WorldEvent::ChangeBlock(e) => &**e,
            WorldEvent::SpawnEntity(e) => &**e,
            WorldEvent::NotifyNeighbor(e) => &**e,
            WorldEvent::MoveEntity(e) => &**e,
            WorldEvent::Lightning(e) => &**e,
            WorldEvent::ChangeWeather(e) => &**e,
        }
    }

    fn as_cancellable_mut(&mut self) -> &mut dyn Cancellable {
        match self {
            WorldEvent::ChangeBlock(e) => &mut **e,
            WorldEvent::SpawnEntity(e) => &mut **e,
            WorldEvent::NotifyNeighbor(e) => &mut **e,
            WorldEvent::MoveEntity(e) => &mut **e,
            WorldEvent::Lightning(e) => &mut **e,
            WorldEvent::ChangeWeather(e) => &mut **e,
        }
    }
}

impl Cancellable for WorldEvent<'_> {
    fn is_cancelled(&self) -> bool {
        self.as_cancellable().is_cancelled()
    }

    fn set_cancelled(&mut self, cancelled: bool) {
        self.as_cancellable_mut().set_cancelled(cancelled)
    }
}

/// One dispatched event, as recorded in the bus log
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Record identity
    pub id: Uuid,
    /// Event kind name
    pub kind: String,
    /// Root cause, rendered
    pub root_cause: String,
    /// Transactions or entities carried
    pub size: usize,
    /// Final verdict
    pub cancelled: bool,
    /// When the event was posted
    pub posted_at: DateTime<Utc>,
}

/// Synchronous event bus
///
/// The dispatch log is a ring of at most `capacity` records; the counters
/// cover every event posted since the last [`EventBus::clear_log`].
pub struct EventBus {
    listeners: Vec<Box<dyn EventListener>>,
    event_log: VecDeque<EventRecord>,
    capacity: usize,
    event_counts: HashMap<String, u64>,
    total_count: u64,
    cancelled_count: u64,
}

impl EventBus {
    /// Create an event bus without listeners
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_LOG_CAPACITY)
    }

    /// Create an event bus keeping at most `capacity` dispatch records
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            listeners: Vec::new(),
            event_log: VecDeque::with_capacity(capacity.min(DEFAULT_EVENT_LOG_CAPACITY)),
            capacity,
            event_counts: HashMap::new(),
            total_count: 0,
            cancelled_count: 0,
        }
    }

    /// Register a closure listener
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: Fn(&mut WorldEvent<'_>) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Register a boxed listener
    pub fn register(&mut self, listener: Box<dyn EventListener>) {
        self.listeners.push(listener);
    }

    /// Post an event to every listener in registration order
    ///
    /// Returns whether the event ended up cancelled.
    pub fn post(&mut self, mut event: WorldEvent<'_>) -> bool {
        for listener in &self.listeners {
            listener.handle(&mut event);
        }

        let cancelled = event.is_cancelled();
        let kind = event.kind();
        trace!(kind = %kind, cancelled, size = event.size(), "Event posted");

        *self.event_counts.entry(kind.clone()).or_insert(0) += 1;
        self.total_count += 1;
        if cancelled {
            self.cancelled_count += 1;
        }
        if self.event_log.len() == self.capacity {
            self.event_log.pop_front();
        }
        self.event_log.push_back(EventRecord {
            id: Uuid::new_v4(),
            kind,
            root_cause: event.cause().root().to_string(),
            size: event.size(),
            cancelled,
            posted_at: Utc::now(),
        });
        cancelled
    }

    /// Retained dispatch log in post order
    pub fn records(&self) -> &VecDeque<EventRecord> {
        &self.event_log
    }

    /// Maximum number of retained records
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records of one kind
    pub fn records_of(&self, kind: &str) -> Vec<&EventRecord> {
        self.event_log.iter().filter(|r| r.kind == kind).collect()
    }

    /// Kind names in post order
    pub fn kinds(&self) -> Vec<&str> {
        self.event_log.iter().map(|r| r.kind.as_str()).collect()
    }

    /// Get total event count, including records dropped from the log
    pub fn event_count(&self) -> u64 {
        self.total_count
    }

    /// Get event counts by kind
    pub fn event_counts(&self) -> &HashMap<String, u64> {
        &self.event_counts
    }

    /// Drop the dispatch log and counters, keeping listeners
    pub fn clear_log(&mut self) {
        self.event_log.clear();
        self.event_counts.clear();
        self.total_count = 0;
        self.cancelled_count = 0;
    }

    /// Get statistics
    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            total_events: self.total_count,
            cancelled_events: self.cancelled_count,
            listener_count: self.listeners.len(),
            events_by_kind: self.event_counts.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event bus statistics
#[derive(Clone, Debug, Serialize)]
pub struct EventBusStats {
    /// Total events posted
    pub total_events: u64,
    /// Events that ended cancelled
    pub cancelled_events: u64,
    /// Registered listeners
    pub listener_count: usize,
    /// Events by kind
    pub events_by_kind: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use worldhook_types::{BlockState, CauseValue, PluginId};

    fn cause() -> CauseChain {
        CauseChain::source(CauseValue::Plugin(PluginId::new("test")))
    }

    fn break_event() -> ChangeBlockEvent {
        let world = WorldId::generate();
        let original = BlockSnapshot::builder(world, BlockPos::new(0, 64, 0), BlockState::of("stone"))
            .capture_type(CaptureType::Break)
            .build();
        let transaction = Transaction::new(original.clone(), original.with_state(BlockState::air()));
        ChangeBlockEvent::new(ChangeBlockKind::Break, cause(), world, vec![transaction])
    }

    #[test]
    fn test_post_without_listeners() {
        let mut bus = EventBus::new();
        let mut event = break_event();
        assert!(!bus.post(WorldEvent::ChangeBlock(&mut event)));
        assert_eq!(bus.event_count(), 1);
        assert_eq!(bus.kinds(), vec!["change_block.break"]);
        assert_eq!(bus.records()[0].root_cause, "plugin:test");
    }

    #[test]
    fn test_listener_cancels() {
        let mut bus = EventBus::new();
        bus.subscribe(|event: &mut WorldEvent<'_>| {
            if let WorldEvent::ChangeBlock(e) = event {
                if e.kind() == &ChangeBlockKind::Break {
                    e.set_cancelled(true);
                }
            }
        });

        let mut event = break_event();
        assert!(bus.post(WorldEvent::ChangeBlock(&mut event)));
        assert!(event.is_cancelled());
        assert_eq!(bus.stats().cancelled_events, 1);
    }

    #[test]
    fn test_listener_invalidates_in_place() {
        let mut bus = EventBus::new();
        bus.subscribe(|event: &mut WorldEvent<'_>| {
            if let WorldEvent::ChangeBlock(e) = event {
                e.invalidate_where(|tx| tx.original().position().y == 64);
            }
        });

        let mut event = break_event();
        assert!(!bus.post(WorldEvent::ChangeBlock(&mut event)));
        assert!(!event.transactions()[0].is_valid());
    }

    #[test]
    fn test_listeners_run_in_order() {
        let calls = Rc::new(Cell::new(0u32));
        let mut bus = EventBus::new();
        let first = Rc::clone(&calls);
        bus.subscribe(move |event: &mut WorldEvent<'_>| {
            first.set(first.get() * 10 + 1);
            event.set_cancelled(true);
        });
        let second = Rc::clone(&calls);
        bus.subscribe(move |event: &mut WorldEvent<'_>| {
            second.set(second.get() * 10 + 2);
            event.set_cancelled(false);
        });

        let mut event = break_event();
        assert!(!bus.post(WorldEvent::ChangeBlock(&mut event)));
        assert_eq!(calls.get(), 12);
    }

    #[test]
    fn test_event_counts() {
        let mut bus = EventBus::new();
        for _ in 0..3 {
            let mut event = break_event();
            bus.post(WorldEvent::ChangeBlock(&mut event));
        }
        let mut notify = NotifyNeighborEvent::new(
            cause(),
            WorldId::generate(),
            BlockPos::new(0, 64, 0),
            Direction::ALL.to_vec(),
        );
        bus.post(WorldEvent::NotifyNeighbor(&mut notify));

        assert_eq!(bus.event_counts().get("change_block.break"), Some(&3));
        assert_eq!(bus.event_counts().get("notify_neighbor"), Some(&1));
        assert_eq!(bus.stats().total_events, 4);

        bus.clear_log();
        assert_eq!(bus.event_count(), 0);
    }

    #[test]
    fn test_log_keeps_newest_records_up_to_capacity() {
        let mut bus = EventBus::with_capacity(2);
        for y in 0..5 {
            let mut notify = NotifyNeighborEvent::new(
                cause(),
                WorldId::generate(),
                BlockPos::new(0, y, 0),
                vec![Direction::Up],
            );
            bus.post(WorldEvent::NotifyNeighbor(&mut notify));
        }
        let mut event = break_event();
        bus.post(WorldEvent::ChangeBlock(&mut event));

        assert_eq!(bus.capacity(), 2);
        assert_eq!(bus.records().len(), 2);
        assert_eq!(bus.kinds(), vec!["notify_neighbor", "change_block.break"]);
        assert_eq!(bus.event_count(), 6);
        assert_eq!(bus.stats().total_events, 6);
        assert_eq!(bus.event_counts().get("notify_neighbor"), Some(&5));
    }

    #[test]
    fn test_records_serialize() {
        let mut bus = EventBus::new();
        let mut event = break_event();
        bus.post(WorldEvent::ChangeBlock(&mut event));

        let json = serde_json::to_value(&bus.records()[0]).unwrap();
        assert_eq!(json["kind"], "change_block.break");
        assert_eq!(json["size"], 1);
        assert_eq!(json["cancelled"], false);

        let back: EventRecord = serde_json::from_value(json).unwrap();
        assert_eq!(&back, &bus.records()[0]);
    }
}
