//! Cause chains
//!
//! A [`CauseChain`] is the ordered attribution record answering "what chain
//! of actors led to this mutation". The first entry is the root and always
//! exists. Chains are immutable: [`CauseChain::with`] returns a new chain and
//! never overwrites an existing name; colliding names are renamed
//! (`Source` -> `AdditionalSource` -> `PreviousSource` -> `PreviousSource1` ...).

use crate::block::BlockType;
use crate::errors::{WorldhookError, WorldhookResult};
use crate::ids::{EntityId, PluginId, UserId, WorldId};
use crate::position::BlockPos;
use crate::snapshot::{BlockSnapshot, EntityKind};
use serde::Serialize;
use std::fmt;

/// Well-known cause names
pub struct NamedCause;

impl NamedCause {
    /// The direct source of a mutation
    pub const SOURCE: &'static str = "Source";
    /// A former source, pushed down by a newer one
    pub const ADDITIONAL_SOURCE: &'static str = "AdditionalSource";
    /// A source pushed down twice
    pub const PREVIOUS_SOURCE: &'static str = "PreviousSource";
    /// The user who last notified the source block
    pub const NOTIFIER: &'static str = "Notifier";
    /// The user who owns the source block or entity
    pub const OWNER: &'static str = "Owner";
    /// The player that triggered a command
    pub const PLAYER: &'static str = "Player";
}

/// One value in a cause chain
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum CauseValue {
    /// A plugin acting through the explicit API
    Plugin(PluginId),
    /// An offline or tracked user
    User(UserId),
    /// A connected player
    Player(UserId),
    /// A block, as it was when it acted
    Block(Box<BlockSnapshot>),
    /// A ticking tile entity
    TileEntity {
        /// Tile entity position
        position: BlockPos,
        /// Block hosting the tile entity
        block: BlockType,
    },
    /// An entity
    Entity {
        /// Entity identity
        id: EntityId,
        /// Entity kind
        kind: EntityKind,
        /// Taming owner, if any
        owner: Option<UserId>,
        /// Tracked creator, if any
        creator: Option<UserId>,
    },
    /// The world itself
    World(WorldId),
    /// A previously dispatched aggregate event
    Event {
        /// Event kind name (e.g. `"break"`)
        kind: String,
        /// Number of transactions the event covered
        transactions: usize,
    },
    /// Free-form marker
    Custom(String),
}

impl CauseValue {
    /// A block snapshot cause
    pub fn block(snapshot: BlockSnapshot) -> Self {
        CauseValue::Block(Box::new(snapshot))
    }

    /// User behind this value, for users and players
    pub fn user(&self) -> Option<UserId> {
        match self {
            CauseValue::User(id) | CauseValue::Player(id) => Some(*id),
            _ => None,
        }
    }

    /// Whether this value is a plugin
    pub fn is_plugin(&self) -> bool {
        matches!(self, CauseValue::Plugin(_))
    }
}

impl fmt::Display for CauseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CauseValue::Plugin(id) => write!(f, "plugin:{}", id),
            CauseValue::User(id) => write!(f, "{}", id),
            CauseValue::Player(id) => write!(f, "player:{}", id),
            CauseValue::Block(snapshot) => {
                write!(f, "block:{}@{}", snapshot.state(), snapshot.position())
            }
            CauseValue::TileEntity { position, block } => {
                write!(f, "tile:{}@{}", block, position)
            }
            CauseValue::Entity { id, kind, .. } => write!(f, "{:?}:{}", kind, id),
            CauseValue::World(id) => write!(f, "{}", id),
            CauseValue::Event { kind, transactions } => {
                write!(f, "event:{}({})", kind, transactions)
            }
            CauseValue::Custom(marker) => write!(f, "{}", marker),
        }
    }
}

/// Ordered, immutable, append-only attribution record
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CauseChain {
    entries: Vec<(String, CauseValue)>,
}

impl CauseChain {
    /// Chain with a single named root
    pub fn of(name: impl Into<String>, root: CauseValue) -> Self {
        Self {
            entries: vec![(name.into(), root)],
        }
    }

    /// Chain rooted at a `Source` entry
    pub fn source(root: CauseValue) -> Self {
        Self::of(NamedCause::SOURCE, root)
    }

    /// Build a chain from ordered entries
    ///
    /// Fails when no entries are given, since a chain without a root must
    /// never reach dispatch. Duplicate names are renamed as by [`Self::with`].
    pub fn from_entries(entries: Vec<(String, CauseValue)>) -> WorldhookResult<Self> {
        let mut iter = entries.into_iter();
        let (name, root) = iter.next().ok_or(WorldhookError::EmptyCause)?;
        Ok(iter.fold(Self::of(name, root), |chain, (name, value)| {
            chain.with(name, value)
        }))
    }

    /// The root cause
    pub fn root(&self) -> &CauseValue {
        // Construction guarantees at least one entry.
        &self.entries[0].1
    }

    /// Name of the root entry
    pub fn root_name(&self) -> &str {
        &self.entries[0].0
    }

    /// New chain with one more entry appended
    ///
    /// A name already present is never overwritten; see [`Self::unique_name`].
    pub fn with(&self, name: impl Into<String>, value: CauseValue) -> Self {
        let name = self.unique_name(&name.into());
        let mut entries = self.entries.clone();
        entries.push((name, value));
        Self { entries }
    }

    /// New chain with all entries of `other` appended after this chain's
    pub fn merge(&self, other: &CauseChain) -> Self {
        other
            .entries
            .iter()
            .fold(self.clone(), |chain, (name, value)| {
                chain.with(name.clone(), value.clone())
            })
    }

    /// New chain with `source` as the root `Source`, pushing existing
    /// source names down (`Source` -> `AdditionalSource` -> `PreviousSource`)
    pub fn prepend_source(&self, source: CauseValue) -> Self {
        let mut entries = vec![(NamedCause::SOURCE.to_string(), source)];
        let mut iteration = 1usize;
        for (name, value) in &self.entries {
            let base = if name.eq_ignore_ascii_case(NamedCause::SOURCE) {
                NamedCause::ADDITIONAL_SOURCE
            } else if name.eq_ignore_ascii_case(NamedCause::ADDITIONAL_SOURCE) {
                NamedCause::PREVIOUS_SOURCE
            } else {
                name.as_str()
            };
            let mut renamed = base.to_string();
            while entries.iter().any(|(used, _)| *used == renamed) {
                renamed = format!("{}{}", base, iteration);
                iteration += 1;
            }
            entries.push((renamed, value.clone()));
        }
        Self { entries }
    }

    /// The name `name` would be stored under if appended now
    pub fn unique_name(&self, name: &str) -> String {
        if !self.contains_named(name) {
            return name.to_string();
        }
        let base = if name == NamedCause::SOURCE {
            if !self.contains_named(NamedCause::ADDITIONAL_SOURCE) {
                return NamedCause::ADDITIONAL_SOURCE.to_string();
            }
            if !self.contains_named(NamedCause::PREVIOUS_SOURCE) {
                return NamedCause::PREVIOUS_SOURCE.to_string();
            }
            NamedCause::PREVIOUS_SOURCE
        } else {
            name
        };
        let mut suffix = 1usize;
        loop {
            let candidate = format!("{}{}", base, suffix);
            if !self.contains_named(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Value stored under `name`
    pub fn named(&self, name: &str) -> Option<&CauseValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    /// Whether an entry named `name` exists
    pub fn contains_named(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Whether `value` appears anywhere in the chain
    pub fn contains(&self, value: &CauseValue) -> bool {
        self.entries.iter().any(|(_, v)| v == value)
    }

    /// Entries in chain order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &CauseValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Entry names in chain order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Number of entries (always at least one)
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// First user or player in the chain
    pub fn first_user(&self) -> Option<UserId> {
        self.entries.iter().find_map(|(_, value)| value.user())
    }

    /// First connected player in the chain
    pub fn first_player(&self) -> Option<UserId> {
        self.entries.iter().find_map(|(_, value)| match value {
            CauseValue::Player(id) => Some(*id),
            _ => None,
        })
    }

    /// First block snapshot in the chain
    pub fn first_block(&self) -> Option<&BlockSnapshot> {
        self.entries.iter().find_map(|(_, value)| match value {
            CauseValue::Block(snapshot) => Some(snapshot.as_ref()),
            _ => None,
        })
    }

    /// Position of the first tile entity in the chain
    pub fn first_tile_entity(&self) -> Option<BlockPos> {
        self.entries.iter().find_map(|(_, value)| match value {
            CauseValue::TileEntity { position, .. } => Some(*position),
            _ => None,
        })
    }

    /// First entity in the chain, as `(id, owner, creator)`
    pub fn first_entity(&self) -> Option<(EntityId, Option<UserId>, Option<UserId>)> {
        self.entries.iter().find_map(|(_, value)| match value {
            CauseValue::Entity {
                id, owner, creator, ..
            } => Some((*id, *owner, *creator)),
            _ => None,
        })
    }

    /// Number of aggregate events of `kind` already chained
    pub fn count_events(&self, kind: &str) -> usize {
        self.entries
            .iter()
            .filter(|(_, value)| matches!(value, CauseValue::Event { kind: k, .. } if k == kind))
            .count()
    }
}

impl fmt::Display for CauseChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}
