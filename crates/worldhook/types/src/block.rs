//! Block types and states

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a block type (e.g. `"stone"`, `"air"`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockType(String);

impl BlockType {
    /// The empty block
    pub const AIR: &'static str = "air";

    /// Create a new block type
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The air block type
    pub fn air() -> Self {
        Self(Self::AIR.to_string())
    }

    /// Whether this is air
    pub fn is_air(&self) -> bool {
        self.0 == Self::AIR
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A block type plus its property values (metadata)
///
/// Two states are identical only if both the type and every property match.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockState {
    block: BlockType,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

impl BlockState {
    /// Default state of a block type
    pub fn of(block: impl Into<String>) -> Self {
        Self {
            block: BlockType::new(block),
            properties: BTreeMap::new(),
        }
    }

    /// The air state
    pub fn air() -> Self {
        Self {
            block: BlockType::air(),
            properties: BTreeMap::new(),
        }
    }

    /// Copy of this state with one property set
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Block type
    pub fn block(&self) -> &BlockType {
        &self.block
    }

    /// Property value
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// All properties
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Whether this is air
    pub fn is_air(&self) -> bool {
        self.block.is_air()
    }
}

impl fmt::Display for BlockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.block)?;
        if !self.properties.is_empty() {
            let props: Vec<String> = self
                .properties
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, "[{}]", props.join(","))?;
        }
        Ok(())
    }
}

/// Lighting-relevant properties of a block state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LightProperties {
    /// How much light the block absorbs (0-15)
    pub opacity: u8,
    /// Light level the block emits (0-15)
    pub emission: u8,
}

impl LightProperties {
    /// Create light properties
    pub const fn new(opacity: u8, emission: u8) -> Self {
        Self { opacity, emission }
    }
}
