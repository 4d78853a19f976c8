//! Block behavior registry

use crate::traits::BlockBehavior;
use std::collections::HashMap;
use std::rc::Rc;
use worldhook_types::BlockType;

/// Behavior of blocks without registered game logic
#[derive(Debug, Default, Clone, Copy)]
pub struct InertBlock;

impl BlockBehavior for InertBlock {}

/// Maps block types to their game logic
pub struct BlockRegistry {
    behaviors: HashMap<BlockType, Rc<dyn BlockBehavior>>,
    fallback: Rc<dyn BlockBehavior>,
}

impl BlockRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
            fallback: Rc::new(InertBlock),
        }
    }

    /// Register game logic for a block type, replacing any previous entry
    pub fn register(&mut self, block: impl Into<String>, behavior: impl BlockBehavior + 'static) {
        self.behaviors
            .insert(BlockType::new(block), Rc::new(behavior));
    }

    /// Game logic for a block type
    pub fn behavior(&self, block: &BlockType) -> Rc<dyn BlockBehavior> {
        self.behaviors
            .get(block)
            .cloned()
            .unwrap_or_else(|| Rc::clone(&self.fallback))
    }

    /// Whether a block type has registered game logic
    pub fn contains(&self, block: &BlockType) -> bool {
        self.behaviors.contains_key(block)
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
