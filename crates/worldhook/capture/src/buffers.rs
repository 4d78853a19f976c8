//! Capture buffers of one mediator
//!
//! Buffers accumulate what a tick unit produced until the drain pass at the
//! end of the unit. They must be empty again before the next unit begins.

use crate::entity::Entity;
use std::collections::HashMap;
use worldhook_types::{BlockPos, BlockSnapshot, EntityId, PopulatorKind, Transaction};

/// Captured writes of one populator kind, keyed by position
///
/// Iteration follows first-insertion order. A second write to the same
/// position replaces the stored final snapshot in place; the original stays
/// the state from before the pass.
#[derive(Clone, Debug, Default)]
pub struct PopulatorCapture {
    entries: Vec<Transaction<BlockSnapshot>>,
    index: HashMap<BlockPos, usize>,
}

impl PopulatorCapture {
    /// Store a transaction, returning the one it replaced
    pub fn insert(&mut self, transaction: Transaction<BlockSnapshot>) -> Option<Transaction<BlockSnapshot>> {
        let pos = transaction.original().position();
        match self.index.get(&pos) {
            Some(&slot) => {
                let mut merged = self.entries[slot].clone();
                merged.set_final(transaction.final_snapshot().clone());
                Some(std::mem::replace(&mut self.entries[slot], merged))
            }
            None => {
                self.index.insert(pos, self.entries.len());
                self.entries.push(transaction);
                None
            }
        }
    }

    /// Undo the most recent [`Self::insert`] for `pos`
    pub(crate) fn undo_insert(&mut self, pos: BlockPos, replaced: Option<Transaction<BlockSnapshot>>) {
        let Some(&slot) = self.index.get(&pos) else {
            return;
        };
        match replaced {
            Some(previous) => self.entries[slot] = previous,
            None => {
                // A fresh key was always appended last.
                if slot + 1 == self.entries.len() {
                    self.entries.pop();
                    self.index.remove(&pos);
                }
            }
        }
    }

    /// Transaction stored for `pos`
    pub fn get(&self, pos: BlockPos) -> Option<&Transaction<BlockSnapshot>> {
        self.index.get(&pos).map(|&slot| &self.entries[slot])
    }

    /// Transactions in first-insertion order
    pub fn transactions(&self) -> &[Transaction<BlockSnapshot>] {
        &self.entries
    }

    /// Consume into transactions
    pub fn into_transactions(self) -> Vec<Transaction<BlockSnapshot>> {
        self.entries
    }

    /// Number of positions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was captured
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything captured during the current tick unit
#[derive(Debug, Default)]
pub struct CaptureBuffers {
    pub(crate) blocks: Vec<Transaction<BlockSnapshot>>,
    pub(crate) entities: Vec<Entity>,
    pub(crate) entity_items: Vec<Entity>,
    pub(crate) populators: Vec<(PopulatorKind, PopulatorCapture)>,
    pub(crate) invalid_transactions: Vec<Transaction<BlockSnapshot>>,
    pub(crate) destruct_item_drop: bool,
}

impl CaptureBuffers {
    /// Create empty buffers
    pub fn new() -> Self {
        Self::default()
    }

    /// Pending block transactions in capture order
    pub fn blocks(&self) -> &[Transaction<BlockSnapshot>] {
        &self.blocks
    }

    /// Pending non-item entities
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Pending item entities
    pub fn entity_items(&self) -> &[Entity] {
        &self.entity_items
    }

    /// Captured writes of one populator kind
    pub fn populator(&self, kind: &PopulatorKind) -> Option<&PopulatorCapture> {
        self.populators
            .iter()
            .find(|(k, _)| k == kind)
            .map(|(_, capture)| capture)
    }

    /// Transactions rejected individually during the current drain pass
    pub fn invalid_transactions(&self) -> &[Transaction<BlockSnapshot>] {
        &self.invalid_transactions
    }

    pub(crate) fn populator_mut(&mut self, kind: &PopulatorKind) -> &mut PopulatorCapture {
        let slot = match self.populators.iter().position(|(k, _)| k == kind) {
            Some(slot) => slot,
            None => {
                self.populators.push((kind.clone(), PopulatorCapture::default()));
                self.populators.len() - 1
            }
        };
        &mut self.populators[slot].1
    }

    pub(crate) fn take_populator(&mut self, kind: &PopulatorKind) -> Option<PopulatorCapture> {
        let slot = self.populators.iter().position(|(k, _)| k == kind)?;
        Some(self.populators.remove(slot).1)
    }

    /// Route an entity to the item or general buffer by kind
    pub(crate) fn push_entity(&mut self, entity: Entity) {
        if entity.kind.is_item() {
            self.entity_items.push(entity);
        } else {
            self.entities.push(entity);
        }
    }

    /// Remove a pending entity from whichever buffer holds it
    pub(crate) fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        for list in [&mut self.entity_items, &mut self.entities] {
            if let Some(slot) = list.iter().position(|e| e.id == id) {
                return Some(list.remove(slot));
            }
        }
        None
    }

    /// Drop both entity buffers
    pub(crate) fn clear_entities(&mut self) {
        self.entities.clear();
        self.entity_items.clear();
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
            && self.entities.is_empty()
            && self.entity_items.is_empty()
            && self.populators.iter().all(|(_, capture)| capture.is_empty())
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.clear_entities();
        self.populators.clear();
        self.invalid_transactions.clear();
        self.destruct_item_drop = false;
    }
}
