//! Pending view over a batch being committed
//!
//! While a batch of transactions is committed one by one, game logic reading
//! the world must see each position as of the transactions committed so far:
//! committed entries show their final state, the rest still show their
//! original state. A position written again after capture is read live.

use worldhook_types::{BlockPos, BlockSnapshot, BlockState, Transaction};

#[derive(Clone, Debug)]
struct PendingEntry {
    position: BlockPos,
    original: BlockState,
    final_state: BlockState,
}

/// Shadow block access for one commit batch
#[derive(Clone, Debug, Default)]
pub struct PendingView {
    entries: Vec<PendingEntry>,
    cursor: usize,
}

impl PendingView {
    /// View over a batch, with nothing committed yet
    pub fn new(transactions: &[Transaction<BlockSnapshot>]) -> Self {
        let entries = transactions
            .iter()
            .map(|tx| PendingEntry {
                position: tx.original().position(),
                original: tx.original().state().clone(),
                final_state: tx.effective_final().state().clone(),
            })
            .collect();
        Self { entries, cursor: 0 }
    }

    /// Make the next transaction visible
    pub fn proceed(&mut self) {
        if self.cursor < self.entries.len() {
            self.cursor += 1;
        }
    }

    /// Number of transactions made visible so far
    pub fn committed(&self) -> usize {
        self.cursor
    }

    /// State to report for `pos` given the live state, if the view masks it
    pub fn overlay(&self, pos: BlockPos, live: &BlockState) -> Option<BlockState> {
        let last = self.entries.iter().rposition(|e| e.position == pos)?;
        if &self.entries[last].final_state != live {
            return None;
        }
        let committed = self.entries[..self.cursor]
            .iter()
            .rev()
            .find(|e| e.position == pos);
        match committed {
            Some(entry) => Some(entry.final_state.clone()),
            None => self.entries[self.cursor..]
                .iter()
                .find(|e| e.position == pos)
                .map(|entry| entry.original.clone()),
        }
    }
}
