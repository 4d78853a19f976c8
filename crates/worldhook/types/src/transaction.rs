//! Pending mutations awaiting a listener verdict

use serde::{Deserialize, Serialize};

/// A proposed change from an original snapshot to a final snapshot
///
/// Listeners may invalidate a transaction (it is then restored instead of
/// committed) or attach a custom replacement that is applied in place of the
/// final snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction<S> {
    original: S,
    final_snapshot: S,
    custom: Option<S>,
    valid: bool,
}

impl<S> Transaction<S> {
    /// Create a valid transaction
    pub fn new(original: S, final_snapshot: S) -> Self {
        Self {
            original,
            final_snapshot,
            custom: None,
            valid: true,
        }
    }

    /// State before the mutation
    pub fn original(&self) -> &S {
        &self.original
    }

    /// Proposed state after the mutation
    pub fn final_snapshot(&self) -> &S {
        &self.final_snapshot
    }

    /// Listener-supplied replacement, if any
    pub fn custom(&self) -> Option<&S> {
        self.custom.as_ref()
    }

    /// The snapshot that will be committed: the custom replacement if set,
    /// otherwise the final snapshot
    pub fn effective_final(&self) -> &S {
        self.custom.as_ref().unwrap_or(&self.final_snapshot)
    }

    /// Attach (or clear) a custom replacement
    pub fn set_custom(&mut self, custom: Option<S>) {
        self.custom = custom;
    }

    /// Replace the proposed final snapshot
    pub fn set_final(&mut self, final_snapshot: S) {
        self.final_snapshot = final_snapshot;
    }

    /// Whether this transaction should be committed
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Set the validity flag
    pub fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    /// Mark this transaction as rejected
    pub fn invalidate(&mut self) {
        self.valid = false;
    }
}
