//! Capture-type classification
//!
//! A pure function of the before/after block identity and the active capture
//! modes. Priority: populator, decay, break, place, modify.

use worldhook_types::{BlockState, CaptureType};

/// Classify one block mutation
///
/// An active populator wins over decay mode even when both are set; decay
/// mode only affects writes that produce air.
pub fn classify(
    old: &BlockState,
    new: &BlockState,
    populator_active: bool,
    decay_mode: bool,
) -> CaptureType {
    if populator_active {
        CaptureType::Populate
    } else if decay_mode && new.is_air() {
        CaptureType::Decay
    } else if new.is_air() {
        CaptureType::Break
    } else if new.block() != old.block() {
        CaptureType::Place
    } else {
        CaptureType::Modify
    }
}
