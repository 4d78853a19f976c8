//! Error types for the capture pipeline
//!
//! Rejected mutations and listener cancellations are not errors; they are
//! reported as `Ok(false)` or as verdict booleans. Everything here aborts the
//! current tick unit.

use thiserror::Error;
use worldhook_types::{BlockPos, EntityId, WorldhookError};

/// Errors raised by the world mediator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// Data-model error (empty cause, invalid configuration)
    #[error("{0}")]
    Types(#[from] WorldhookError),

    /// An explicit API mutation was attempted with a non-plugin cause root
    #[error("a plugin must be at the root of the cause, found {found}")]
    PluginCauseRequired {
        /// Display form of the offending root
        found: String,
    },

    /// An explicit API mutation targeted a position outside the world volume
    #[error("position {position} is outside the world volume")]
    PositionOutOfBounds {
        /// Offending position
        position: BlockPos,
    },

    /// Nested capture exceeded the configured depth
    #[error("capture recursion exceeded depth {depth} at {position}; cause chain: {chain}")]
    RecursionOverflow {
        /// Depth reached
        depth: u32,
        /// Offending position or entity
        position: String,
        /// Cause chain active when the bound was hit
        chain: String,
    },

    /// A host block or entity behavior failed
    #[error("behavior of {subject} failed: {reason}")]
    Behavior {
        /// Block type or entity the behavior belongs to
        subject: String,
        /// Failure description
        reason: String,
    },

    /// An entity hook referenced an entity that is not in the world
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),
}

impl CaptureError {
    /// Create a behavior failure
    pub fn behavior(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Behavior {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error indicates an integration defect
    ///
    /// Fatal errors must not be swallowed by hosts: they mean a listener or
    /// hook broke the single-entry assumption, or a caller broke a
    /// precondition.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::RecursionOverflow { .. }
            | Self::PluginCauseRequired { .. }
            | Self::PositionOutOfBounds { .. } => true,
            Self::Types(err) => err.is_precondition_violation(),
            Self::Behavior { .. } | Self::EntityNotFound(_) => false,
        }
    }
}

/// Result type for mediator operations
pub type CaptureResult<T> = Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let overflow = CaptureError::RecursionOverflow {
            depth: 33,
            position: "(0, 64, 0)".into(),
            chain: "[Source=world]".into(),
        };
        assert!(overflow.is_fatal());
        assert!(CaptureError::from(WorldhookError::EmptyCause).is_fatal());
        assert!(!CaptureError::behavior("piston", "stuck").is_fatal());
        assert!(!CaptureError::EntityNotFound(EntityId::generate()).is_fatal());
    }

    #[test]
    fn test_messages() {
        let err = CaptureError::PositionOutOfBounds {
            position: BlockPos::new(0, 300, 0),
        };
        assert_eq!(err.to_string(), "position (0, 300, 0) is outside the world volume");
    }
}
