//! Error types for the Worldhook data model

use thiserror::Error;

/// Errors raised while building or validating data-model values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorldhookError {
    // =========================================================================
    // Cause Errors
    // =========================================================================
    /// A cause chain was built without a root
    ///
    /// Chains without a root must never reach dispatch; this is an
    /// integration defect, not a runtime condition.
    #[error("Cause chain has no root entry")]
    EmptyCause,

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Why the configuration is invalid
        reason: String,
    },
}

impl WorldhookError {
    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Whether this error indicates a programming error rather than bad input
    pub fn is_precondition_violation(&self) -> bool {
        matches!(self, Self::EmptyCause)
    }
}

/// Result type for data-model operations
pub type WorldhookResult<T> = Result<T, WorldhookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            WorldhookError::EmptyCause.to_string(),
            "Cause chain has no root entry"
        );
        assert_eq!(
            WorldhookError::invalid_config("depth is zero").to_string(),
            "Invalid configuration: depth is zero"
        );
    }

    #[test]
    fn test_precondition_classification() {
        assert!(WorldhookError::EmptyCause.is_precondition_violation());
        assert!(!WorldhookError::invalid_config("x").is_precondition_violation());
    }
}
