//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including identifier parsing, invalid enum values and invalid
//! state transitions.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Unknown fault category name
    #[error("Invalid fault category: {0}")]
    InvalidCategory(String),

    /// Unknown severity name
    #[error("Invalid severity: {0}")]
    InvalidSeverity(String),

    /// Unknown consent level name
    #[error("Invalid consent level: {0}")]
    InvalidConsentLevel(String),

    /// Unknown consent-gated data type
    #[error("Invalid data type: {0}")]
    InvalidDataType(String),

    /// Unknown alert channel name
    #[error("Invalid alert channel: {0}")]
    InvalidAlertChannel(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidId("not-a-uuid".to_string());
        assert_eq!(err.to_string(), "Invalid ID format: not-a-uuid");

        let err = DomainError::InvalidConsentLevel("everything".to_string());
        assert_eq!(err.to_string(), "Invalid consent level: everything");

        let err = DomainError::InvalidState {
            from: "exhausted".to_string(),
            to: "retrying".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition from exhausted to retrying"
        );
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::InvalidSeverity("fatal".to_string());
        let err2 = DomainError::InvalidSeverity("fatal".to_string());
        let err3 = DomainError::InvalidSeverity("minor".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
