//! Domain error types

use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("No endpoints configured")]
    NoEndpoints,

    #[error("All endpoints are disabled")]
    AllEndpointsDisabled,

    #[error("No prompt templates configured")]
    NoPromptTemplates,

    #[error("Invalid cabinet transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Operation cancelled")]
    Cancelled,
}

impl DomainError {
    /// Check if this error represents a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DomainError::Cancelled)
    }

    /// Whether the user has to fix their setup before retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DomainError::NoEndpoints
                | DomainError::AllEndpointsDisabled
                | DomainError::NoPromptTemplates
        )
    }
}
