//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A client identity failed validation
    #[error("Invalid client identity {value:?}: {reason}")]
    InvalidIdentity { value: String, reason: String },

    /// The interval source could not produce a value for a client
    #[error("No update interval for client {client:?}: {reason}")]
    IntervalUnavailable { client: String, reason: String },
}

impl DomainError {
    /// Builds an `InvalidIdentity` error.
    pub fn invalid_identity(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Builds an `IntervalUnavailable` error.
    pub fn interval_unavailable(client: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::IntervalUnavailable {
            client: client.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_identity_display() {
        let err = DomainError::invalid_identity("bad id!", "contains ' '");
        let msg = err.to_string();
        assert!(msg.contains("bad id!"));
        assert!(msg.contains("contains ' '"));
    }

    #[test]
    fn test_interval_unavailable_display() {
        let err = DomainError::interval_unavailable("dev-1", "store offline");
        assert!(err.to_string().contains("store offline"));
    }
}
