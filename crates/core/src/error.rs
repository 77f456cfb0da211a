// Error types for lending operations

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for lending operations
pub type Result<T> = std::result::Result<T, LendingError>;

/// Errors raised at the write boundary of the lending domain.
///
/// Any of these rejects the write; no status event is emitted for it.
#[derive(Debug, Error)]
pub enum LendingError {
    /// Referenced entity does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: Uuid },

    /// Input failed validation (negative payment, bad dates, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Book already has an active loan or is not available for lending
    #[error("Book {0} is not available")]
    BookUnavailable(Uuid),

    /// Requested status equals the stored status
    #[error("{kind} {id} is already {status}")]
    StatusUnchanged {
        kind: &'static str,
        id: Uuid,
        status: String,
    },

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LendingError {
    /// Create a not-found error for the given entity kind
    pub fn not_found(kind: &'static str, id: Uuid) -> Self {
        LendingError::NotFound { kind, id }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        LendingError::Validation(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        LendingError::Storage(msg.into())
    }

    /// Whether the caller supplied something the domain rejects (as opposed to an infrastructure failure)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LendingError::NotFound { .. }
                | LendingError::Validation(_)
                | LendingError::BookUnavailable(_)
                | LendingError::StatusUnchanged { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let id = Uuid::nil();
        assert_eq!(
            LendingError::not_found("Loan", id).to_string(),
            format!("Loan not found: {}", id)
        );
        assert_eq!(
            LendingError::StatusUnchanged {
                kind: "Transaction",
                id,
                status: "completed".to_string()
            }
            .to_string(),
            format!("Transaction {} is already completed", id)
        );
    }

    #[test]
    fn test_client_error_classification() {
        assert!(LendingError::validation("negative payment").is_client_error());
        assert!(LendingError::BookUnavailable(Uuid::nil()).is_client_error());
        assert!(!LendingError::storage("lock poisoned").is_client_error());
    }
}
