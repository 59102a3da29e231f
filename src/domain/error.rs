//! Domain errors

use thiserror::Error;

use super::TransactionId;

/// Domain-level error types
#[derive(Debug, Error)]
pub enum DomainError {
    /// A required entity reference could not be resolved
    #[error("Invalid reference: {entity} with id={id}")]
    InvalidReference { entity: &'static str, id: i64 },

    /// Attempted to correct a transaction that is already rejected
    #[error("Transaction {0} is already rejected and cannot be corrected")]
    AlreadyRejected(TransactionId),

    /// A chain or summary link points at a rejected record after a cascade.
    /// Indicates a cascade bug; callers must treat this as fatal.
    #[error("Inconsistent chain: {0}")]
    InconsistentChain(String),

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
