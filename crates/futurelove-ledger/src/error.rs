//! Error types for the ledger.

use thiserror::Error;

use futurelove_core::{CiphertextHandle, FheType, Identity};

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The identity already holds a registration. Terminal.
    #[error("identity {0} is already registered")]
    AlreadyRegistered(Identity),

    /// The input proof does not bind the handle to `(contract, caller)`.
    #[error("invalid input proof: {0}")]
    InvalidProof(String),

    /// The handle's embedded type differs from the declared field type.
    #[error("handle type mismatch: expected {expected}, found tag {found:#04x}")]
    HandleTypeMismatch { expected: FheType, found: u8 },

    /// The handle is already stored for another identity.
    #[error("handle {0} is already registered")]
    DuplicateHandle(CiphertextHandle),

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock holder panicked or a blocking task failed.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    /// Whether the error is a rejection of the call itself rather than a
    /// storage failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::AlreadyRegistered(_)
                | LedgerError::InvalidProof(_)
                | LedgerError::HandleTypeMismatch { .. }
                | LedgerError::DuplicateHandle(_)
        )
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
