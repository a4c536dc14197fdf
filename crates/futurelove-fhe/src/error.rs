//! Error types for encryption and decryption backends.

use thiserror::Error;

use futurelove_core::{CiphertextHandle, CodecError, CoreError};
use futurelove_ledger::LedgerError;

/// Errors raised by the input verifier, the decryption coprocessor and the
/// client-side sealing helpers.
#[derive(Debug, Error)]
pub enum FheError {
    /// The plaintext does not fit the requested width. Raised locally,
    /// before anything is sent to a backend.
    #[error("encoding error: {0}")]
    Encoding(#[from] CodecError),

    /// Encryption error.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// Decryption error (wrong key, tampered ciphertext, wrong context).
    #[error("decryption error: {0}")]
    DecryptionError(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// The verifier refused a sealed input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The authorization does not entitle its subject to the handle.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The authorization's validity window has passed.
    #[error("authorization expired at {expiry} (now {now})")]
    Expired { expiry: i64, now: i64 },

    /// No ciphertext is stored under the handle.
    #[error("unknown handle {0}")]
    UnknownHandle(CiphertextHandle),

    /// Ledger lookup failed.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Core error.
    #[error("core error: {0}")]
    CoreError(#[from] CoreError),
}

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, FheError>;
