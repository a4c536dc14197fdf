//! Error types for the client workflows.
//!
//! Each workflow reports a failure cause that is either terminal or
//! retryable. Retryable causes may succeed on a fresh attempt without any
//! change by the caller.

use thiserror::Error;

use futurelove_chain::{ChainError, RevertReason};
use futurelove_core::CodecError;
use futurelove_fhe::FheError;

/// Why a registration attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationFailure {
    /// The value does not fit the encrypted width. Local and fatal.
    #[error("encoding error: {0}")]
    Encoding(CodecError),

    /// The ledger already holds a record for this identity. Terminal.
    #[error("already registered")]
    AlreadyRegistered,

    /// The ledger reverted the call for another reason (invalid proof, ...).
    #[error("registration reverted: {0}")]
    Reverted(RevertReason),

    /// The node refused the transaction outright.
    #[error("transaction refused: {0}")]
    Refused(String),

    /// The credential holder declined to sign.
    #[error("signature rejected: {0}")]
    SignatureRejected(String),

    /// A bounded wait elapsed (encryption, signature, submission or
    /// confirmation).
    #[error("timeout: {0}")]
    Timeout(String),

    /// The node or backend could not be reached.
    #[error("transport error: {0}")]
    Transport(String),
}

impl RegistrationFailure {
    pub fn is_retryable(&self) -> bool {
        match self {
            RegistrationFailure::Timeout(_) | RegistrationFailure::Transport(_) => true,
            RegistrationFailure::Reverted(reason) => reason.is_transient(),
            _ => false,
        }
    }
}

impl From<ChainError> for RegistrationFailure {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Timeout(msg) => RegistrationFailure::Timeout(msg),
            ChainError::InvalidTransaction(msg) => RegistrationFailure::Refused(msg),
            other => RegistrationFailure::Transport(other.to_string()),
        }
    }
}

impl From<FheError> for RegistrationFailure {
    fn from(err: FheError) -> Self {
        match err {
            FheError::Encoding(e) => RegistrationFailure::Encoding(e),
            FheError::InvalidInput(msg) => RegistrationFailure::Refused(msg),
            other => RegistrationFailure::Transport(other.to_string()),
        }
    }
}

impl From<RevertReason> for RegistrationFailure {
    fn from(reason: RevertReason) -> Self {
        match reason {
            RevertReason::AlreadyRegistered => RegistrationFailure::AlreadyRegistered,
            other => RegistrationFailure::Reverted(other),
        }
    }
}

/// Why a decryption attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecryptionFailure {
    /// The identity has no committed registration. Caller error.
    #[error("nothing to decrypt")]
    NothingToDecrypt,

    /// The backend refused the authorization. Retry with a fresh one.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The authorization expired before use. Retry with a fresh one.
    #[error("authorization expired")]
    Expired,

    /// The credential holder declined to sign.
    #[error("signature rejected: {0}")]
    SignatureRejected(String),

    /// A bounded wait elapsed (signature or decryption).
    #[error("timeout: {0}")]
    Timeout(String),

    /// The node or backend could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with something that is not our value.
    #[error("invalid reply: {0}")]
    InvalidReply(String),
}

impl DecryptionFailure {
    /// `Unauthorized` and `Expired` are terminal for the attempt but the
    /// next attempt signs a fresh authorization, so they count as retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DecryptionFailure::Unauthorized(_)
                | DecryptionFailure::Expired
                | DecryptionFailure::Timeout(_)
                | DecryptionFailure::Transport(_)
        )
    }
}

impl From<ChainError> for DecryptionFailure {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Timeout(msg) => DecryptionFailure::Timeout(msg),
            other => DecryptionFailure::Transport(other.to_string()),
        }
    }
}

impl From<FheError> for DecryptionFailure {
    fn from(err: FheError) -> Self {
        match err {
            FheError::Unauthorized(msg) => DecryptionFailure::Unauthorized(msg),
            FheError::Expired { .. } => DecryptionFailure::Expired,
            FheError::DecryptionError(msg) | FheError::SerializationError(msg) => {
                DecryptionFailure::InvalidReply(msg)
            }
            other => DecryptionFailure::Transport(other.to_string()),
        }
    }
}

/// Errors returned by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A workflow of the same kind is already in flight on this session.
    #[error("workflow already in flight")]
    Busy,

    #[error("registration failed: {0}")]
    Registration(#[from] RegistrationFailure),

    #[error("decryption failed: {0}")]
    Decryption(#[from] DecryptionFailure),

    /// Direct chain read failed.
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// A state machine was driven with an event it does not accept.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
}

impl ClientError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Busy => true,
            ClientError::Registration(f) => f.is_retryable(),
            ClientError::Decryption(f) => f.is_retryable(),
            ClientError::Chain(e) => e.is_transient(),
            ClientError::InvalidTransition(_) => false,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
