//! Error types for FutureLove core.

use thiserror::Error;

use crate::types::FheType;

/// Core errors that can occur while handling identities, handles and proofs.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("unknown encrypted type tag: {0:#04x}")]
    UnknownFheType(u8),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Errors from the sequence codec and plaintext width checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The plaintext does not fit the declared encrypted width.
    #[error("value {value} does not fit in {width}")]
    ValueOutOfRange { value: u64, width: FheType },

    /// The value has more than ten decimal digits.
    #[error("sequence value {0} exceeds ten digits")]
    SequenceTooLong(u64),

    /// A digit outside `0..=9`.
    #[error("invalid digit {digit} at position {position}")]
    InvalidDigit { position: usize, digit: u8 },

    /// A category flag outside `0..=1`.
    #[error("invalid category flag {0}")]
    InvalidCategory(u8),

    /// A seed string that does not follow `<prefix>-<9 digits>`.
    #[error("malformed avatar seed: {0}")]
    MalformedSeed(String),
}
