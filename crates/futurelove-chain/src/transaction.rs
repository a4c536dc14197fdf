//! Signed transactions and their receipts.
//!
//! A transaction is signed over its canonical CBOR encoding. Its hash is the
//! BLAKE3 of the canonical encoding including the signature, so two
//! submissions of the same signed transaction share a hash.

use serde::{Deserialize, Serialize};
use std::fmt;

use futurelove_core::{
    CanonicalMap, CiphertextHandle, CoreError, Ed25519PublicKey, Ed25519Signature, Identity,
    InputProof, Keypair,
};
use futurelove_ledger::LedgerError;

const TRANSACTION_DOMAIN: &str = "futurelove-tx-v0";

/// Content-addressed transaction identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    /// Convert to `0x`-prefixed hex string.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", &self.to_hex()[..18])
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..18])
    }
}

/// Contract calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Call {
    /// Store the sender's encrypted sequence.
    RegisterSequence {
        handle: CiphertextHandle,
        proof: InputProof,
    },
}

impl Call {
    fn to_canonical(&self) -> CanonicalMap {
        match self {
            Call::RegisterSequence { handle, proof } => CanonicalMap::new("register-sequence")
                .bytes(1, handle.as_bytes())
                .bytes(2, proof.verifier.as_bytes())
                .bytes(3, proof.signature.as_bytes()),
        }
    }
}

/// A signed call from one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub from: Ed25519PublicKey,
    pub nonce: u64,
    pub call: Call,
    pub signature: Ed25519Signature,
}

impl Transaction {
    fn unsigned(from: &Ed25519PublicKey, nonce: u64, call: &Call) -> CanonicalMap {
        CanonicalMap::new(TRANSACTION_DOMAIN)
            .bytes(1, from.as_bytes())
            .uint(2, nonce)
            .map(3, call.to_canonical())
    }

    /// Bytes covered by the signature.
    pub fn signing_bytes(from: &Ed25519PublicKey, nonce: u64, call: &Call) -> Vec<u8> {
        Self::unsigned(from, nonce, call).to_bytes()
    }

    /// Build from a signature produced over [`Self::signing_bytes`].
    pub fn from_parts(from: Ed25519PublicKey, nonce: u64, call: Call, signature: Ed25519Signature) -> Self {
        Self {
            from,
            nonce,
            call,
            signature,
        }
    }

    /// Sign with a local keypair.
    pub fn sign(keypair: &Keypair, nonce: u64, call: Call) -> Self {
        let from = keypair.public_key();
        let signature = keypair.sign(&Self::signing_bytes(&from, nonce, &call));
        Self::from_parts(from, nonce, call, signature)
    }

    /// Check the signature.
    pub fn verify(&self) -> Result<(), CoreError> {
        self.from.verify(
            &Self::signing_bytes(&self.from, self.nonce, &self.call),
            &self.signature,
        )
    }

    /// The identity the call executes as.
    pub fn sender(&self) -> Identity {
        self.from.identity()
    }

    pub fn hash(&self) -> TxHash {
        let bytes = Self::unsigned(&self.from, self.nonce, &self.call)
            .bytes(4, self.signature.as_bytes())
            .to_bytes();
        TxHash(*blake3::hash(&bytes).as_bytes())
    }
}

/// Why an included transaction had no effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevertReason {
    AlreadyRegistered,
    InvalidProof(String),
    HandleTypeMismatch,
    DuplicateHandle,
    NonceMismatch { expected: u64, got: u64 },
    /// The ledger's storage failed transiently. Nothing was written.
    Unavailable(String),
    Internal(String),
}

impl RevertReason {
    /// Whether resubmitting the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RevertReason::Unavailable(_))
    }
}

impl From<&LedgerError> for RevertReason {
    fn from(err: &LedgerError) -> Self {
        match err {
            LedgerError::AlreadyRegistered(_) => RevertReason::AlreadyRegistered,
            LedgerError::InvalidProof(msg) => RevertReason::InvalidProof(msg.clone()),
            LedgerError::HandleTypeMismatch { .. } => RevertReason::HandleTypeMismatch,
            LedgerError::DuplicateHandle(_) => RevertReason::DuplicateHandle,
            LedgerError::Unavailable(_) | LedgerError::Database(_) => {
                RevertReason::Unavailable(err.to_string())
            }
            other => RevertReason::Internal(other.to_string()),
        }
    }
}

impl fmt::Display for RevertReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevertReason::AlreadyRegistered => write!(f, "already registered"),
            RevertReason::InvalidProof(msg) => write!(f, "invalid proof: {}", msg),
            RevertReason::HandleTypeMismatch => write!(f, "handle type mismatch"),
            RevertReason::DuplicateHandle => write!(f, "duplicate handle"),
            RevertReason::NonceMismatch { expected, got } => {
                write!(f, "nonce mismatch: expected {}, got {}", expected, got)
            }
            RevertReason::Unavailable(msg) => write!(f, "ledger unavailable: {}", msg),
            RevertReason::Internal(msg) => write!(f, "internal: {}", msg),
        }
    }
}

/// Outcome of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Committed,
    Reverted(RevertReason),
}

/// Durable record of an included transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub sender: Identity,
    pub block: u64,
    pub status: TxStatus,
}

impl TxReceipt {
    pub fn is_committed(&self) -> bool {
        matches!(self.status, TxStatus::Committed)
    }
}
