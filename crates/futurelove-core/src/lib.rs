//! # FutureLove Core
//!
//! Pure primitives for FutureLove: identities, ciphertext handles, input
//! proofs, canonical signing bytes and the sequence codec.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Identity`] - 20-byte account identifier derived from an Ed25519 key
//! - [`CiphertextHandle`] - Typed reference to a ciphertext held off-ledger
//! - [`InputProof`] - Verifier attestation binding a handle to its owner
//! - [`Sequence`] / [`AvatarSeed`] - The decoded plaintext and its seed
//!
//! ## Canonicalization
//!
//! Every signed message is encoded as deterministic CBOR. See [`canonical`].

pub mod canonical;
pub mod clock;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod proof;
pub mod types;

pub use canonical::{canonical_bytes, CanonicalMap};
pub use clock::{now_millis, Clock, ManualClock, SystemClock};
pub use codec::{AvatarSeed, Category, Sequence, SEQUENCE_LIMIT};
pub use crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::{CodecError, CoreError};
pub use proof::InputProof;
pub use types::{CiphertextHandle, ContractAddress, FheType, Identity};

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
