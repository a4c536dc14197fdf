//! # FutureLove FHE Backends
//!
//! The encryption and decryption collaborators of the registration protocol.
//!
//! ## Overview
//!
//! Values are never sent in the clear. A client seals its plaintext to the
//! network key with [`InputBuilder`]; the input verifier opens it, stores the
//! ciphertext, and returns a handle plus an [`InputProof`] bound to
//! `(contract, identity)`. Later the owner signs a
//! [`DecryptionAuthorization`] and the decryption service re-encrypts the
//! plaintext to the authorization's reply key.
//!
//! ## Key Types
//!
//! - [`EncryptionBackend`] / [`DecryptionBackend`] - Backend interfaces
//! - [`Coprocessor`] - In-process implementation of both
//! - [`SealedBox`] - X25519 + ChaCha20-Poly1305 envelope
//!
//! [`InputProof`]: futurelove_core::InputProof

pub mod authorization;
pub mod backend;
pub mod coprocessor;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod input;

pub use authorization::{AuthorizationRequest, DecryptionAuthorization};
pub use backend::{DecryptionBackend, EncryptionBackend, SealedReply};
pub use coprocessor::{Coprocessor, CoprocessorConfig};
pub use crypto::{X25519PublicKey, X25519StaticSecret};
pub use envelope::{SealFormat, SealedBox};
pub use error::{FheError, Result};
pub use input::{InputBuilder, SealedInput, VerifiedInput};
