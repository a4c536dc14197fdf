//! Backend interfaces.
//!
//! The client talks to the encryption side (input verifier) and the
//! decryption side (user-decrypt service) only through these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use futurelove_core::{CanonicalMap, CiphertextHandle, Identity};

use crate::authorization::DecryptionAuthorization;
use crate::crypto::{X25519PublicKey, X25519StaticSecret};
use crate::envelope::{decode_plaintext, SealedBox};
use crate::error::Result;
use crate::input::{SealedInput, VerifiedInput};

const REPLY_DOMAIN: &str = "futurelove-reply-v0";

/// Associated data for a decryption reply.
pub fn reply_context(handle: &CiphertextHandle, subject: &Identity) -> Vec<u8> {
    CanonicalMap::new(REPLY_DOMAIN)
        .bytes(1, handle.as_bytes())
        .bytes(2, subject.as_bytes())
        .to_bytes()
}

/// A plaintext re-encrypted to the requester's reply key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedReply {
    pub handle: CiphertextHandle,
    pub subject: Identity,
    pub sealed: SealedBox,
}

impl SealedReply {
    /// Open with the reply secret matching the authorization's reply key.
    pub fn open(&self, reply_secret: &X25519StaticSecret) -> Result<u64> {
        let context = reply_context(&self.handle, &self.subject);
        let plaintext = self.sealed.open(reply_secret, &context)?;
        decode_plaintext(&plaintext)
    }
}

/// Turns sealed plaintexts into ledger-ready `(handle, proof)` pairs.
#[async_trait]
pub trait EncryptionBackend: Send + Sync {
    /// The key inputs must be sealed to.
    fn network_public_key(&self) -> X25519PublicKey;

    /// Verify a sealed input and attest its handle.
    async fn verify_input(&self, input: SealedInput) -> Result<VerifiedInput>;
}

/// Releases plaintexts to authorized subjects.
#[async_trait]
pub trait DecryptionBackend: Send + Sync {
    /// Decrypt the authorization's handle for its subject.
    ///
    /// Fails with `Unauthorized` or `Expired`; never returns a value the
    /// subject is not on the ACL for.
    async fn user_decrypt(&self, authorization: &DecryptionAuthorization) -> Result<SealedReply>;
}
