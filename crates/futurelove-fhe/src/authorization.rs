//! Decryption authorizations.
//!
//! The subject signs an [`AuthorizationRequest`] with its own credential. The
//! signed [`DecryptionAuthorization`] is scoped to exactly one
//! `(handle, contract)` pair, carries a validity window, and names the X25519
//! key the plaintext must be re-encrypted to.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use futurelove_core::{
    CanonicalMap, CiphertextHandle, ContractAddress, CoreError, Ed25519PublicKey,
    Ed25519Signature, Identity, Keypair,
};

use crate::crypto::X25519PublicKey;

const AUTHORIZATION_DOMAIN: &str = "futurelove-user-decrypt-v0";

/// The unsigned part of an authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub subject: Identity,
    pub signer: Ed25519PublicKey,
    pub handle: CiphertextHandle,
    pub contract: ContractAddress,
    /// Unix ms.
    pub issued_at: i64,
    /// Unix ms, exclusive.
    pub expiry: i64,
    pub reply_key: X25519PublicKey,
}

impl AuthorizationRequest {
    /// Request for `signer`'s own identity, valid for `ttl` from `issued_at`.
    pub fn new(
        signer: Ed25519PublicKey,
        handle: CiphertextHandle,
        contract: ContractAddress,
        issued_at: i64,
        ttl: Duration,
        reply_key: X25519PublicKey,
    ) -> Self {
        Self {
            subject: signer.identity(),
            signer,
            handle,
            contract,
            issued_at,
            expiry: issued_at.saturating_add(duration_millis(ttl)),
            reply_key,
        }
    }

    /// Canonical bytes the subject signs.
    pub fn signing_bytes(&self) -> Vec<u8> {
        CanonicalMap::new(AUTHORIZATION_DOMAIN)
            .bytes(1, self.subject.as_bytes())
            .bytes(2, self.signer.as_bytes())
            .bytes(3, self.handle.as_bytes())
            .bytes(4, self.contract.as_bytes())
            .int(5, self.issued_at)
            .int(6, self.expiry)
            .bytes(7, self.reply_key.as_bytes())
            .to_bytes()
    }

    /// Attach a signature produced over [`Self::signing_bytes`].
    pub fn into_authorization(self, signature: Ed25519Signature) -> DecryptionAuthorization {
        DecryptionAuthorization {
            request: self,
            signature,
        }
    }

    /// Sign with a local keypair.
    pub fn sign(self, keypair: &Keypair) -> DecryptionAuthorization {
        let signature = keypair.sign(&self.signing_bytes());
        self.into_authorization(signature)
    }
}

/// Milliseconds in `d`, saturating at `i64::MAX`.
pub(crate) fn duration_millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// A signed, scoped, time-bounded decryption authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionAuthorization {
    pub request: AuthorizationRequest,
    pub signature: Ed25519Signature,
}

impl DecryptionAuthorization {
    pub fn subject(&self) -> Identity {
        self.request.subject
    }

    pub fn handle(&self) -> CiphertextHandle {
        self.request.handle
    }

    pub fn contract(&self) -> ContractAddress {
        self.request.contract
    }

    pub fn expiry(&self) -> i64 {
        self.request.expiry
    }

    /// Check the signature and that the signer key owns `subject`.
    pub fn verify(&self) -> Result<(), CoreError> {
        if self.request.signer.identity() != self.request.subject {
            return Err(CoreError::InvalidPublicKey);
        }
        self.request
            .signer
            .verify(&self.request.signing_bytes(), &self.signature)
    }

    /// Whether the window has closed at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.request.expiry
    }

    /// Whether the authorization is still usable for at least `margin`.
    pub fn is_fresh(&self, now: i64, margin: Duration) -> bool {
        now.saturating_add(duration_millis(margin)) < self.request.expiry
    }

    /// Whether this authorization covers `(handle, contract)`.
    pub fn covers(&self, handle: &CiphertextHandle, contract: &ContractAddress) -> bool {
        &self.request.handle == handle && &self.request.contract == contract
    }
}
