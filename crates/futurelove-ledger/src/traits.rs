//! Ledger trait: the authoritative record store.
//!
//! One record per identity, created by the first successful registration and
//! never mutated or deleted afterwards. Both backends run the same admission
//! checks through [`LedgerConfig::admit`] while holding their write lock, so
//! the check-then-insert sequence is atomic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use futurelove_core::{
    CiphertextHandle, ContractAddress, Ed25519PublicKey, FheType, Identity, InputProof,
};

use crate::error::{LedgerError, Result};

/// The stored commitment of one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSequence {
    pub owner: Identity,
    pub handle: CiphertextHandle,
    /// When the record was committed (Unix ms).
    pub registered_at: i64,
}

/// Static ledger parameters, fixed at deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Address the ledger is deployed at; proofs must be bound to it.
    pub contract: ContractAddress,
    /// Trusted input verifier key.
    pub verifier: Ed25519PublicKey,
    /// Declared encrypted type of the stored field.
    pub field_type: FheType,
}

impl LedgerConfig {
    /// Configuration for a `euint32` sequence field.
    pub fn new(contract: ContractAddress, verifier: Ed25519PublicKey) -> Self {
        Self {
            contract,
            verifier,
            field_type: FheType::Uint32,
        }
    }

    /// Stateless admission checks for a registration.
    ///
    /// The already-registered check happens before this, inside the backend's
    /// critical section.
    pub fn admit(
        &self,
        caller: &Identity,
        handle: &CiphertextHandle,
        proof: &InputProof,
    ) -> Result<()> {
        let found = handle.as_bytes()[30];
        if FheType::from_u8(found) != Some(self.field_type) {
            return Err(LedgerError::HandleTypeMismatch {
                expected: self.field_type,
                found,
            });
        }

        proof
            .verify(&self.verifier, &self.contract, caller, handle)
            .map_err(|e| LedgerError::InvalidProof(e.to_string()))
    }
}

/// The Ledger trait: async interface to the registration state.
///
/// `register` is the single write path. Reads reflect only committed
/// registrations.
#[async_trait]
pub trait Ledger: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Write Path
    // ─────────────────────────────────────────────────────────────────────────

    /// Register `handle` as the caller's encrypted sequence.
    ///
    /// # Returns
    /// - The new record on success. The caller is added to the handle's ACL.
    /// - `AlreadyRegistered` if the caller holds a record. Checked first, so a
    ///   duplicate call never reaches proof validation.
    /// - `InvalidProof` / `HandleTypeMismatch` without creating any state.
    ///
    /// Under concurrent calls for the same identity exactly one succeeds.
    async fn register(
        &self,
        caller: &Identity,
        handle: &CiphertextHandle,
        proof: &InputProof,
    ) -> Result<EncryptedSequence>;

    // ─────────────────────────────────────────────────────────────────────────
    // Read Path
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether the identity holds a committed registration.
    async fn is_registered(&self, identity: &Identity) -> Result<bool>;

    /// The identity's handle, `None` when unregistered.
    async fn get_handle(&self, identity: &Identity) -> Result<Option<CiphertextHandle>>;

    /// The identity's full record.
    async fn get_record(&self, identity: &Identity) -> Result<Option<EncryptedSequence>>;

    /// Whether `account` may decrypt `handle`.
    async fn is_allowed(&self, handle: &CiphertextHandle, account: &Identity) -> Result<bool>;

    /// Number of registered identities.
    async fn registration_count(&self) -> Result<u64>;

    /// The ledger's static configuration.
    fn config(&self) -> &LedgerConfig;

    /// The address the ledger is deployed at.
    fn contract_address(&self) -> ContractAddress {
        self.config().contract
    }
}
