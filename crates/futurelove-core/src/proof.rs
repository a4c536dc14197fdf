//! Input proofs.
//!
//! An [`InputProof`] is the input verifier's attestation that a ciphertext
//! handle was produced for a specific `(contract, identity)` pair. The ledger
//! refuses to store a handle whose proof does not verify for the caller, which
//! stops one identity from registering a handle encrypted for another.

use serde::{Deserialize, Serialize};

use crate::canonical::CanonicalMap;
use crate::crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::error::CoreError;
use crate::types::{CiphertextHandle, ContractAddress, Identity};

const PROOF_DOMAIN: &str = "futurelove-input-proof-v0";

/// Canonical bytes signed by the input verifier.
pub fn proof_message(
    contract: &ContractAddress,
    identity: &Identity,
    handle: &CiphertextHandle,
) -> Vec<u8> {
    CanonicalMap::new(PROOF_DOMAIN)
        .bytes(1, contract.as_bytes())
        .bytes(2, identity.as_bytes())
        .bytes(3, handle.as_bytes())
        .to_bytes()
}

/// Verifier signature binding a handle to `(contract, identity)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputProof {
    /// The key that produced the signature.
    pub verifier: Ed25519PublicKey,
    pub signature: Ed25519Signature,
}

impl InputProof {
    /// Attest a handle as the input verifier.
    pub fn sign(
        verifier: &Keypair,
        contract: &ContractAddress,
        identity: &Identity,
        handle: &CiphertextHandle,
    ) -> Self {
        let message = proof_message(contract, identity, handle);
        Self {
            verifier: verifier.public_key(),
            signature: verifier.sign(&message),
        }
    }

    /// Check the proof against a trusted verifier key and the expected binding.
    pub fn verify(
        &self,
        trusted: &Ed25519PublicKey,
        contract: &ContractAddress,
        identity: &Identity,
        handle: &CiphertextHandle,
    ) -> Result<(), CoreError> {
        if &self.verifier != trusted {
            return Err(CoreError::InvalidSignature);
        }
        let message = proof_message(contract, identity, handle);
        trusted.verify(&message, &self.signature)
    }

    /// Serialize to CBOR.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FheType;

    fn setup() -> (Keypair, ContractAddress, Identity, CiphertextHandle) {
        let verifier = Keypair::from_seed(&[5u8; 32]);
        let contract = ContractAddress::from_bytes([1u8; 20]);
        let identity = Identity::from_bytes([2u8; 20]);
        let handle = CiphertextHandle::derive(b"ct", &contract, &identity, FheType::Uint32);
        (verifier, contract, identity, handle)
    }

    #[test]
    fn test_proof_verifies_for_binding() {
        let (verifier, contract, identity, handle) = setup();
        let proof = InputProof::sign(&verifier, &contract, &identity, &handle);
        proof
            .verify(&verifier.public_key(), &contract, &identity, &handle)
            .unwrap();
    }

    #[test]
    fn test_proof_rejected_for_other_identity() {
        let (verifier, contract, identity, handle) = setup();
        let proof = InputProof::sign(&verifier, &contract, &identity, &handle);
        let mallory = Identity::from_bytes([9u8; 20]);
        assert!(proof
            .verify(&verifier.public_key(), &contract, &mallory, &handle)
            .is_err());
    }

    #[test]
    fn test_proof_rejected_for_other_contract() {
        let (verifier, contract, identity, handle) = setup();
        let proof = InputProof::sign(&verifier, &contract, &identity, &handle);
        let other = ContractAddress::from_bytes([3u8; 20]);
        assert!(proof
            .verify(&verifier.public_key(), &other, &identity, &handle)
            .is_err());
    }

    #[test]
    fn test_proof_rejected_for_untrusted_verifier() {
        let (_, contract, identity, handle) = setup();
        let rogue = Keypair::from_seed(&[6u8; 32]);
        let proof = InputProof::sign(&rogue, &contract, &identity, &handle);
        let trusted = Keypair::from_seed(&[5u8; 32]).public_key();
        assert!(proof.verify(&trusted, &contract, &identity, &handle).is_err());
    }

    #[test]
    fn test_proof_cbor_roundtrip() {
        let (verifier, contract, identity, handle) = setup();
        let proof = InputProof::sign(&verifier, &contract, &identity, &handle);
        let recovered = InputProof::from_bytes(&proof.to_bytes().unwrap()).unwrap();
        assert_eq!(proof, recovered);
    }
}
