//! Client-side encrypted inputs.
//!
//! A plaintext is sealed to the network key under the context
//! `(contract, identity, width)`. The verifier can only open it under the
//! same context, and derives the handle from it, so the resulting handle and
//! proof are bound to that pair.

use serde::{Deserialize, Serialize};

use futurelove_core::{
    CanonicalMap, CiphertextHandle, CodecError, ContractAddress, FheType, Identity, InputProof,
};

use crate::crypto::X25519PublicKey;
use crate::envelope::{encode_plaintext, SealedBox};
use crate::error::Result;

const INPUT_DOMAIN: &str = "futurelove-input-v0";

/// Associated data for a sealed input.
pub fn input_context(contract: &ContractAddress, identity: &Identity, width: FheType) -> Vec<u8> {
    CanonicalMap::new(INPUT_DOMAIN)
        .bytes(1, contract.as_bytes())
        .bytes(2, identity.as_bytes())
        .uint(3, width.to_u8() as u64)
        .to_bytes()
}

/// A plaintext sealed for the input verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedInput {
    pub contract: ContractAddress,
    pub identity: Identity,
    pub width: FheType,
    pub sealed: SealedBox,
}

impl SealedInput {
    /// The associated data this input was sealed under.
    pub fn context(&self) -> Vec<u8> {
        input_context(&self.contract, &self.identity, self.width)
    }
}

/// The verifier's answer to a sealed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedInput {
    pub handle: CiphertextHandle,
    pub proof: InputProof,
}

/// Builder for sealed inputs bound to one `(contract, identity)` pair.
#[derive(Debug, Clone, Copy)]
pub struct InputBuilder {
    network_key: X25519PublicKey,
    contract: ContractAddress,
    identity: Identity,
}

impl InputBuilder {
    pub fn new(network_key: X25519PublicKey, contract: ContractAddress, identity: Identity) -> Self {
        Self {
            network_key,
            contract,
            identity,
        }
    }

    /// Seal `value` as a `width`-bit encrypted integer.
    ///
    /// Fails with [`CodecError::ValueOutOfRange`] when the value does not fit.
    pub fn seal(&self, value: u64, width: FheType) -> Result<SealedInput> {
        if !width.fits(value) {
            return Err(CodecError::ValueOutOfRange { value, width }.into());
        }

        let context = input_context(&self.contract, &self.identity, width);
        let sealed = SealedBox::seal(&self.network_key, &encode_plaintext(value), &context)?;

        Ok(SealedInput {
            contract: self.contract,
            identity: self.identity,
            width,
            sealed,
        })
    }

    /// Seal a `euint32`.
    pub fn seal_u32(&self, value: u64) -> Result<SealedInput> {
        self.seal(value, FheType::Uint32)
    }
}
