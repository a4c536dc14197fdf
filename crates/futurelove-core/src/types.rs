//! Strong type definitions for FutureLove.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::Ed25519PublicKey;
use crate::error::CoreError;

/// Parse a fixed-length hex string, with or without a `0x` prefix.
fn parse_hex<const N: usize>(s: &str) -> Result<[u8; N], hex::FromHexError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s)?;
    if bytes.len() != N {
        return Err(hex::FromHexError::InvalidStringLength);
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// A 20-byte account identity.
///
/// Derived from the account's Ed25519 verifying key, so a signature over a
/// message can always be traced back to exactly one identity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity(pub [u8; 20]);

impl Identity {
    /// Derive the identity owned by a verifying key.
    pub fn from_public_key(key: &Ed25519PublicKey) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key("futurelove-identity-v0");
        hasher.update(key.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest.as_bytes()[..20]);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Convert to `0x`-prefixed hex string.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        parse_hex(s).map(Self)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..12])
    }
}

impl AsRef<[u8]> for Identity {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 20]> for Identity {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Identity {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 20] = slice.try_into()?;
        Ok(Self(arr))
    }
}

/// A 20-byte deployed contract address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractAddress(pub [u8; 20]);

impl ContractAddress {
    /// Derive the address of a contract deployed by `deployer` at `nonce`.
    pub fn derive(deployer: &Identity, nonce: u64) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key("futurelove-contract-v0");
        hasher.update(deployer.as_bytes());
        hasher.update(&nonce.to_be_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest.as_bytes()[..20]);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Convert to `0x`-prefixed hex string.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        parse_hex(s).map(Self)
    }
}

impl fmt::Debug for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Contract({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// The encrypted integer type carried by a ciphertext.
///
/// The discriminant is embedded in byte 30 of every [`CiphertextHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FheType {
    Bool = 0,
    Uint8 = 2,
    Uint16 = 3,
    Uint32 = 4,
    Uint64 = 5,
}

impl FheType {
    /// Number of plaintext bits.
    pub const fn bits(self) -> u32 {
        match self {
            FheType::Bool => 1,
            FheType::Uint8 => 8,
            FheType::Uint16 => 16,
            FheType::Uint32 => 32,
            FheType::Uint64 => 64,
        }
    }

    /// Largest plaintext representable in this type.
    pub const fn max_value(self) -> u64 {
        match self {
            FheType::Uint64 => u64::MAX,
            other => (1u64 << other.bits()) - 1,
        }
    }

    /// Whether `value` fits in this type.
    pub const fn fits(self, value: u64) -> bool {
        value <= self.max_value()
    }

    /// Convert to the wire tag.
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse from the wire tag.
    pub const fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(FheType::Bool),
            2 => Some(FheType::Uint8),
            3 => Some(FheType::Uint16),
            4 => Some(FheType::Uint32),
            5 => Some(FheType::Uint64),
            _ => None,
        }
    }
}

impl fmt::Display for FheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FheType::Bool => write!(f, "ebool"),
            other => write!(f, "euint{}", other.bits()),
        }
    }
}

/// Current handle layout version (byte 31).
pub const HANDLE_VERSION: u8 = 0;

/// A 32-byte opaque reference to a ciphertext held by the coprocessor.
///
/// Layout: `digest[0..30] || fhe_type || version`. The digest binds the
/// ciphertext to its contract and owner, so equal plaintexts submitted by
/// different identities never share a handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CiphertextHandle(pub [u8; 32]);

impl CiphertextHandle {
    /// Derive the handle for a ciphertext submitted under `(contract, owner)`.
    pub fn derive(
        ciphertext: &[u8],
        contract: &ContractAddress,
        owner: &Identity,
        fhe_type: FheType,
    ) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key("futurelove-handle-v0");
        hasher.update(contract.as_bytes());
        hasher.update(owner.as_bytes());
        hasher.update(&[fhe_type.to_u8()]);
        hasher.update(ciphertext);
        let digest = hasher.finalize();

        let mut bytes = [0u8; 32];
        bytes[..30].copy_from_slice(&digest.as_bytes()[..30]);
        bytes[30] = fhe_type.to_u8();
        bytes[31] = HANDLE_VERSION;
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The encrypted type embedded in the handle.
    pub fn fhe_type(&self) -> Result<FheType, CoreError> {
        FheType::from_u8(self.0[30]).ok_or(CoreError::UnknownFheType(self.0[30]))
    }

    /// The layout version embedded in the handle.
    pub const fn version(&self) -> u8 {
        self.0[31]
    }

    /// Convert to `0x`-prefixed hex string.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        parse_hex(s).map(Self)
    }
}

impl fmt::Debug for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", &self.to_hex()[..18])
    }
}

impl fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..18])
    }
}

impl AsRef<[u8]> for CiphertextHandle {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for CiphertextHandle {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = slice.try_into()?;
        Ok(Self(arr))
    }
}
