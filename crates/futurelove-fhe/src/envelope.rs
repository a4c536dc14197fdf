//! Sealed-box envelope.
//!
//! A [`SealedBox`] is a value encrypted to a recipient's X25519 key with a
//! fresh ephemeral key. Used in both directions: clients seal inputs to the
//! network key, the coprocessor seals decryption replies to a client's reply
//! key.

use serde::{Deserialize, Serialize};

use crate::crypto::{EncryptionNonce, EphemeralKeyPair, X25519PublicKey, X25519StaticSecret};
use crate::error::{FheError, Result};

/// Format identifier for sealed boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SealFormat {
    /// X25519 + BLAKE3 KDF + ChaCha20-Poly1305.
    X25519ChaCha20Poly1305 = 1,
}

/// A value sealed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBox {
    pub format: SealFormat,

    /// Sender's ephemeral public key.
    pub ephemeral: X25519PublicKey,

    /// Nonce used for encryption.
    pub nonce: EncryptionNonce,

    /// Ciphertext including the authentication tag.
    pub ciphertext: Vec<u8>,
}

impl SealedBox {
    /// Seal `plaintext` to `recipient`, bound to `context`.
    pub fn seal(recipient: &X25519PublicKey, plaintext: &[u8], context: &[u8]) -> Result<Self> {
        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key();
        let key = ephemeral
            .diffie_hellman(recipient)
            .derive_encryption_key(context);

        let nonce = EncryptionNonce::generate();
        let ciphertext = key.encrypt(plaintext, &nonce, context)?;

        Ok(Self {
            format: SealFormat::X25519ChaCha20Poly1305,
            ephemeral: ephemeral_public,
            nonce,
            ciphertext,
        })
    }

    /// Open with the recipient's secret. Fails if `context` differs.
    pub fn open(&self, secret: &X25519StaticSecret, context: &[u8]) -> Result<Vec<u8>> {
        match self.format {
            SealFormat::X25519ChaCha20Poly1305 => {
                let key = secret
                    .diffie_hellman(&self.ephemeral)
                    .derive_encryption_key(context);
                key.decrypt(&self.ciphertext, &self.nonce, context)
            }
        }
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| FheError::SerializationError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| FheError::SerializationError(e.to_string()))
    }
}

/// Plaintext wire form: big-endian u64.
pub fn encode_plaintext(value: u64) -> [u8; 8] {
    value.to_be_bytes()
}

/// Inverse of [`encode_plaintext`].
pub fn decode_plaintext(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| FheError::DecryptionError(format!("plaintext is {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let recipient = X25519StaticSecret::generate();
        let sealed = SealedBox::seal(&recipient.public_key(), b"value", b"ctx").unwrap();
        assert_eq!(sealed.open(&recipient, b"ctx").unwrap(), b"value");
    }

    #[test]
    fn test_open_wrong_recipient_fails() {
        let recipient = X25519StaticSecret::generate();
        let other = X25519StaticSecret::generate();
        let sealed = SealedBox::seal(&recipient.public_key(), b"value", b"ctx").unwrap();
        assert!(sealed.open(&other, b"ctx").is_err());
    }

    #[test]
    fn test_open_wrong_context_fails() {
        let recipient = X25519StaticSecret::generate();
        let sealed = SealedBox::seal(&recipient.public_key(), b"value", b"alice").unwrap();
        assert!(sealed.open(&recipient, b"bob").is_err());
    }

    #[test]
    fn test_cbor_roundtrip() {
        let recipient = X25519StaticSecret::generate();
        let sealed = SealedBox::seal(&recipient.public_key(), b"value", b"ctx").unwrap();
        let recovered = SealedBox::from_bytes(&sealed.to_bytes().unwrap()).unwrap();
        assert_eq!(recovered, sealed);
    }

    #[test]
    fn test_plaintext_wire_form() {
        assert_eq!(decode_plaintext(&encode_plaintext(1_234_567_890)).unwrap(), 1_234_567_890);
        assert!(decode_plaintext(&[1, 2, 3]).is_err());
    }
}
