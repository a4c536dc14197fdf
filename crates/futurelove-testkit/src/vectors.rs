//! Golden avatar-seed vectors.
//!
//! Any implementation of the sequence codec must map these values to the
//! same ten-digit rendering and the same seed. The set is exported as JSON
//! for other implementations to consume.

use serde::{Deserialize, Serialize};

use futurelove::core::{AvatarSeed, Sequence};

/// A golden test vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarVector {
    /// Human-readable name for the vector.
    pub name: String,
    /// The decrypted integer.
    pub value: u64,
    /// Zero-padded ten-digit rendering.
    pub sequence: String,
    /// Expected avatar seed.
    pub seed: String,
}

fn vector(name: &str, value: u64, sequence: &str, seed: &str) -> AvatarVector {
    AvatarVector {
        name: name.to_string(),
        value,
        sequence: sequence.to_string(),
        seed: seed.to_string(),
    }
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<AvatarVector> {
    vec![
        vector("male flag", 1234567890, "1234567890", "male-234567890"),
        vector("female flag, leading zero", 234567890, "0234567890", "female-234567890"),
        vector("zero", 0, "0000000000", "female-000000000"),
        vector("short value pads", 123, "0000000123", "female-000000123"),
        vector("nonzero non-binary flag", 2222222222, "2222222222", "male-222222222"),
        vector("euint32 maximum", 4294967295, "4294967295", "male-294967295"),
        vector("male, zero digits", 1000000000, "1000000000", "male-000000000"),
        vector("largest female", 999999999, "0999999999", "female-999999999"),
    ]
}

/// The vector set as pretty JSON.
pub fn vectors_json() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&all_vectors())
}

/// Parse a vector set produced by [`vectors_json`].
pub fn load_vectors(json: &str) -> serde_json::Result<Vec<AvatarVector>> {
    serde_json::from_str(json)
}

/// Check each vector against the codec: `(name, matches, rendered seed)`.
pub fn verify_vectors(vectors: &[AvatarVector]) -> Vec<(String, bool, String)> {
    vectors
        .iter()
        .map(|v| match Sequence::decode(v.value) {
            Ok(sequence) => {
                let seed = AvatarSeed::from_sequence(&sequence);
                let matches = sequence.to_string() == v.sequence && seed.as_str() == v.seed;
                (v.name.clone(), matches, seed.to_string())
            }
            Err(e) => (v.name.clone(), false, e.to_string()),
        })
        .collect()
}

/// Check the built-in set.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    verify_vectors(&all_vectors())
}
