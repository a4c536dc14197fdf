//! Proptest generators for property-based testing.

use proptest::prelude::*;

use futurelove::core::codec::RANDOM_DIGITS;
use futurelove::core::{Category, Identity, Keypair, Sequence, SEQUENCE_LIMIT};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random Identity.
pub fn identity() -> impl Strategy<Value = Identity> {
    any::<[u8; 20]>().prop_map(Identity::from_bytes)
}

pub fn category() -> impl Strategy<Value = Category> {
    prop_oneof![Just(Category::Female), Just(Category::Male)]
}

/// Nine free-form digits.
pub fn random_digits() -> impl Strategy<Value = [u8; RANDOM_DIGITS]> {
    prop::array::uniform9(0u8..10)
}

/// A well-formed sequence with a strict category flag.
pub fn sequence() -> impl Strategy<Value = Sequence> {
    (category(), random_digits()).prop_filter_map("digits in range", |(category, digits)| {
        Sequence::from_parts(category, &digits).ok()
    })
}

/// Any value the ten-digit codec accepts.
pub fn sequence_value() -> impl Strategy<Value = u64> {
    0..SEQUENCE_LIMIT
}

/// Any value that fits the 32-bit encrypted field.
pub fn euint32_value() -> impl Strategy<Value = u64> {
    0..=u32::MAX as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use futurelove::core::codec::{decode, encode};
    use futurelove::AvatarSeed;

    proptest! {
        #[test]
        fn test_generated_sequences_roundtrip(seq in sequence()) {
            let value = encode(seq.category(), &seq.random_digits()).unwrap();
            prop_assert_eq!(decode(value).unwrap(), seq);
        }

        #[test]
        fn test_seed_parses_back(value in sequence_value()) {
            let seed = AvatarSeed::from_value(value).unwrap();
            prop_assert_eq!(AvatarSeed::parse(seed.as_str()).unwrap(), seed);
        }

        #[test]
        fn test_keypair_identity_stable(kp in keypair()) {
            prop_assert_eq!(kp.identity(), kp.public_key().identity());
        }
    }
}
