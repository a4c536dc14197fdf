//! Sequence codec: plaintext integer <-> ten-digit preference sequence.
//!
//! A sequence is ten decimal digits. Digit 0 is the category flag, digits
//! 1..10 are free-form. The integer form is the digits read as a base-10
//! numeral, so leading zeros are implicit: `decode(42)` yields
//! `0000000042`.
//!
//! The raw flag digit is preserved through decoding, which keeps
//! `encode(decode(v)) == v` exact for every `v < 10^10`, including values
//! whose leading digit is not a valid category flag. Rendering treats any
//! non-zero flag as [`Category::Male`].

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CodecError;

/// Number of digits in a sequence.
pub const SEQUENCE_DIGITS: usize = 10;

/// Number of free-form digits after the category flag.
pub const RANDOM_DIGITS: usize = SEQUENCE_DIGITS - 1;

/// Exclusive upper bound of a sequence value.
pub const SEQUENCE_LIMIT: u64 = 10_000_000_000;

/// The binary category encoded in the leading digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Category {
    Female = 0,
    Male = 1,
}

impl Category {
    /// Parse a strict category flag (0 or 1).
    pub fn from_flag(flag: u8) -> Result<Self, CodecError> {
        match flag {
            0 => Ok(Category::Female),
            1 => Ok(Category::Male),
            other => Err(CodecError::InvalidCategory(other)),
        }
    }

    /// The category used to render a raw flag digit.
    pub fn render_flag(flag: u8) -> Self {
        if flag == 0 {
            Category::Female
        } else {
            Category::Male
        }
    }

    /// The flag digit.
    pub const fn flag(self) -> u8 {
        self as u8
    }

    /// Avatar seed prefix.
    pub const fn prefix(self) -> &'static str {
        match self {
            Category::Female => "female",
            Category::Male => "male",
        }
    }
}

/// A decoded ten-digit sequence.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sequence {
    digits: [u8; SEQUENCE_DIGITS],
}

impl Sequence {
    /// Decode an integer into its zero-padded digits.
    pub fn decode(value: u64) -> Result<Self, CodecError> {
        if value >= SEQUENCE_LIMIT {
            return Err(CodecError::SequenceTooLong(value));
        }

        let mut digits = [0u8; SEQUENCE_DIGITS];
        let mut rest = value;
        for slot in digits.iter_mut().rev() {
            *slot = (rest % 10) as u8;
            rest /= 10;
        }
        Ok(Self { digits })
    }

    /// Build a sequence from a category and nine free-form digits.
    pub fn from_parts(
        category: Category,
        random_digits: &[u8; RANDOM_DIGITS],
    ) -> Result<Self, CodecError> {
        let mut digits = [0u8; SEQUENCE_DIGITS];
        digits[0] = category.flag();
        for (i, &digit) in random_digits.iter().enumerate() {
            if digit > 9 {
                return Err(CodecError::InvalidDigit {
                    position: i + 1,
                    digit,
                });
            }
            digits[i + 1] = digit;
        }
        Ok(Self { digits })
    }

    /// Draw nine random digits after the category flag.
    pub fn generate<R: Rng + ?Sized>(category: Category, rng: &mut R) -> Self {
        let mut digits = [0u8; SEQUENCE_DIGITS];
        digits[0] = category.flag();
        for slot in digits.iter_mut().skip(1) {
            *slot = rng.gen_range(0..10);
        }
        Self { digits }
    }

    /// The integer form (digits read as a base-10 numeral).
    pub fn value(&self) -> u64 {
        self.digits
            .iter()
            .fold(0u64, |acc, &digit| acc * 10 + digit as u64)
    }

    /// All ten digits.
    pub const fn digits(&self) -> &[u8; SEQUENCE_DIGITS] {
        &self.digits
    }

    /// The raw leading flag digit.
    pub const fn flag(&self) -> u8 {
        self.digits[0]
    }

    /// The rendering category of the flag digit.
    pub fn category(&self) -> Category {
        Category::render_flag(self.flag())
    }

    /// The nine free-form digits.
    pub fn random_digits(&self) -> [u8; RANDOM_DIGITS] {
        let mut out = [0u8; RANDOM_DIGITS];
        out.copy_from_slice(&self.digits[1..]);
        out
    }

    /// Derive the avatar seed for this sequence.
    pub fn avatar_seed(&self) -> AvatarSeed {
        AvatarSeed::from_sequence(self)
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sequence({})", self)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for digit in &self.digits {
            write!(f, "{}", digit)?;
        }
        Ok(())
    }
}

/// Encode a category and nine free-form digits as an integer.
pub fn encode(category: Category, random_digits: &[u8; RANDOM_DIGITS]) -> Result<u64, CodecError> {
    Sequence::from_parts(category, random_digits).map(|s| s.value())
}

/// Decode an integer into its ten zero-padded digits.
pub fn decode(value: u64) -> Result<Sequence, CodecError> {
    Sequence::decode(value)
}

/// Deterministic avatar seed: `<category-prefix>-<9 digits>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AvatarSeed(String);

impl AvatarSeed {
    /// Derive the seed from a sequence.
    pub fn from_sequence(sequence: &Sequence) -> Self {
        let mut seed = String::with_capacity(6 + 1 + RANDOM_DIGITS);
        seed.push_str(sequence.category().prefix());
        seed.push('-');
        for digit in sequence.random_digits() {
            seed.push(char::from(b'0' + digit));
        }
        Self(seed)
    }

    /// Derive the seed straight from a decrypted value.
    pub fn from_value(value: u64) -> Result<Self, CodecError> {
        Sequence::decode(value).map(|s| Self::from_sequence(&s))
    }

    /// Parse and validate a seed string.
    pub fn parse(s: &str) -> Result<Self, CodecError> {
        let malformed = || CodecError::MalformedSeed(s.to_string());
        let (prefix, digits) = s.split_once('-').ok_or_else(malformed)?;

        if prefix != Category::Female.prefix() && prefix != Category::Male.prefix() {
            return Err(malformed());
        }
        if digits.len() != RANDOM_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        Ok(Self(s.to_string()))
    }

    /// The seed string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AvatarSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
