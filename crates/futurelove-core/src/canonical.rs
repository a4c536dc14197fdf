//! Canonical CBOR encoding for deterministic signed messages.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! Every message that is signed (input proofs, decryption authorizations,
//! transactions) is built as a [`CanonicalMap`] with small integer keys and a
//! text domain tag under key 0, so a signature for one message kind can never
//! verify as another.

use ciborium::value::{Integer, Value};

/// Builder for a CBOR map with integer keys.
#[derive(Debug, Clone)]
pub struct CanonicalMap {
    entries: Vec<(Value, Value)>,
}

impl CanonicalMap {
    /// Start a map tagged with a domain separator under key 0.
    pub fn new(domain: &str) -> Self {
        Self {
            entries: vec![(Value::Integer(0u64.into()), Value::Text(domain.to_string()))],
        }
    }

    /// Add a byte-string field.
    pub fn bytes(mut self, key: u64, bytes: &[u8]) -> Self {
        self.entries
            .push((Value::Integer(key.into()), Value::Bytes(bytes.to_vec())));
        self
    }

    /// Add an unsigned integer field.
    pub fn uint(mut self, key: u64, n: u64) -> Self {
        self.entries
            .push((Value::Integer(key.into()), Value::Integer(n.into())));
        self
    }

    /// Add a signed integer field.
    pub fn int(mut self, key: u64, n: i64) -> Self {
        self.entries
            .push((Value::Integer(key.into()), Value::Integer(n.into())));
        self
    }

    /// Add a nested map field.
    pub fn map(mut self, key: u64, nested: CanonicalMap) -> Self {
        self.entries
            .push((Value::Integer(key.into()), nested.into_value()));
        self
    }

    /// Convert into a CBOR value.
    pub fn into_value(self) -> Value {
        Value::Map(self.entries)
    }

    /// Encode to canonical bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_map_canonical(&mut buf, &self.entries);
        buf
    }
}

/// Encode a CBOR value to canonical bytes.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value);
    buf
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => encode_array(buf, arr),
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        // Signed messages are built exclusively through `CanonicalMap`, which
        // never produces floats or tags.
        _ => buf.push(0xf7),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffffffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode an array (major type 4).
fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item);
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut key_value_pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, key_value_pairs.len() as u64);

    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}
