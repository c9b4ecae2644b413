//! Secondary index planes and their decoded representation.
//!
//! A table carries up to four secondary planes (64-bit, 128-bit, 256-bit, double). Each
//! plane maps at most one secondary key per row to that row's primary key.

use serde::{Serialize, Serializer};

/// The four secondary planes, in projection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexPlane {
    Idx64,
    Idx128,
    Idx256,
    IdxDouble,
}

impl IndexPlane {
    pub const ALL: [IndexPlane; 4] = [
        IndexPlane::Idx64,
        IndexPlane::Idx128,
        IndexPlane::Idx256,
        IndexPlane::IdxDouble,
    ];

    pub const fn position(self) -> usize {
        match self {
            IndexPlane::Idx64 => 0,
            IndexPlane::Idx128 => 1,
            IndexPlane::Idx256 => 2,
            IndexPlane::IdxDouble => 3,
        }
    }
}

/// A secondary key as held by the physical store.
///
/// `U256` is two 128-bit words, most significant first. `Double` is the logical value;
/// the store keeps its bytes swapped (see [`normalize_double`]) and swaps them back on read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SecondaryKey {
    U64(u64),
    U128(u128),
    U256([u128; 2]),
    Double(f64),
}

impl SecondaryKey {
    pub fn plane(&self) -> IndexPlane {
        match self {
            SecondaryKey::U64(_) => IndexPlane::Idx64,
            SecondaryKey::U128(_) => IndexPlane::Idx128,
            SecondaryKey::U256(_) => IndexPlane::Idx256,
            SecondaryKey::Double(_) => IndexPlane::IdxDouble,
        }
    }

    /// Builds a 256-bit key from a 32-byte digest.
    pub fn u256_from_digest(digest: [u8; 32]) -> Self {
        let mut hi = [0u8; 16];
        let mut lo = [0u8; 16];
        hi.copy_from_slice(&digest[..16]);
        lo.copy_from_slice(&digest[16..]);
        SecondaryKey::U256([u128::from_be_bytes(hi), u128::from_be_bytes(lo)])
    }

    /// Decodes the key into its snapshot representation.
    pub fn decode(&self) -> SecondaryIndexValue {
        match *self {
            SecondaryKey::U64(value) => SecondaryIndexValue::U64 { value },
            SecondaryKey::U128(value) => SecondaryIndexValue::U128 {
                value,
                raw_value: value.to_le_bytes(),
            },
            SecondaryKey::U256(words) => SecondaryIndexValue::U256 {
                value: u256_to_hex(words),
            },
            SecondaryKey::Double(value) => SecondaryIndexValue::F64 {
                value: format_double(value),
            },
        }
    }
}

/// Writes the double into a little-endian buffer and reads it back big-endian.
/// Applying it twice yields the original bits.
pub fn normalize_double(value: f64) -> f64 {
    f64::from_be_bytes(value.to_le_bytes())
}

/// Shortest round-trip text; exponent form outside `[1e-6, 1e21)`, as in `1e+21` or `5e-324`.
pub fn format_double(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    if (1e-6..1e21).contains(&value.abs()) {
        return value.to_string();
    }
    let text = format!("{:e}", value);
    match text.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => format!("{}e+{}", mantissa, exponent),
        _ => text,
    }
}

fn u128_as_decimal<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

fn u256_digest(words: [u128; 2]) -> [u8; 32] {
    let mut digest = [0u8; 32];
    digest[..16].copy_from_slice(&words[0].to_be_bytes());
    digest[16..].copy_from_slice(&words[1].to_be_bytes());
    digest
}

fn u256_to_hex(words: [u128; 2]) -> String {
    hex::encode(u256_digest(words))
}

/// Decoded secondary entry attached to a snapshot row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum SecondaryIndexValue {
    #[serde(rename = "idxu64")]
    U64 { value: u64 },
    #[serde(rename = "idxU128")]
    U128 {
        #[serde(serialize_with = "u128_as_decimal")]
        value: u128,
        #[serde(rename = "rawValue")]
        raw_value: [u8; 16],
    },
    #[serde(rename = "idxU256")]
    U256 { value: String },
    #[serde(rename = "idxf64")]
    F64 { value: String },
}

impl SecondaryIndexValue {
    pub fn type_tag(&self) -> &'static str {
        match self {
            SecondaryIndexValue::U64 { .. } => "idxu64",
            SecondaryIndexValue::U128 { .. } => "idxU128",
            SecondaryIndexValue::U256 { .. } => "idxU256",
            SecondaryIndexValue::F64 { .. } => "idxf64",
        }
    }
}
