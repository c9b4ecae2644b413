//! Account, action, table and scope names.
//!
//! A name is a 64-bit integer holding up to 13 symbols from the base-32 alphabet
//! `.12345abcdefghijklmnopqrstuvwxyz`. The first 12 symbols take 5 bits each, the
//! 13th takes the remaining 4 bits (so it is limited to `.12345a-j`). Parsing is
//! case-insensitive; display trims trailing `.` symbols.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::error::SimError;

/// Symbol alphabet in value order.
pub const NAME_CHARSET: &[u8; 32] = b".12345abcdefghijklmnopqrstuvwxyz";

/// Maximum encoded length of a name.
pub const MAX_NAME_LEN: usize = 13;

/// Errors produced by the name codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("name `{0}` is longer than 13 characters")]
    TooLong(String),

    #[error("name `{name}` contains invalid character `{ch}`")]
    InvalidCharacter { name: String, ch: char },

    #[error("name `{0}` has a 13th character outside `.12345a-j`")]
    InvalidThirteenth(String),
}

impl From<NameError> for SimError {
    fn from(err: NameError) -> Self {
        SimError::InvalidName(err.to_string())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Name(u64);

fn symbol_value(ch: u8) -> Option<u64> {
    match ch {
        b'a'..=b'z' => Some((ch - b'a') as u64 + 6),
        b'1'..=b'5' => Some((ch - b'1') as u64 + 1),
        b'.' => Some(0),
        _ => None,
    }
}

impl Name {
    pub const EMPTY: Name = Name(0);

    pub const fn from_raw(value: u64) -> Self {
        Name(value)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Parses a name, lowercasing ASCII letters first.
    pub fn parse(s: &str) -> std::result::Result<Self, NameError> {
        let lowered = s.to_ascii_lowercase();
        let bytes = lowered.as_bytes();
        if bytes.len() > MAX_NAME_LEN {
            return Err(NameError::TooLong(s.to_string()));
        }

        let mut value: u64 = 0;
        for (i, &ch) in bytes.iter().enumerate() {
            let sym = symbol_value(ch).ok_or_else(|| NameError::InvalidCharacter {
                name: s.to_string(),
                ch: ch as char,
            })?;
            if i < 12 {
                value |= (sym & 0x1f) << (64 - 5 * (i + 1));
            } else {
                if sym > 0x0f {
                    return Err(NameError::InvalidThirteenth(s.to_string()));
                }
                value |= sym;
            }
        }
        Ok(Name(value))
    }

    /// Full 13-symbol rendering without trimming.
    fn render(&self) -> [u8; MAX_NAME_LEN] {
        let mut out = [b'.'; MAX_NAME_LEN];
        let mut tmp = self.0;
        for i in 0..MAX_NAME_LEN {
            let mask = if i == 0 { 0x0f } else { 0x1f };
            out[12 - i] = NAME_CHARSET[(tmp & mask) as usize];
            tmp >>= if i == 0 { 4 } else { 5 };
        }
        out
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self.render();
        let end = rendered
            .iter()
            .rposition(|&c| c != b'.')
            .map(|p| p + 1)
            .unwrap_or(0);
        // Charset is ASCII.
        f.write_str(std::str::from_utf8(&rendered[..end]).map_err(|_| fmt::Error)?)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self)
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Name::parse(s)
    }
}

impl TryFrom<&str> for Name {
    type Error = NameError;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        Name::parse(s)
    }
}

impl From<u64> for Name {
    fn from(value: u64) -> Self {
        Name(value)
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Name::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Builds a name from a literal known to be valid. Panics otherwise; meant for constants and tests.
pub fn n(s: &str) -> Name {
    match Name::parse(s) {
        Ok(name) => name,
        Err(e) => panic!("{}", e),
    }
}
