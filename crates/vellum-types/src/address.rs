use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Length of a lowercase hex SHA-256 digest.
pub const HEX_LEN: usize = 64;

/// Length of a padded URL-safe base64 SHA-256 digest.
pub const BASE64_LEN: usize = 44;

/// Content address of a blob.
///
/// An address is the encoded SHA-256 digest of a payload and doubles as the
/// payload's storage key. Two payloads with the same address are considered
/// identical. The empty address means "no content".
///
/// Two encodings are recognized: 64 lowercase hex characters (the default)
/// and 44 characters of padded URL-safe base64.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(String);

impl Address {
    /// The empty address.
    pub const fn empty() -> Self {
        Self(String::new())
    }

    /// Returns `true` if this address points at nothing.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse an address in either recognized encoding. The empty string
    /// parses to [`Address::empty`].
    pub fn parse(text: &str) -> Result<Self, TypeError> {
        if text.is_empty() || is_hex_digest(text) || is_base64_digest(text) {
            Ok(Self(text.to_string()))
        } else {
            Err(TypeError::InvalidAddress(text.to_string()))
        }
    }

    /// Wrap an already-encoded digest without validation.
    ///
    /// Intended for hashers, which produce well-formed addresses by
    /// construction.
    pub fn from_encoded(encoded: String) -> Self {
        Self(encoded)
    }

    /// The encoded digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 8 characters) for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

fn is_hex_digest(text: &str) -> bool {
    text.len() == HEX_LEN && text.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn is_base64_digest(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() == BASE64_LEN
        && bytes[BASE64_LEN - 1] == b'='
        && bytes[..BASE64_LEN - 1]
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || *b == b'-' || *b == b'_')
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.short())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
