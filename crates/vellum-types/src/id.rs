use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::TypeError;

/// Length of the canonical textual form.
const CANONICAL_LEN: usize = 36;

/// Byte offsets of the dashes in the canonical textual form.
const DASHES: [usize; 4] = [8, 13, 18, 23];

/// Opaque 128-bit identifier.
///
/// Used for revision ids, resource ids, and parent links. The all-zero value
/// is reserved as "empty": a ledger with a zero `parent_id` starts a chain.
///
/// The textual form is always the lowercase dashed layout
/// `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`; parsing rejects every other
/// spelling the `uuid` crate would otherwise accept (braces, uppercase,
/// simple form, URNs).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Id(Uuid);

impl Id {
    /// Generate a random (version 4) identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The reserved all-zero identifier.
    pub const fn zero() -> Self {
        Self(Uuid::nil())
    }

    /// Returns `true` if this is the reserved all-zero identifier.
    pub fn is_zero(&self) -> bool {
        self.0.is_nil()
    }

    /// Parse the canonical lowercase dashed form.
    pub fn parse(text: &str) -> Result<Self, TypeError> {
        if !is_canonical(text) {
            return Err(TypeError::InvalidId(text.to_string()));
        }
        Uuid::parse_str(text)
            .map(Self)
            .map_err(|_| TypeError::InvalidId(text.to_string()))
    }

    /// Wrap an existing `uuid::Uuid`.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying `uuid::Uuid`.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Raw 16 bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

fn is_canonical(text: &str) -> bool {
    let bytes = text.as_bytes();
    if bytes.len() != CANONICAL_LEN {
        return false;
    }
    bytes.iter().enumerate().all(|(i, b)| {
        if DASHES.contains(&i) {
            *b == b'-'
        } else {
            matches!(b, b'0'..=b'9' | b'a'..=b'f')
        }
    })
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.0.hyphenated())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for Id {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for Id {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<Id> for Uuid {
    fn from(id: Id) -> Self {
        id.0
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
