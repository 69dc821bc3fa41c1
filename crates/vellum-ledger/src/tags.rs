use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{LedgerError, LedgerResult};

/// Longest tag accepted, in bytes.
pub const MAX_TAG_LEN: usize = 64;

/// Sorted, deduplicated set of labels.
///
/// Always serializes as a JSON array (possibly empty); `null` deserializes
/// to the empty set.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Tags(BTreeSet<String>);

impl Tags {
    /// The empty set.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    /// Labels in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Returns `true` if the two sets share at least one label.
    pub fn intersects(&self, other: &Tags) -> bool {
        // Walk the smaller set.
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.0.iter().any(|tag| large.0.contains(tag))
    }

    /// Reject empty or oversized labels.
    pub fn validate(&self) -> LedgerResult<()> {
        for tag in &self.0 {
            if tag.is_empty() {
                return Err(LedgerError::InvalidInput("tag must not be empty".into()));
            }
            if tag.len() > MAX_TAG_LEN {
                return Err(LedgerError::InvalidInput(format!(
                    "tag {tag:?} exceeds {MAX_TAG_LEN} bytes"
                )));
            }
        }
        Ok(())
    }

    /// Labels as an owned, sorted vector.
    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl fmt::Debug for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.iter()).finish()
    }
}

impl<S: Into<String>> FromIterator<S> for Tags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<Vec<String>> for Tags {
    fn from(tags: Vec<String>) -> Self {
        Self(tags.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Tags {
    type Item = &'a String;
    type IntoIter = std::collections::btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for Tags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl<'de> Deserialize<'de> for Tags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tags = Option::<Vec<String>>::deserialize(deserializer)?;
        Ok(tags.map(Self::from).unwrap_or_default())
    }
}
