use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::Ledger;
use crate::tags::{Tags, MAX_TAG_LEN};

/// Filter applied to revision lookups.
///
/// - Empty `tags` matches every row; otherwise a row matches when its tags
///   share at least one label with the query.
/// - `author_id: None` matches every row. `Some("")` matches only rows whose
///   author is the empty string, which is distinct from "any author".
///
/// Both predicates must hold.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub author_id: Option<String>,
}

impl Query {
    /// The query that matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Tags::from_iter(tags);
        self
    }

    pub fn with_author(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = Some(author_id.into());
        self
    }

    /// Returns `true` if no filter is set.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.author_id.is_none()
    }

    /// Reject empty or oversized tag filters.
    pub fn validate(&self) -> LedgerResult<()> {
        for tag in &self.tags {
            if tag.is_empty() {
                return Err(LedgerError::BadQuery("empty tag filter".into()));
            }
            if tag.len() > MAX_TAG_LEN {
                return Err(LedgerError::BadQuery(format!(
                    "tag filter {tag:?} exceeds {MAX_TAG_LEN} bytes"
                )));
            }
        }
        Ok(())
    }

    /// Evaluate both predicates against a revision.
    pub fn matches(&self, ledger: &Ledger) -> bool {
        let tags_ok = self.tags.is_empty() || self.tags.intersects(&ledger.tags);
        let author_ok = self
            .author_id
            .as_deref()
            .map_or(true, |author| author == ledger.author_id);
        tags_ok && author_ok
    }
}
