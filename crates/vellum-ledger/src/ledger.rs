use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vellum_types::time::{self, rfc3339_seconds};
use vellum_types::{Address, Id};

use crate::error::{LedgerError, LedgerResult};
use crate::mime;
use crate::tags::Tags;

/// One immutable revision of a logical document.
///
/// Revisions sharing a `resource_id` form a chain ordered by `created_on`.
/// `parent_id` links to the previous revision, or is zero for the first
/// revision of a chain. A revision whose parent belongs to a different
/// `resource_id` is the root of a fork.
///
/// Equality ignores `id`, which the metadata store assigns on insert.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub id: Id,
    #[serde(default)]
    pub parent_id: Id,
    pub resource_id: Id,
    pub name: String,
    pub author_id: String,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub resource_address: Address,
    #[serde(default)]
    pub resource_size: u64,
    #[serde(default)]
    pub resource_content_type: String,
    #[serde(with = "rfc3339_seconds", default = "time::zero")]
    pub created_on: DateTime<Utc>,
    #[serde(with = "rfc3339_seconds", default = "time::zero")]
    pub deleted_on: DateTime<Utc>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self {
            id: Id::zero(),
            parent_id: Id::zero(),
            resource_id: Id::zero(),
            name: String::new(),
            author_id: String::new(),
            tags: Tags::new(),
            resource_address: Address::empty(),
            resource_size: 0,
            resource_content_type: String::new(),
            created_on: time::zero(),
            deleted_on: time::zero(),
        }
    }
}

impl Ledger {
    /// Start building a revision.
    pub fn builder() -> LedgerBuilder {
        LedgerBuilder::default()
    }

    /// Check the invariants every stored revision must hold.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.name.is_empty() {
            return Err(LedgerError::InvalidInput("name is required".into()));
        }
        if self.author_id.is_empty() {
            return Err(LedgerError::InvalidInput("author_id is required".into()));
        }
        // Kept as a string so an empty author filter stays distinct from none.
        Id::parse(&self.author_id).map_err(|_| {
            LedgerError::InvalidInput(format!("author_id {:?} is not an identifier", self.author_id))
        })?;
        if self.resource_id.is_zero() {
            return Err(LedgerError::InvalidInput("resource_id is required".into()));
        }
        self.tags.validate()?;
        if !self.resource_address.is_empty() {
            Address::parse(self.resource_address.as_str())?;
        }
        if !self.resource_content_type.is_empty() {
            mime::validate(&self.resource_content_type)?;
        }
        Ok(())
    }

    /// Returns `true` for the first revision of a chain.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_zero()
    }

    /// Returns `true` if this revision records a logical deletion.
    pub fn is_deleted(&self) -> bool {
        !time::is_zero(&self.deleted_on)
    }

    /// Returns `true` if this revision points at a content blob.
    pub fn has_content(&self) -> bool {
        !self.resource_address.is_empty()
    }

    /// Render as JSON.
    pub fn to_json(&self) -> LedgerResult<String> {
        serde_json::to_string(self).map_err(|e| LedgerError::InvalidInput(e.to_string()))
    }

    /// Parse from JSON and validate.
    pub fn from_json(text: &str) -> LedgerResult<Self> {
        let ledger: Self =
            serde_json::from_str(text).map_err(|e| LedgerError::InvalidInput(e.to_string()))?;
        ledger.validate()?;
        Ok(ledger)
    }
}

impl PartialEq for Ledger {
    fn eq(&self, other: &Self) -> bool {
        self.parent_id == other.parent_id
            && self.resource_id == other.resource_id
            && self.name == other.name
            && self.author_id == other.author_id
            && self.tags == other.tags
            && self.resource_address == other.resource_address
            && self.resource_size == other.resource_size
            && self.resource_content_type == other.resource_content_type
            && self.created_on == other.created_on
            && self.deleted_on == other.deleted_on
    }
}

impl Eq for Ledger {}

/// Validating builder for [`Ledger`].
///
/// Every field is optional until [`build`](Self::build). `name`,
/// `author_id`, and `resource_id` are required; timestamps default to the
/// zero instant and are stamped by the repository.
#[derive(Clone, Debug, Default)]
pub struct LedgerBuilder {
    id: Option<Id>,
    parent_id: Option<Id>,
    resource_id: Option<Id>,
    name: Option<String>,
    author_id: Option<String>,
    tags: Option<Tags>,
    resource_address: Option<Address>,
    resource_size: Option<u64>,
    resource_content_type: Option<String>,
    created_on: Option<DateTime<Utc>>,
    deleted_on: Option<DateTime<Utc>>,
}

impl LedgerBuilder {
    pub fn id(mut self, id: Id) -> Self {
        self.id = Some(id);
        self
    }

    pub fn parent_id(mut self, parent_id: Id) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn resource_id(mut self, resource_id: Id) -> Self {
        self.resource_id = Some(resource_id);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn author_id(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = Some(author_id.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().collect());
        self
    }

    /// Point at a content blob.
    pub fn resource(
        mut self,
        address: Address,
        size: u64,
        content_type: impl Into<String>,
    ) -> Self {
        self.resource_address = Some(address);
        self.resource_size = Some(size);
        self.resource_content_type = Some(content_type.into());
        self
    }

    pub fn created_on(mut self, created_on: DateTime<Utc>) -> Self {
        self.created_on = Some(created_on);
        self
    }

    pub fn deleted_on(mut self, deleted_on: DateTime<Utc>) -> Self {
        self.deleted_on = Some(deleted_on);
        self
    }

    /// Assemble and validate.
    pub fn build(self) -> LedgerResult<Ledger> {
        let name = self
            .name
            .ok_or_else(|| LedgerError::InvalidInput("name is required".into()))?;
        let author_id = self
            .author_id
            .ok_or_else(|| LedgerError::InvalidInput("author_id is required".into()))?;
        let resource_id = self
            .resource_id
            .ok_or_else(|| LedgerError::InvalidInput("resource_id is required".into()))?;
        let ledger = Ledger {
            id: self.id.unwrap_or_default(),
            parent_id: self.parent_id.unwrap_or_default(),
            resource_id,
            name,
            author_id,
            tags: self.tags.unwrap_or_default(),
            resource_address: self.resource_address.unwrap_or_default(),
            resource_size: self.resource_size.unwrap_or_default(),
            resource_content_type: self.resource_content_type.unwrap_or_default(),
            created_on: self.created_on.unwrap_or_else(time::zero),
            deleted_on: self.deleted_on.unwrap_or_else(time::zero),
        };
        ledger.validate()?;
        Ok(ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
    const AUTHOR: &str = "11111111-1111-4111-8111-111111111111";

    fn base() -> LedgerBuilder {
        Ledger::builder()
            .resource_id(Id::new())
            .name("doc-1")
            .author_id(AUTHOR)
    }

    // -----------------------------------------------------------------------
    // Builder
    // -----------------------------------------------------------------------

    #[test]
    fn build_minimal() {
        let ledger = base().build().unwrap();
        assert!(ledger.is_root());
        assert!(!ledger.is_deleted());
        assert!(!ledger.has_content());
        assert!(ledger.id.is_zero());
        assert!(time::is_zero(&ledger.created_on));
    }

    #[test]
    fn missing_required_fields() {
        let no_name = Ledger::builder()
            .resource_id(Id::new())
            .author_id(AUTHOR)
            .build();
        let no_author = Ledger::builder().resource_id(Id::new()).name("n").build();
        let no_resource = Ledger::builder().name("n").author_id(AUTHOR).build();
        for result in [no_name, no_author, no_resource] {
            assert!(matches!(result, Err(LedgerError::InvalidInput(_))));
        }
    }

    #[test]
    fn empty_strings_are_rejected() {
        assert!(base().name("").build().is_err());
        assert!(base().author_id("").build().is_err());
        assert!(base().resource_id(Id::zero()).build().is_err());
    }

    #[test]
    fn author_must_be_an_identifier() {
        for author in ["alice", "1111", "11111111-1111-4111-8111-11111111111Z"] {
            let err = base().author_id(author).build().unwrap_err();
            assert!(matches!(err, LedgerError::InvalidInput(_)), "{author}");
        }
    }

    #[test]
    fn bad_content_type_rejected() {
        let addr = Address::parse(HELLO).unwrap();
        assert!(base().resource(addr.clone(), 5, "not a mime").build().is_err());
        assert!(base().resource(addr, 5, "text/plain").build().is_ok());
    }

    #[test]
    fn tags_are_normalized() {
        let ledger = base().tags(["b", "a", "b"]).build().unwrap();
        assert_eq!(ledger.tags.to_vec(), vec!["a", "b"]);
    }

    // -----------------------------------------------------------------------
    // Equality
    // -----------------------------------------------------------------------

    #[test]
    fn equality_ignores_id() {
        let a = base().build().unwrap();
        let mut b = a.clone();
        b.id = Id::new();
        assert_eq!(a, b);
        b.name = "other".into();
        assert_ne!(a, b);
    }

    // -----------------------------------------------------------------------
    // JSON
    // -----------------------------------------------------------------------

    #[test]
    fn json_shape() {
        let created = time::parse_rfc3339("2024-05-06T07:08:09.654321Z").unwrap();
        let ledger = base()
            .resource(Address::parse(HELLO).unwrap(), 5, "text/plain")
            .created_on(created)
            .build()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&ledger.to_json().unwrap()).unwrap();
        assert_eq!(value["tags"], serde_json::json!([]));
        assert_eq!(value["created_on"], "2024-05-06T07:08:09Z");
        assert_eq!(value["deleted_on"], "0001-01-01T00:00:00Z");
        assert_eq!(value["resource_address"], HELLO);
        assert_eq!(value["parent_id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(value["resource_size"], 5);
    }

    #[test]
    fn json_null_tags_read_as_empty() {
        let text = format!(
            r#"{{"resource_id":"{}","name":"n","author_id":"{AUTHOR}","tags":null}}"#,
            Id::new()
        );
        let ledger = Ledger::from_json(&text).unwrap();
        assert!(ledger.tags.is_empty());
        assert!(time::is_zero(&ledger.created_on));
    }

    #[test]
    fn from_json_validates() {
        let text = format!(r#"{{"resource_id":"{}","name":"","author_id":"{AUTHOR}"}}"#, Id::new());
        assert!(Ledger::from_json(&text).is_err());
        let text = format!(r#"{{"resource_id":"{}","name":"n","author_id":"alice"}}"#, Id::new());
        assert!(Ledger::from_json(&text).is_err());
    }
}
