//! The vellum data model.
//!
//! A *ledger* is one immutable revision of a logical document. Revisions
//! sharing a `resource_id` form a chain linked by `parent_id`; a revision
//! whose parent belongs to another chain is a fork. Each revision points at
//! one content blob by address.
//!
//! # Key Types
//!
//! - [`Ledger`] / [`LedgerBuilder`] -- a revision and its validating builder
//! - [`Content`] -- a blob's metadata plus a single-shot byte body
//! - [`Query`] -- tag and author filters applied to revision lookups
//! - [`Tags`] -- sorted, deduplicated label set

pub mod content;
pub mod error;
pub mod ledger;
pub mod mime;
pub mod query;
pub mod tags;

pub use content::{Content, ContentInfo, ContentStream};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{Ledger, LedgerBuilder};
pub use query::Query;
pub use tags::Tags;
