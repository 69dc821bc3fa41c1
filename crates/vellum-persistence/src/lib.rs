//! Ledger metadata storage for vellum.
//!
//! Stores revision rows and answers the lookups the repository needs:
//! latest-by-resource, full history, fork discovery, and counters.
//!
//! # Storage Backends
//!
//! All backends implement the [`MetadataStore`] trait:
//!
//! - [`PostgresPersistence`] -- one `ledgers` table behind an `sqlx` pool
//! - [`VirtualPersistence`] -- in-memory rows for tests and embedding
//! - [`NopPersistence`] -- accepts inserts, finds nothing
//!
//! [`Persistence`] is the tagged variant selected at runtime from a
//! [`PersistenceConfig`].
//!
//! # Design Rules
//!
//! 1. The store assigns `id` on insert; callers never choose it.
//! 2. `(resource_id, created_on)` is unique; a collision is
//!    [`PersistenceError::Conflict`].
//! 3. History is ordered by `created_on` descending, ties by `id` ascending.
//! 4. `run` blocks until `stop`; `stop` waits for the runner to drain.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod nop;
pub mod persistence;
pub mod postgres;
pub mod traits;

pub use config::{DatabaseConfig, PersistenceConfig, PersistenceKind, PersistenceOption, SslMode};
pub use error::{PersistenceError, PersistenceResult};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use memory::VirtualPersistence;
pub use nop::NopPersistence;
pub use persistence::Persistence;
pub use postgres::PostgresPersistence;
pub use traits::{sort_revisions, MetadataStore, Statistics};
