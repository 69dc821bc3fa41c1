//! The vellum repository.
//!
//! Coordinates a metadata store of ledger revisions with a content-addressed
//! blob store. This is the entry point for applications embedding vellum;
//! the HTTP server is a thin layer over [`Repository`].
//!
//! # Write Order
//!
//! Content is written to the blob store before any revision that points at
//! it. A failure between the two leaves an unreferenced blob behind, which
//! [`Sweeper`] removes once it is older than a grace period.
//!
//! # Cancellation
//!
//! Every operation takes a [`CancellationToken`]. Cancelling it makes the
//! operation return [`RepositoryError::Cancelled`] promptly; the in-flight
//! store call is dropped, which rolls back any open transaction.

pub mod error;
pub mod repository;
pub mod sweep;

pub use error::{ErrorKind, RepositoryError, RepositoryResult};
pub use repository::{Repository, RepositoryOptions};
pub use sweep::{SweepReport, Sweeper};

pub use tokio_util::sync::CancellationToken;
pub use vellum_ledger::{Content, ContentInfo, Ledger, Query, Tags};
pub use vellum_persistence::Statistics;
pub use vellum_types::{Address, Id};
