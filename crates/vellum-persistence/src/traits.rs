use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vellum_ledger::{Ledger, Query};
use vellum_types::{Address, Id};

use crate::error::PersistenceResult;

/// Counters over live revisions (those with no `deleted_on`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_revisions: u64,
    pub distinct_resources: u64,
    pub total_bytes: u64,
}

/// Durable storage of ledger revisions.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Newest revision of `resource_id` matching `query`.
    ///
    /// Fails with `NotFound` when nothing matches.
    async fn select_latest(&self, resource_id: Id, query: &Query) -> PersistenceResult<Ledger>;

    /// Store a revision, returning it with its assigned `id`.
    async fn insert(&self, ledger: Ledger) -> PersistenceResult<Ledger>;

    /// Every revision of `resource_id` matching `query`, newest first.
    async fn select_revisions(&self, resource_id: Id, query: &Query)
        -> PersistenceResult<Vec<Ledger>>;

    /// For each chain forked from `resource_id`, that chain's newest
    /// revision.
    async fn select_fork_revisions(&self, resource_id: Id) -> PersistenceResult<Vec<Ledger>>;

    async fn statistics(&self) -> PersistenceResult<Statistics>;

    /// Returns `true` if any revision points at `address`.
    async fn references(&self, address: &Address) -> PersistenceResult<bool>;

    /// Serve until [`stop`](Self::stop) is called.
    async fn run(&self) -> PersistenceResult<()>;

    /// Signal the runner and wait for it to drain. No-op unless running.
    async fn stop(&self) -> PersistenceResult<()>;

    /// Delete every row.
    async fn drop_all(&self) -> PersistenceResult<()>;
}

/// Order revisions newest first, ties broken by ascending `id`.
pub fn sort_revisions(revisions: &mut [Ledger]) {
    revisions.sort_by(|a, b| b.created_on.cmp(&a.created_on).then(a.id.cmp(&b.id)));
}
