use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;
use vellum_ledger::{Ledger, Query};
use vellum_types::{time, Address, Id};

use crate::error::{PersistenceError, PersistenceResult};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::traits::{sort_revisions, MetadataStore, Statistics};

/// In-memory metadata store.
///
/// Rows live in a `BTreeMap` keyed by revision id behind a `RwLock` held
/// for the duration of each operation. Lookups scan every row, which is
/// fine for tests and small embedded deployments.
pub struct VirtualPersistence {
    rows: RwLock<BTreeMap<Id, Ledger>>,
    lifecycle: Lifecycle,
}

impl Default for VirtualPersistence {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualPersistence {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            lifecycle: Lifecycle::new("virtual"),
        }
    }

    /// Number of stored revisions, deleted or not.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    fn revisions(&self, resource_id: Id, query: &Query) -> Vec<Ledger> {
        let rows = self.rows.read();
        let mut found: Vec<Ledger> = rows
            .values()
            .filter(|row| row.resource_id == resource_id && query.matches(row))
            .cloned()
            .collect();
        sort_revisions(&mut found);
        found
    }
}

#[async_trait]
impl MetadataStore for VirtualPersistence {
    async fn select_latest(&self, resource_id: Id, query: &Query) -> PersistenceResult<Ledger> {
        self.revisions(resource_id, query)
            .into_iter()
            .next()
            .ok_or_else(|| PersistenceError::NotFound(format!("resource {resource_id}")))
    }

    async fn insert(&self, mut ledger: Ledger) -> PersistenceResult<Ledger> {
        let mut rows = self.rows.write();
        let collides = rows.values().any(|row| {
            row.resource_id == ledger.resource_id && row.created_on == ledger.created_on
        });
        if collides {
            return Err(PersistenceError::Conflict(format!(
                "resource {} already has a revision at {}",
                ledger.resource_id,
                time::format_rfc3339(&ledger.created_on)
            )));
        }
        ledger.id = Id::new();
        rows.insert(ledger.id, ledger.clone());
        debug!(id = %ledger.id, resource_id = %ledger.resource_id, "inserted revision");
        Ok(ledger)
    }

    async fn select_revisions(
        &self,
        resource_id: Id,
        query: &Query,
    ) -> PersistenceResult<Vec<Ledger>> {
        Ok(self.revisions(resource_id, query))
    }

    async fn select_fork_revisions(&self, resource_id: Id) -> PersistenceResult<Vec<Ledger>> {
        let rows = self.rows.read();
        let chain: HashSet<Id> = rows
            .values()
            .filter(|row| row.resource_id == resource_id)
            .map(|row| row.id)
            .collect();
        let forks: HashSet<Id> = rows
            .values()
            .filter(|row| row.resource_id != resource_id && chain.contains(&row.parent_id))
            .map(|row| row.resource_id)
            .collect();

        let mut latest: Vec<Ledger> = forks
            .into_iter()
            .filter_map(|fork| {
                let mut revisions: Vec<Ledger> = rows
                    .values()
                    .filter(|row| row.resource_id == fork)
                    .cloned()
                    .collect();
                sort_revisions(&mut revisions);
                revisions.into_iter().next()
            })
            .collect();
        sort_revisions(&mut latest);
        Ok(latest)
    }

    async fn statistics(&self) -> PersistenceResult<Statistics> {
        let rows = self.rows.read();
        let live = rows.values().filter(|row| !row.is_deleted());
        let mut stats = Statistics::default();
        let mut resources = HashSet::new();
        for row in live {
            stats.total_revisions += 1;
            stats.total_bytes += row.resource_size;
            resources.insert(row.resource_id);
        }
        stats.distinct_resources = resources.len() as u64;
        Ok(stats)
    }

    async fn references(&self, address: &Address) -> PersistenceResult<bool> {
        let rows = self.rows.read();
        Ok(rows.values().any(|row| &row.resource_address == address))
    }

    async fn run(&self) -> PersistenceResult<()> {
        self.lifecycle.run(|| async {}).await
    }

    async fn stop(&self) -> PersistenceResult<()> {
        self.lifecycle.stop().await
    }

    async fn drop_all(&self) -> PersistenceResult<()> {
        self.rows.write().clear();
        Ok(())
    }
}

impl std::fmt::Debug for VirtualPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualPersistence")
            .field("rows", &self.len())
            .field("state", &self.state())
            .finish()
    }
}
