use async_trait::async_trait;
use vellum_ledger::{Ledger, Query};
use vellum_types::{Address, Id};

use crate::error::{PersistenceError, PersistenceResult};
use crate::lifecycle::Lifecycle;
use crate::traits::{MetadataStore, Statistics};

/// Metadata store that accepts inserts and remembers nothing.
///
/// Inserts succeed and return the revision with a fresh `id`; every lookup
/// comes back empty (`select_latest` reports `NotFound`).
pub struct NopPersistence {
    lifecycle: Lifecycle,
}

impl Default for NopPersistence {
    fn default() -> Self {
        Self::new()
    }
}

impl NopPersistence {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new("nop"),
        }
    }
}

#[async_trait]
impl MetadataStore for NopPersistence {
    async fn select_latest(&self, resource_id: Id, _query: &Query) -> PersistenceResult<Ledger> {
        Err(PersistenceError::NotFound(format!("resource {resource_id}")))
    }

    async fn insert(&self, mut ledger: Ledger) -> PersistenceResult<Ledger> {
        ledger.id = Id::new();
        Ok(ledger)
    }

    async fn select_revisions(
        &self,
        _resource_id: Id,
        _query: &Query,
    ) -> PersistenceResult<Vec<Ledger>> {
        Ok(Vec::new())
    }

    async fn select_fork_revisions(&self, _resource_id: Id) -> PersistenceResult<Vec<Ledger>> {
        Ok(Vec::new())
    }

    async fn statistics(&self) -> PersistenceResult<Statistics> {
        Ok(Statistics::default())
    }

    async fn references(&self, _address: &Address) -> PersistenceResult<bool> {
        Ok(false)
    }

    async fn run(&self) -> PersistenceResult<()> {
        self.lifecycle.run(|| async {}).await
    }

    async fn stop(&self) -> PersistenceResult<()> {
        self.lifecycle.stop().await
    }

    async fn drop_all(&self) -> PersistenceResult<()> {
        Ok(())
    }
}

impl std::fmt::Debug for NopPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NopPersistence").finish()
    }
}
