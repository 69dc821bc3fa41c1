use async_trait::async_trait;
use tracing::info;
use vellum_ledger::{Ledger, Query};
use vellum_types::{Address, Id};

use crate::config::{PersistenceConfig, PersistenceKind};
use crate::error::PersistenceResult;
use crate::memory::VirtualPersistence;
use crate::nop::NopPersistence;
use crate::postgres::PostgresPersistence;
use crate::traits::{MetadataStore, Statistics};

/// The metadata store selected at runtime.
#[derive(Debug)]
pub enum Persistence {
    Real(PostgresPersistence),
    Virtual(VirtualPersistence),
    Nop(NopPersistence),
}

impl Persistence {
    /// Construct the backend named by `config.kind`. The PostgreSQL pool
    /// connects lazily; call [`prepare`](Self::prepare) before serving.
    pub fn from_config(config: &PersistenceConfig) -> Self {
        let persistence = match config.kind {
            PersistenceKind::Real => Self::Real(PostgresPersistence::connect_lazy(&config.database)),
            PersistenceKind::Virtual => Self::Virtual(VirtualPersistence::new()),
            PersistenceKind::Nop => Self::Nop(NopPersistence::new()),
        };
        info!(kind = %persistence.kind(), "metadata store ready");
        persistence
    }

    pub fn kind(&self) -> PersistenceKind {
        match self {
            Self::Real(_) => PersistenceKind::Real,
            Self::Virtual(_) => PersistenceKind::Virtual,
            Self::Nop(_) => PersistenceKind::Nop,
        }
    }

    /// Create the schema where the backend has one.
    pub async fn prepare(&self) -> PersistenceResult<()> {
        match self {
            Self::Real(store) => store.migrate().await,
            Self::Virtual(_) | Self::Nop(_) => Ok(()),
        }
    }

    fn backend(&self) -> &dyn MetadataStore {
        match self {
            Self::Real(store) => store,
            Self::Virtual(store) => store,
            Self::Nop(store) => store,
        }
    }
}

impl From<VirtualPersistence> for Persistence {
    fn from(store: VirtualPersistence) -> Self {
        Self::Virtual(store)
    }
}

#[async_trait]
impl MetadataStore for Persistence {
    async fn select_latest(&self, resource_id: Id, query: &Query) -> PersistenceResult<Ledger> {
        self.backend().select_latest(resource_id, query).await
    }

    async fn insert(&self, ledger: Ledger) -> PersistenceResult<Ledger> {
        self.backend().insert(ledger).await
    }

    async fn select_revisions(
        &self,
        resource_id: Id,
        query: &Query,
    ) -> PersistenceResult<Vec<Ledger>> {
        self.backend().select_revisions(resource_id, query).await
    }

    async fn select_fork_revisions(&self, resource_id: Id) -> PersistenceResult<Vec<Ledger>> {
        self.backend().select_fork_revisions(resource_id).await
    }

    async fn statistics(&self) -> PersistenceResult<Statistics> {
        self.backend().statistics().await
    }

    async fn references(&self, address: &Address) -> PersistenceResult<bool> {
        self.backend().references(address).await
    }

    async fn run(&self) -> PersistenceResult<()> {
        self.backend().run().await
    }

    async fn stop(&self) -> PersistenceResult<()> {
        self.backend().stop().await
    }

    async fn drop_all(&self) -> PersistenceResult<()> {
        self.backend().drop_all().await
    }
}
