use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, info};
use uuid::Uuid;
use vellum_ledger::{Ledger, Query, Tags};
use vellum_types::{time, Address, Id};

use crate::config::DatabaseConfig;
use crate::error::{PersistenceError, PersistenceResult};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::traits::{sort_revisions, MetadataStore, Statistics};

const COLUMNS: &str = "id, parent_id, resource_id, name, author_id, tags, resource_address, \
                       resource_size, resource_content_type, created_on, deleted_on";

const SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS ledgers (
        id UUID PRIMARY KEY,
        parent_id UUID NOT NULL,
        resource_id UUID NOT NULL,
        name TEXT NOT NULL,
        author_id TEXT NOT NULL,
        tags TEXT[] NOT NULL DEFAULT '{}',
        resource_address TEXT NOT NULL,
        resource_size BIGINT NOT NULL,
        resource_content_type TEXT NOT NULL,
        created_on TIMESTAMPTZ NOT NULL,
        deleted_on TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS ledgers_resource_id_idx ON ledgers (resource_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS ledgers_resource_created_idx \
     ON ledgers (resource_id, created_on)",
    "CREATE INDEX IF NOT EXISTS ledgers_resource_address_idx ON ledgers (resource_address)",
];

const INSERT: &str = "INSERT INTO ledgers (id, parent_id, resource_id, name, author_id, tags, \
                      resource_address, resource_size, resource_content_type, created_on, deleted_on) \
                      VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)";

const SELECT_FORKS: &str = "WITH chain AS (SELECT id FROM ledgers WHERE resource_id = $1) \
     SELECT DISTINCT ON (l.resource_id) l.id, l.parent_id, l.resource_id, l.name, l.author_id, \
     l.tags, l.resource_address, l.resource_size, l.resource_content_type, l.created_on, l.deleted_on \
     FROM ledgers l \
     WHERE l.resource_id IN ( \
         SELECT r.resource_id FROM ledgers r \
         WHERE r.parent_id IN (SELECT id FROM chain) AND r.resource_id <> $1 \
     ) \
     ORDER BY l.resource_id, l.created_on DESC, l.id ASC";

const STATISTICS: &str = "SELECT COUNT(*)::BIGINT, COUNT(DISTINCT resource_id)::BIGINT, \
                          COALESCE(SUM(resource_size), 0)::BIGINT \
                          FROM ledgers WHERE deleted_on = $1";

const REFERENCES: &str = "SELECT EXISTS (SELECT 1 FROM ledgers WHERE resource_address = $1)";

/// One row of the `ledgers` table.
#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    id: Uuid,
    parent_id: Uuid,
    resource_id: Uuid,
    name: String,
    author_id: String,
    tags: Vec<String>,
    resource_address: String,
    resource_size: i64,
    resource_content_type: String,
    created_on: DateTime<Utc>,
    deleted_on: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for Ledger {
    type Error = PersistenceError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let resource_address = Address::parse(&row.resource_address)
            .map_err(|e| PersistenceError::Row(e.to_string()))?;
        let resource_size = u64::try_from(row.resource_size).map_err(|_| {
            PersistenceError::Row(format!("negative resource_size {}", row.resource_size))
        })?;
        Ok(Ledger {
            id: Id::from_uuid(row.id),
            parent_id: Id::from_uuid(row.parent_id),
            resource_id: Id::from_uuid(row.resource_id),
            name: row.name,
            author_id: row.author_id,
            tags: Tags::from(row.tags),
            resource_address,
            resource_size,
            resource_content_type: row.resource_content_type,
            created_on: row.created_on,
            deleted_on: row.deleted_on,
        })
    }
}

/// Build the history query for one resource.
fn select_revisions_query(
    resource_id: Id,
    query: &Query,
    limit: Option<i64>,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT ");
    qb.push(COLUMNS)
        .push(" FROM ledgers WHERE resource_id = ")
        .push_bind(*resource_id.as_uuid());
    if !query.tags.is_empty() {
        qb.push(" AND tags && ").push_bind(query.tags.to_vec());
    }
    if let Some(author_id) = &query.author_id {
        qb.push(" AND author_id = ").push_bind(author_id.clone());
    }
    qb.push(" ORDER BY created_on DESC, id ASC");
    if let Some(limit) = limit {
        qb.push(" LIMIT ").push_bind(limit);
    }
    qb
}

fn map_insert_error(err: sqlx::Error, ledger: &Ledger) -> PersistenceError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => PersistenceError::Conflict(format!(
            "resource {} already has a revision at {}",
            ledger.resource_id,
            time::format_rfc3339(&ledger.created_on)
        )),
        _ => PersistenceError::Database(err),
    }
}

fn to_count(value: i64) -> PersistenceResult<u64> {
    u64::try_from(value).map_err(|_| PersistenceError::Row(format!("negative counter {value}")))
}

/// PostgreSQL-backed metadata store.
///
/// The pool connects lazily, so construction never touches the network.
/// Call [`migrate`](Self::migrate) once at startup to create the table.
pub struct PostgresPersistence {
    pool: PgPool,
    lifecycle: Lifecycle,
}

impl PostgresPersistence {
    /// Create a lazily-connecting pool.
    pub fn connect_lazy(config: &DatabaseConfig) -> Self {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_lazy_with(config.connect_options());
        debug!(host = %config.hostname, port = config.port, db = %config.name, "configured postgres pool");
        Self::with_pool(pool)
    }

    /// Wrap an existing pool.
    pub fn with_pool(pool: PgPool) -> Self {
        Self {
            pool,
            lifecycle: Lifecycle::new("postgres"),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Create the `ledgers` table and its indexes if absent.
    pub async fn migrate(&self) -> PersistenceResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("ledgers schema ready");
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for PostgresPersistence {
    async fn select_latest(&self, resource_id: Id, query: &Query) -> PersistenceResult<Ledger> {
        let row = select_revisions_query(resource_id, query, Some(1))
            .build_query_as::<LedgerRow>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(format!("resource {resource_id}")))?;
        Ledger::try_from(row)
    }

    async fn insert(&self, mut ledger: Ledger) -> PersistenceResult<Ledger> {
        let resource_size = i64::try_from(ledger.resource_size).map_err(|_| {
            PersistenceError::Row(format!("resource_size {} out of range", ledger.resource_size))
        })?;
        ledger.id = Id::new();

        // Dropping this future before commit rolls the transaction back.
        let mut tx = self.pool.begin().await?;
        sqlx::query(INSERT)
            .bind(*ledger.id.as_uuid())
            .bind(*ledger.parent_id.as_uuid())
            .bind(*ledger.resource_id.as_uuid())
            .bind(&ledger.name)
            .bind(&ledger.author_id)
            .bind(ledger.tags.to_vec())
            .bind(ledger.resource_address.as_str())
            .bind(resource_size)
            .bind(&ledger.resource_content_type)
            .bind(ledger.created_on)
            .bind(ledger.deleted_on)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_insert_error(e, &ledger))?;
        tx.commit().await?;

        debug!(id = %ledger.id, resource_id = %ledger.resource_id, "inserted revision");
        Ok(ledger)
    }

    async fn select_revisions(
        &self,
        resource_id: Id,
        query: &Query,
    ) -> PersistenceResult<Vec<Ledger>> {
        let rows = select_revisions_query(resource_id, query, None)
            .build_query_as::<LedgerRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Ledger::try_from).collect()
    }

    async fn select_fork_revisions(&self, resource_id: Id) -> PersistenceResult<Vec<Ledger>> {
        let rows = sqlx::query_as::<_, LedgerRow>(SELECT_FORKS)
            .bind(*resource_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        let mut forks = rows
            .into_iter()
            .map(Ledger::try_from)
            .collect::<PersistenceResult<Vec<_>>>()?;
        sort_revisions(&mut forks);
        Ok(forks)
    }

    async fn statistics(&self) -> PersistenceResult<Statistics> {
        let (revisions, resources, bytes) = sqlx::query_as::<_, (i64, i64, i64)>(STATISTICS)
            .bind(time::zero())
            .fetch_one(&self.pool)
            .await?;
        Ok(Statistics {
            total_revisions: to_count(revisions)?,
            distinct_resources: to_count(resources)?,
            total_bytes: to_count(bytes)?,
        })
    }

    async fn references(&self, address: &Address) -> PersistenceResult<bool> {
        let found = sqlx::query_scalar::<_, bool>(REFERENCES)
            .bind(address.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(found)
    }

    async fn run(&self) -> PersistenceResult<()> {
        let pool = self.pool.clone();
        self.lifecycle
            .run(move || async move { pool.close().await })
            .await
    }

    async fn stop(&self) -> PersistenceResult<()> {
        self.lifecycle.stop().await
    }

    async fn drop_all(&self) -> PersistenceResult<()> {
        sqlx::query("DELETE FROM ledgers").execute(&self.pool).await?;
        Ok(())
    }
}

impl std::fmt::Debug for PostgresPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresPersistence")
            .field("pool_size", &self.pool.size())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn row() -> LedgerRow {
        LedgerRow {
            id: Uuid::new_v4(),
            parent_id: Uuid::nil(),
            resource_id: Uuid::new_v4(),
            name: "doc".into(),
            author_id: "11111111-1111-4111-8111-111111111111".into(),
            tags: vec!["b".into(), "a".into()],
            resource_address: HELLO.into(),
            resource_size: 5,
            resource_content_type: "text/plain".into(),
            created_on: time::now(),
            deleted_on: time::zero(),
        }
    }

    // -----------------------------------------------------------------------
    // SQL generation
    // -----------------------------------------------------------------------

    #[test]
    fn history_query_without_filters() {
        let qb = select_revisions_query(Id::new(), &Query::new(), None);
        assert_eq!(
            qb.sql(),
            format!(
                "SELECT {COLUMNS} FROM ledgers WHERE resource_id = $1 \
                 ORDER BY created_on DESC, id ASC"
            )
        );
    }

    #[test]
    fn history_query_with_filters_and_limit() {
        let query = Query::new().with_tags(["a"]).with_author("");
        let qb = select_revisions_query(Id::new(), &query, Some(1));
        let sql = qb.sql();
        assert!(sql.contains("resource_id = $1 AND tags && $2 AND author_id = $3"));
        assert!(sql.ends_with("ORDER BY created_on DESC, id ASC LIMIT $4"));
    }

    #[test]
    fn schema_enforces_unique_instant_per_resource() {
        assert!(SCHEMA
            .iter()
            .any(|s| s.contains("UNIQUE INDEX") && s.contains("(resource_id, created_on)")));
        assert!(SCHEMA.iter().any(|s| s.contains("ON ledgers (resource_id)")));
    }

    #[test]
    fn fork_query_takes_latest_per_chain() {
        assert!(SELECT_FORKS.contains("DISTINCT ON (l.resource_id)"));
        assert!(SELECT_FORKS.contains("l.created_on DESC"));
        assert!(SELECT_FORKS.contains("r.resource_id <> $1"));
    }

    // -----------------------------------------------------------------------
    // Row conversion
    // -----------------------------------------------------------------------

    #[test]
    fn row_converts_to_ledger() {
        let row = row();
        let id = row.id;
        let ledger = Ledger::try_from(row).unwrap();
        assert_eq!(*ledger.id.as_uuid(), id);
        assert!(ledger.is_root());
        assert_eq!(ledger.tags.to_vec(), vec!["a", "b"]);
        assert_eq!(ledger.resource_address.as_str(), HELLO);
        assert_eq!(ledger.resource_size, 5);
        assert!(!ledger.is_deleted());
    }

    #[test]
    fn corrupt_rows_are_rejected() {
        let mut negative = row();
        negative.resource_size = -1;
        assert!(matches!(Ledger::try_from(negative), Err(PersistenceError::Row(_))));

        let mut bad_address = row();
        bad_address.resource_address = "nope".into();
        assert!(matches!(Ledger::try_from(bad_address), Err(PersistenceError::Row(_))));
    }

    #[test]
    fn counters_reject_negatives() {
        assert_eq!(to_count(3).unwrap(), 3);
        assert!(to_count(-1).is_err());
    }

    // -----------------------------------------------------------------------
    // Pool
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn lazy_pool_does_not_connect() {
        let store = PostgresPersistence::connect_lazy(&DatabaseConfig::default());
        assert_eq!(store.pool().size(), 0);
        assert_eq!(store.state(), LifecycleState::Idle);
    }
}
