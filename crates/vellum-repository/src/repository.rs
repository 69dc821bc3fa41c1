use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::{StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vellum_ledger::{Content, Ledger, Query};
use vellum_persistence::{MetadataStore, Persistence, Statistics};
use vellum_store::{BlobStore, FileSystem};
use vellum_types::{time, Id};

use crate::error::{RepositoryError, RepositoryResult};

/// Behaviour switches for a [`Repository`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RepositoryOptions {
    /// Refuse revisions whose content address is absent from the blob
    /// store. Turn off only when every writer is trusted to upload first.
    pub verify_references: bool,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            verify_references: true,
        }
    }
}

/// Race `fut` against the token. Cancellation wins ties.
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = RepositoryResult<T>>,
) -> RepositoryResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RepositoryError::Cancelled),
        result = fut => result,
    }
}

/// Creation time for a revision that must sort after `after`.
fn stamp_after(after: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = time::now();
    match after {
        Some(previous) if previous >= now => previous + Duration::microseconds(1),
        _ => now,
    }
}

/// Carry the parent's content pointer into a metadata-only revision.
fn inherit_content(ledger: &mut Ledger, parent: &Ledger) {
    if !ledger.has_content() {
        ledger.resource_address = parent.resource_address.clone();
        ledger.resource_size = parent.resource_size;
        ledger.resource_content_type = parent.resource_content_type.clone();
    }
}

/// Revision history over a metadata store and a blob store.
///
/// Stateless beyond its two store handles; clone-free sharing is via `Arc`.
pub struct Repository {
    filesystem: Arc<FileSystem>,
    persistence: Arc<Persistence>,
    options: RepositoryOptions,
}

impl Repository {
    pub fn new(filesystem: Arc<FileSystem>, persistence: Arc<Persistence>) -> Self {
        Self {
            filesystem,
            persistence,
            options: RepositoryOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RepositoryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> RepositoryOptions {
        self.options
    }

    pub fn filesystem(&self) -> &Arc<FileSystem> {
        &self.filesystem
    }

    pub fn persistence(&self) -> &Arc<Persistence> {
        &self.persistence
    }

    // -----------------------------------------------------------------------
    // Revisions
    // -----------------------------------------------------------------------

    /// Latest revision of `resource_id` matching `query`.
    pub async fn select_ledger(
        &self,
        cancel: &CancellationToken,
        resource_id: Id,
        query: &Query,
    ) -> RepositoryResult<Ledger> {
        query.validate()?;
        cancellable(cancel, self.latest(resource_id, query)).await
    }

    /// Every revision of `resource_id` matching `query`, newest first.
    pub async fn select_ledgers(
        &self,
        cancel: &CancellationToken,
        resource_id: Id,
        query: &Query,
    ) -> RepositoryResult<Vec<Ledger>> {
        query.validate()?;
        cancellable(cancel, self.revisions(resource_id, query)).await
    }

    /// Latest revision of every chain forked from `resource_id`.
    pub async fn select_fork_ledgers(
        &self,
        cancel: &CancellationToken,
        resource_id: Id,
    ) -> RepositoryResult<Vec<Ledger>> {
        cancellable(cancel, async {
            self.persistence
                .select_fork_revisions(resource_id)
                .await
                .map_err(|e| RepositoryError::metadata("select fork revisions", e))
        })
        .await
    }

    /// Store a new revision as given.
    ///
    /// `created_on` is stamped with the current time when unset.
    pub async fn insert_ledger(
        &self,
        cancel: &CancellationToken,
        ledger: Ledger,
    ) -> RepositoryResult<Ledger> {
        cancellable(cancel, self.insert(ledger, self.options.verify_references)).await
    }

    /// Add a revision to the chain of `resource_id`.
    ///
    /// Fails with `NotFound` if the chain has no revisions. A revision
    /// without content keeps pointing at its parent's content.
    pub async fn append_ledger(
        &self,
        cancel: &CancellationToken,
        resource_id: Id,
        mut ledger: Ledger,
    ) -> RepositoryResult<Ledger> {
        cancellable(cancel, async {
            let parent = self.latest(resource_id, &Query::new()).await?;
            ledger.resource_id = resource_id;
            ledger.parent_id = parent.id;
            ledger.created_on = stamp_after(Some(parent.created_on));
            inherit_content(&mut ledger, &parent);
            self.insert(ledger, self.options.verify_references).await
        })
        .await
    }

    /// Start a new chain whose first revision descends from the latest
    /// revision of `resource_id`.
    pub async fn fork_ledger(
        &self,
        cancel: &CancellationToken,
        resource_id: Id,
        mut ledger: Ledger,
    ) -> RepositoryResult<Ledger> {
        cancellable(cancel, async {
            let parent = self.latest(resource_id, &Query::new()).await?;
            ledger.resource_id = Id::new();
            ledger.parent_id = parent.id;
            ledger.created_on = stamp_after(Some(parent.created_on));
            inherit_content(&mut ledger, &parent);
            let forked = self.insert(ledger, self.options.verify_references).await?;
            info!(from = %resource_id, to = %forked.resource_id, "forked resource");
            Ok(forked)
        })
        .await
    }

    /// Logically delete `resource_id` by appending a tombstone revision.
    ///
    /// Deleting an already-deleted resource returns the existing tombstone.
    pub async fn delete_ledger(
        &self,
        cancel: &CancellationToken,
        resource_id: Id,
    ) -> RepositoryResult<Ledger> {
        cancellable(cancel, async {
            let latest = self.latest(resource_id, &Query::new()).await?;
            if latest.is_deleted() {
                return Ok(latest);
            }
            let mut tombstone = latest.clone();
            tombstone.parent_id = latest.id;
            tombstone.created_on = stamp_after(Some(latest.created_on));
            tombstone.deleted_on = tombstone.created_on;
            let tombstone = self.insert(tombstone, false).await?;
            info!(resource_id = %resource_id, "deleted resource");
            Ok(tombstone)
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Content
    // -----------------------------------------------------------------------

    /// Content of the latest revision of `resource_id` matching `query`.
    ///
    /// A revision whose blob is missing reads as `NotFound`.
    pub async fn select_content(
        &self,
        cancel: &CancellationToken,
        resource_id: Id,
        query: &Query,
    ) -> RepositoryResult<Content> {
        query.validate()?;
        cancellable(cancel, async {
            let ledger = self.latest(resource_id, query).await?;
            self.open_content(&ledger).await
        })
        .await
    }

    /// Content of every revision of `resource_id` matching `query`.
    ///
    /// Revisions whose blob is missing are left out.
    pub async fn select_contents(
        &self,
        cancel: &CancellationToken,
        resource_id: Id,
        query: &Query,
    ) -> RepositoryResult<Vec<Content>> {
        query.validate()?;
        cancellable(cancel, async {
            let ledgers = self.revisions(resource_id, query).await?;
            let mut contents = Vec::with_capacity(ledgers.len());
            for ledger in &ledgers {
                match self.open_content(ledger).await {
                    Ok(content) => contents.push(content),
                    Err(err) if err.is_not_found() => {
                        if ledger.has_content() && !ledger.is_deleted() {
                            warn!(
                                id = %ledger.id,
                                address = %ledger.resource_address,
                                "revision points at missing content"
                            );
                        }
                    }
                    Err(err) => return Err(err),
                }
            }
            Ok(contents)
        })
        .await
    }

    /// Write a payload to the blob store under its address.
    ///
    /// Fails with `AddressMismatch` if `content` carries an address that
    /// disagrees with its bytes. Blobs are immutable, so an address that is
    /// already stored is not written again; it is touched instead, which
    /// restarts the [`Sweeper`](crate::Sweeper) grace period for it.
    pub async fn put_content(
        &self,
        cancel: &CancellationToken,
        content: Content,
    ) -> RepositoryResult<Content> {
        cancellable(cancel, async {
            let (content, data) = content.verified().await?;
            let path = content.address().as_str();
            let present = match self.filesystem.touch(path).await {
                Ok(()) => true,
                Err(err) if err.is_not_found() => false,
                Err(err) => return Err(RepositoryError::blob("refresh content", err)),
            };
            if present {
                debug!(address = %content.address().short(), "content already stored");
            } else {
                self.filesystem
                    .put(path, data, content.content_type())
                    .await
                    .map_err(|e| RepositoryError::blob("write content", e))?;
                debug!(address = %content.address().short(), size = content.size(), "stored content");
            }
            Ok(content)
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    pub async fn statistics(&self, cancel: &CancellationToken) -> RepositoryResult<Statistics> {
        cancellable(cancel, async {
            self.persistence
                .statistics()
                .await
                .map_err(|e| RepositoryError::metadata("statistics", e))
        })
        .await
    }

    /// Run the metadata store until [`close`](Self::close).
    pub async fn run(&self) -> RepositoryResult<()> {
        self.persistence
            .run()
            .await
            .map_err(|e| RepositoryError::metadata("run", e))
    }

    /// Stop the metadata store and wait for it to drain.
    pub async fn close(&self) -> RepositoryResult<()> {
        self.persistence
            .stop()
            .await
            .map_err(|e| RepositoryError::metadata("stop", e))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn latest(&self, resource_id: Id, query: &Query) -> RepositoryResult<Ledger> {
        self.persistence
            .select_latest(resource_id, query)
            .await
            .map_err(|e| RepositoryError::metadata("select latest", e))
    }

    async fn revisions(&self, resource_id: Id, query: &Query) -> RepositoryResult<Vec<Ledger>> {
        self.persistence
            .select_revisions(resource_id, query)
            .await
            .map_err(|e| RepositoryError::metadata("select revisions", e))
    }

    async fn insert(&self, mut ledger: Ledger, verify: bool) -> RepositoryResult<Ledger> {
        ledger.validate()?;
        if verify && ledger.has_content() {
            let present = self
                .filesystem
                .exists(ledger.resource_address.as_str())
                .await
                .map_err(|e| RepositoryError::blob("check reference", e))?;
            if !present {
                return Err(RepositoryError::DanglingReference(ledger.resource_address));
            }
        }
        if time::is_zero(&ledger.created_on) {
            ledger.created_on = time::now();
        }
        let stored = self
            .persistence
            .insert(ledger)
            .await
            .map_err(|e| RepositoryError::metadata("insert", e))?;
        debug!(id = %stored.id, resource_id = %stored.resource_id, "stored revision");
        Ok(stored)
    }

    async fn open_content(&self, ledger: &Ledger) -> RepositoryResult<Content> {
        if ledger.is_deleted() {
            return Err(RepositoryError::NotFound(format!(
                "resource {} is deleted",
                ledger.resource_id
            )));
        }
        if !ledger.has_content() {
            return Err(RepositoryError::NotFound(format!(
                "revision {} has no content",
                ledger.id
            )));
        }
        let reader = self
            .filesystem
            .open(ledger.resource_address.as_str())
            .await
            .map_err(|e| RepositoryError::blob("open content", e))?;
        let (size, stored_type, stream) = reader.into_parts();
        let content_type = if ledger.resource_content_type.is_empty() {
            stored_type
        } else {
            ledger.resource_content_type.clone()
        };
        let stream = stream.map_err(std::io::Error::other).boxed();
        let content = Content::from_reader(stream, size, content_type)?
            .with_address(ledger.resource_address.clone());
        Ok(content)
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("filesystem", &self.filesystem.kind())
            .field("persistence", &self.persistence.kind())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use proptest::prelude::*;
    use vellum_ledger::{LedgerBuilder, Tags};
    use vellum_persistence::{LifecycleState, VirtualPersistence};
    use vellum_store::VirtualFileSystem;
    use vellum_types::Address;

    const HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
    const AUTHOR: &str = "11111111-1111-4111-8111-111111111111";

    fn repo() -> Repository {
        Repository::new(
            Arc::new(FileSystem::from(VirtualFileSystem::new())),
            Arc::new(Persistence::from(VirtualPersistence::new())),
        )
    }

    fn draft(name: &str, tags: &[&str]) -> LedgerBuilder {
        Ledger::builder()
            .resource_id(Id::new())
            .name(name)
            .author_id(AUTHOR)
            .tags(tags.iter().copied())
    }

    /// Upload `body` and create a revision pointing at it.
    async fn create(repo: &Repository, name: &str, tags: &[&str], body: &'static str) -> Ledger {
        let cancel = CancellationToken::new();
        let content = repo
            .put_content(&cancel, Content::from_bytes(body, "text/plain").unwrap())
            .await
            .unwrap();
        let ledger = draft(name, tags)
            .resource(content.address().clone(), content.size(), "text/plain")
            .build()
            .unwrap();
        repo.insert_ledger(&cancel, ledger).await.unwrap()
    }

    async fn append(
        repo: &Repository,
        resource_id: Id,
        name: &str,
        tags: &[&str],
        body: &'static str,
    ) -> RepositoryResult<Ledger> {
        let cancel = CancellationToken::new();
        let content = repo
            .put_content(&cancel, Content::from_bytes(body, "text/plain").unwrap())
            .await?;
        let ledger = draft(name, tags)
            .resource(content.address().clone(), content.size(), "text/plain")
            .build()
            .unwrap();
        repo.append_ledger(&cancel, resource_id, ledger).await
    }

    // -----------------------------------------------------------------------
    // Content
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn put_content_round_trips() {
        let repo = repo();
        let cancel = CancellationToken::new();
        let stored = repo
            .put_content(&cancel, Content::from_bytes("hello", "text/plain").unwrap())
            .await
            .unwrap();
        assert_eq!(stored.address().as_str(), HELLO);
        assert_eq!(stored.size(), 5);

        let reader = repo.filesystem().open(HELLO).await.unwrap();
        assert_eq!(reader.read_to_end().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn put_content_rejects_wrong_address() {
        let repo = repo();
        let cancel = CancellationToken::new();
        let wrong = Address::parse(&"a".repeat(64)).unwrap();
        let content = Content::from_bytes("hello", "text/plain")
            .unwrap()
            .with_address(wrong);
        let err = repo.put_content(&cancel, content).await.unwrap_err();
        assert!(matches!(err, RepositoryError::AddressMismatch { .. }));
        assert!(!repo.filesystem().exists(HELLO).await.unwrap());
    }

    #[tokio::test]
    async fn put_content_is_idempotent() {
        let repo = repo();
        let cancel = CancellationToken::new();
        for _ in 0..2 {
            repo.put_content(&cancel, Content::from_bytes("hello", "text/plain").unwrap())
                .await
                .unwrap();
        }
        let fs = repo.filesystem().as_virtual().unwrap();
        assert_eq!(fs.len(), 1);
    }

    #[tokio::test]
    async fn select_content_reads_latest() {
        let repo = repo();
        let cancel = CancellationToken::new();
        let first = create(&repo, "doc-1", &["a"], "hello").await;
        append(&repo, first.resource_id, "doc-2", &["b"], "world").await.unwrap();

        let mut latest = repo
            .select_content(&cancel, first.resource_id, &Query::new())
            .await
            .unwrap();
        assert_eq!(latest.bytes().await.unwrap(), Bytes::from_static(b"world"));

        let mut tagged = repo
            .select_content(&cancel, first.resource_id, &Query::new().with_tags(["a"]))
            .await
            .unwrap();
        assert_eq!(tagged.content_type(), "text/plain");
        assert_eq!(tagged.bytes().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn missing_blob_reads_as_not_found() {
        let repo = repo();
        let cancel = CancellationToken::new();
        let first = create(&repo, "doc-1", &[], "hello").await;
        let second = append(&repo, first.resource_id, "doc-2", &[], "world")
            .await
            .unwrap();
        repo.filesystem()
            .remove(second.resource_address.as_str())
            .await
            .unwrap();

        let err = repo
            .select_content(&cancel, first.resource_id, &Query::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        // The plural form drops the dangling revision instead.
        let mut contents = repo
            .select_contents(&cancel, first.resource_id, &Query::new())
            .await
            .unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].bytes().await.unwrap(), Bytes::from_static(b"hello"));
    }

    // -----------------------------------------------------------------------
    // Insert
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn insert_stamps_and_assigns() {
        let repo = repo();
        let ledger = create(&repo, "doc-1", &["a", "b"], "hello").await;
        assert!(!ledger.id.is_zero());
        assert!(ledger.is_root());
        assert!(!time::is_zero(&ledger.created_on));
        assert_eq!(ledger.resource_address.as_str(), HELLO);
    }

    #[tokio::test]
    async fn insert_rejects_dangling_reference() {
        let strict = repo();
        let cancel = CancellationToken::new();
        let ledger = draft("doc", &[])
            .resource(Address::parse(HELLO).unwrap(), 5, "text/plain")
            .build()
            .unwrap();
        let err = strict.insert_ledger(&cancel, ledger.clone()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::DanglingReference(_)));
        assert_eq!(err.kind(), crate::error::ErrorKind::DanglingReference);

        let trusting = repo().with_options(RepositoryOptions {
            verify_references: false,
        });
        assert!(trusting.insert_ledger(&cancel, ledger).await.is_ok());
    }

    #[tokio::test]
    async fn insert_validates() {
        let repo = repo();
        let cancel = CancellationToken::new();
        let mut ledger = draft("doc", &[]).build().unwrap();
        ledger.author_id.clear();
        let err = repo.insert_ledger(&cancel, ledger).await.unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn duplicate_instant_conflicts() {
        let repo = repo();
        let cancel = CancellationToken::new();
        let created_on = time::now();
        let ledger = draft("doc", &[]).created_on(created_on).build().unwrap();
        repo.insert_ledger(&cancel, ledger.clone()).await.unwrap();
        let err = repo.insert_ledger(&cancel, ledger).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    // -----------------------------------------------------------------------
    // Append / history
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn append_links_and_orders_history() {
        let repo = repo();
        let cancel = CancellationToken::new();
        let first = create(&repo, "doc-1", &["a", "b"], "hello").await;
        let second = append(&repo, first.resource_id, "doc-2", &["b", "c"], "world")
            .await
            .unwrap();
        assert_eq!(second.parent_id, first.id);
        assert_eq!(second.resource_id, first.resource_id);
        assert!(second.created_on > first.created_on);

        let history = repo
            .select_ledgers(&cancel, first.resource_id, &Query::new())
            .await
            .unwrap();
        let names: Vec<&str> = history.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["doc-2", "doc-1"]);
    }

    #[tokio::test]
    async fn append_to_unknown_resource_is_not_found() {
        let repo = repo();
        let err = append(&repo, Id::new(), "doc", &[], "x").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn append_without_content_keeps_parent_content() {
        let repo = repo();
        let cancel = CancellationToken::new();
        let first = create(&repo, "doc-1", &[], "hello").await;
        let renamed = draft("renamed", &[]).build().unwrap();
        let second = repo
            .append_ledger(&cancel, first.resource_id, renamed)
            .await
            .unwrap();
        assert_eq!(second.resource_address, first.resource_address);
        assert_eq!(second.resource_size, 5);
    }

    #[tokio::test]
    async fn rapid_appends_stay_strictly_ordered() {
        let repo = repo();
        let cancel = CancellationToken::new();
        let first = create(&repo, "doc-0", &[], "hello").await;
        for i in 1..20 {
            let ledger = draft(&format!("doc-{i}"), &[]).build().unwrap();
            repo.append_ledger(&cancel, first.resource_id, ledger)
                .await
                .unwrap();
        }
        let history = repo
            .select_ledgers(&cancel, first.resource_id, &Query::new())
            .await
            .unwrap();
        assert_eq!(history.len(), 20);
        assert_eq!(history[0].name, "doc-19");
        assert!(history.windows(2).all(|w| w[0].created_on > w[1].created_on));
    }

    #[tokio::test]
    async fn tag_filter_selects_matching_revisions() {
        let repo = repo();
        let cancel = CancellationToken::new();
        let first = create(&repo, "doc-1", &["a", "b"], "hello").await;
        append(&repo, first.resource_id, "doc-2", &["b", "c"], "world")
            .await
            .unwrap();

        let only_c = repo
            .select_ledgers(&cancel, first.resource_id, &Query::new().with_tags(["c"]))
            .await
            .unwrap();
        assert_eq!(only_c.len(), 1);
        assert_eq!(only_c[0].name, "doc-2");

        let a_or_c = repo
            .select_ledgers(&cancel, first.resource_id, &Query::new().with_tags(["a", "c"]))
            .await
            .unwrap();
        assert_eq!(a_or_c.len(), 2);
    }

    #[tokio::test]
    async fn bad_query_is_rejected() {
        let repo = repo();
        let cancel = CancellationToken::new();
        let err = repo
            .select_ledger(&cancel, Id::new(), &Query::new().with_tags([""]))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::BadQuery(_)));
    }

    // -----------------------------------------------------------------------
    // Fork
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn fork_starts_new_chain_from_latest() {
        let repo = repo();
        let cancel = CancellationToken::new();
        let first = create(&repo, "doc-1", &[], "hello").await;
        let second = append(&repo, first.resource_id, "doc-2", &[], "world")
            .await
            .unwrap();

        let forked = repo
            .fork_ledger(&cancel, first.resource_id, draft("copy", &[]).build().unwrap())
            .await
            .unwrap();
        assert_ne!(forked.resource_id, first.resource_id);
        assert_eq!(forked.parent_id, second.id);
        assert_eq!(forked.resource_address, second.resource_address);

        let chain = repo
            .select_ledgers(&cancel, forked.resource_id, &Query::new())
            .await
            .unwrap();
        assert_eq!(chain.len(), 1);

        let forks = repo
            .select_fork_ledgers(&cancel, first.resource_id)
            .await
            .unwrap();
        assert_eq!(forks.len(), 1);
        assert_eq!(forks[0].id, forked.id);
    }

    #[tokio::test]
    async fn fork_of_unknown_resource_is_not_found() {
        let repo = repo();
        let cancel = CancellationToken::new();
        let err = repo
            .fork_ledger(&cancel, Id::new(), draft("copy", &[]).build().unwrap())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    // -----------------------------------------------------------------------
    // Delete / statistics / cancellation
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn delete_appends_tombstone() {
        let repo = repo();
        let cancel = CancellationToken::new();
        let first = create(&repo, "doc-1", &[], "hello").await;
        let tombstone = repo.delete_ledger(&cancel, first.resource_id).await.unwrap();
        assert!(tombstone.is_deleted());
        assert_eq!(tombstone.parent_id, first.id);

        let again = repo.delete_ledger(&cancel, first.resource_id).await.unwrap();
        assert_eq!(again.id, tombstone.id);

        let err = repo
            .select_content(&cancel, first.resource_id, &Query::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let stats = repo.statistics(&cancel).await.unwrap();
        assert_eq!(stats.total_revisions, 1);
        assert_eq!(stats.total_bytes, 5);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let repo = repo();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = repo
            .put_content(&cancel, Content::from_bytes("hello", "text/plain").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Cancelled));
        assert!(!repo.filesystem().exists(HELLO).await.unwrap());

        let err = repo
            .select_ledgers(&cancel, Id::new(), &Query::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn close_waits_for_run() {
        let repo = Arc::new(repo());
        let runner = {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move { repo.run().await })
        };
        let running = || match repo.persistence().as_ref() {
            Persistence::Virtual(store) => store.state() == LifecycleState::Running,
            _ => false,
        };
        while !running() {
            tokio::task::yield_now().await;
        }
        repo.close().await.unwrap();
        runner.await.unwrap().unwrap();
        assert!(repo.run().await.is_err());
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn tag_filter_law(
            stored in proptest::collection::btree_set("[a-d]", 0..4),
            wanted in proptest::collection::btree_set("[a-d]", 0..4),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let repo = repo();
                let cancel = CancellationToken::new();
                let ledger = draft("doc", &[])
                    .tags(stored.iter().cloned())
                    .build()
                    .unwrap();
                let ledger = repo.insert_ledger(&cancel, ledger).await.unwrap();
                let found = repo
                    .select_ledgers(
                        &cancel,
                        ledger.resource_id,
                        &Query::new().with_tags(wanted.iter().cloned()),
                    )
                    .await
                    .unwrap();
                let stored_tags: Tags = stored.iter().cloned().collect();
                let wanted_tags: Tags = wanted.iter().cloned().collect();
                let expected = wanted_tags.is_empty() || stored_tags.intersects(&wanted_tags);
                assert_eq!(found.len() == 1, expected);
            });
        }

        #[test]
        fn put_content_then_open_returns_bytes(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async {
                let repo = repo();
                let cancel = CancellationToken::new();
                let content = Content::from_bytes(data.clone(), "application/octet-stream").unwrap();
                let stored = repo.put_content(&cancel, content).await.unwrap();
                assert_eq!(stored.address(), &vellum_crypto::address(&data));
                let reader = repo.filesystem().open(stored.address().as_str()).await.unwrap();
                assert_eq!(reader.read_to_end().await.unwrap().as_ref(), data.as_slice());
            });
        }
    }
}
