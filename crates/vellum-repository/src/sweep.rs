use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vellum_persistence::{MetadataStore, PersistenceKind};
use vellum_store::{BlobStore, FileSystemKind};
use vellum_types::Address;

use crate::error::{RepositoryError, RepositoryResult};
use crate::repository::Repository;

/// Default age below which an unreferenced blob is left alone.
pub const DEFAULT_GRACE_SECS: i64 = 60 * 60;

/// Result of one sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Blobs whose path is a content address.
    pub scanned: usize,
    pub removed: usize,
    /// Blobs still referenced, or younger than the grace period.
    pub kept: usize,
    pub bytes_freed: u64,
    /// Blobs that could not be checked or removed.
    pub errors: usize,
}

/// Removes blobs no revision points at.
///
/// Content is uploaded before the revision that references it, so a blob
/// may legitimately be unreferenced for a short time. Only blobs older than
/// the grace period are candidates.
pub struct Sweeper<'a> {
    repository: &'a Repository,
    grace: Duration,
}

struct Candidate {
    address: Address,
    size: u64,
}

impl<'a> Sweeper<'a> {
    pub fn new(repository: &'a Repository) -> Self {
        Self {
            repository,
            grace: Duration::seconds(DEFAULT_GRACE_SECS),
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Walk the blob store once and delete unreferenced blobs.
    ///
    /// Cancellation stops the sweep between blobs; whatever was removed so
    /// far stays removed.
    ///
    /// Refuses with [`RepositoryError::InvalidInput`] unless the metadata
    /// store outlives the process or shares it with the blob store. A nop or
    /// fresh in-memory store references nothing, so every old blob would go.
    pub async fn run(&self, cancel: &CancellationToken) -> RepositoryResult<SweepReport> {
        self.check_backends()?;
        let cutoff = Utc::now() - self.grace;
        let mut report = SweepReport::default();
        let candidates = self.collect(cutoff, &mut report).await?;
        debug!(candidates = candidates.len(), "sweep candidates collected");

        let persistence = self.repository.persistence();
        let filesystem = self.repository.filesystem();
        for candidate in candidates {
            if cancel.is_cancelled() {
                return Err(RepositoryError::Cancelled);
            }
            match persistence.references(&candidate.address).await {
                Ok(true) => {
                    report.kept += 1;
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(address = %candidate.address.short(), error = %err, "reference check failed");
                    report.errors += 1;
                    continue;
                }
            }
            // Re-uploaded since the walk.
            match filesystem.stat(candidate.address.as_str()).await {
                Ok(info) if info.modified > cutoff => {
                    report.kept += 1;
                    continue;
                }
                Ok(_) => {}
                Err(err) if err.is_not_found() => continue,
                Err(err) => {
                    warn!(address = %candidate.address.short(), error = %err, "stat failed");
                    report.errors += 1;
                    continue;
                }
            }
            match filesystem.remove(candidate.address.as_str()).await {
                Ok(()) => {
                    report.removed += 1;
                    report.bytes_freed += candidate.size;
                    debug!(address = %candidate.address.short(), "removed orphaned content");
                }
                // Raced with another sweeper.
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    warn!(address = %candidate.address.short(), error = %err, "remove failed");
                    report.errors += 1;
                }
            }
        }

        info!(
            scanned = report.scanned,
            removed = report.removed,
            kept = report.kept,
            errors = report.errors,
            "sweep finished"
        );
        Ok(report)
    }

    fn check_backends(&self) -> RepositoryResult<()> {
        let persistence = self.repository.persistence().kind();
        let filesystem = self.repository.filesystem().kind();
        match (persistence, filesystem) {
            (PersistenceKind::Real, _) | (PersistenceKind::Virtual, FileSystemKind::Virtual) => Ok(()),
            _ => {
                warn!(%persistence, %filesystem, "sweep refused");
                Err(RepositoryError::InvalidInput(format!(
                    "cannot sweep {filesystem} content against {persistence} metadata"
                )))
            }
        }
    }

    async fn collect(
        &self,
        cutoff: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> RepositoryResult<Vec<Candidate>> {
        let mut candidates = Vec::new();
        self.repository
            .filesystem()
            .walk("", &mut |path, info| {
                let info = match info {
                    Ok(info) => info,
                    Err(err) => {
                        warn!(path, error = %err, "could not list blob");
                        report.errors += 1;
                        return Ok(());
                    }
                };
                // Anything not named by an address is not ours to delete.
                let Ok(address) = Address::parse(path) else {
                    return Ok(());
                };
                report.scanned += 1;
                if info.modified > cutoff {
                    report.kept += 1;
                } else {
                    candidates.push(Candidate {
                        address,
                        size: info.size,
                    });
                }
                Ok(())
            })
            .await
            .map_err(|e| RepositoryError::blob("walk content", e))?;
        Ok(candidates)
    }
}
