use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::path;
use crate::traits::{visit_error, BlobInfo, BlobReader, BlobStore, BlobWriter, WalkFn, DEFAULT_CONTENT_TYPE};

/// Directory under the root holding writes that have not been synced yet.
const STAGING_DIR: &str = ".staging";

/// Blob store backed by files under a root directory.
///
/// Writers stage into `<root>/.staging` and are renamed into place on sync,
/// so readers never observe a half-written blob. The host filesystem does
/// not record MIME types; every blob reads back as
/// [`DEFAULT_CONTENT_TYPE`].
#[derive(Clone, Debug)]
pub struct LocalFileSystem {
    root: PathBuf,
    counter: Arc<AtomicU64>,
}

impl LocalFileSystem {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn open_root(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(STAGING_DIR)).await?;
        debug!(root = %root.display(), "opened local blob store");
        Ok(Self {
            root,
            counter: Arc::new(AtomicU64::new(0)),
        })
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> StoreResult<PathBuf> {
        let path = path::validate(path)?;
        if path == STAGING_DIR || path.starts_with(".staging/") {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(path))
    }

    fn staging_path(&self) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(STAGING_DIR)
            .join(format!("{}-{n}", std::process::id()))
    }
}

async fn ensure_parent(path: &Path) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[async_trait]
impl BlobStore for LocalFileSystem {
    async fn create(&self, path: &str) -> StoreResult<Box<dyn BlobWriter>> {
        let target = self.resolve(path)?;
        let staging = self.staging_path();
        let file = fs::File::create(&staging).await?;
        Ok(Box::new(LocalWriter {
            key: path.to_string(),
            target,
            staging,
            file: Some(file),
            settled: false,
        }))
    }

    async fn open(&self, path: &str) -> StoreResult<BlobReader> {
        let full = self.resolve(path)?;
        let file = fs::File::open(&full)
            .await
            .map_err(|e| StoreError::from_io(path, e))?;
        let meta = file.metadata().await?;
        if !meta.is_file() {
            return Err(StoreError::NotFound(path.to_string()));
        }
        let stream = ReaderStream::new(file)
            .map(|chunk| chunk.map_err(StoreError::Io))
            .boxed();
        Ok(BlobReader::new(path, meta.len(), DEFAULT_CONTENT_TYPE, stream))
    }

    async fn rename(&self, old: &str, new: &str) -> StoreResult<()> {
        let from = self.resolve(old)?;
        let to = self.resolve(new)?;
        if !fs::try_exists(&from).await? {
            return Err(StoreError::NotFound(old.to_string()));
        }
        ensure_parent(&to).await?;
        fs::rename(&from, &to)
            .await
            .map_err(|e| StoreError::from_io(old, e))
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        let Ok(full) = self.resolve(path) else {
            return Ok(false);
        };
        match fs::metadata(&full).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, path: &str) -> StoreResult<()> {
        let full = self.resolve(path)?;
        fs::remove_file(&full)
            .await
            .map_err(|e| StoreError::from_io(path, e))
    }

    async fn walk(&self, prefix: &str, visit: &mut WalkFn<'_>) -> StoreResult<()> {
        let root = self.root.clone();
        let entries = tokio::task::spawn_blocking(move || collect_entries(&root))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;

        for entry in entries {
            match entry {
                Ok(info) if info.path.starts_with(prefix) => visit(&info.path, Ok(&info))?,
                Ok(_) => {}
                Err((path, err)) => visit_error(visit, &path, err)?,
            }
        }
        Ok(())
    }

    async fn stat(&self, path: &str) -> StoreResult<BlobInfo> {
        let full = self.resolve(path)?;
        let meta = fs::metadata(&full)
            .await
            .map_err(|e| StoreError::from_io(path, e))?;
        if !meta.is_file() {
            return Err(StoreError::NotFound(path.to_string()));
        }
        Ok(BlobInfo {
            path: path.to_string(),
            size: meta.len(),
            modified: DateTime::<Utc>::from(meta.modified()?),
        })
    }

    async fn touch(&self, path: &str) -> StoreResult<()> {
        let full = self.resolve(path)?;
        let file = fs::OpenOptions::new()
            .write(true)
            .open(&full)
            .await
            .map_err(|e| StoreError::from_io(path, e))?
            .into_std()
            .await;
        tokio::task::spawn_blocking(move || file.set_modified(SystemTime::now()))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;
        Ok(())
    }
}

type WalkEntry = Result<BlobInfo, (String, StoreError)>;

fn collect_entries(root: &Path) -> Vec<WalkEntry> {
    let staging = root.join(STAGING_DIR);
    walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| entry.path() != staging)
        .filter_map(|entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .and_then(|p| p.strip_prefix(root).ok())
                        .map(key_of)
                        .unwrap_or_default();
                    let io = err
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                    return Some(Err((path, StoreError::Io(io))));
                }
            };
            if !entry.file_type().is_file() {
                return None;
            }
            let key = entry
                .path()
                .strip_prefix(root)
                .map(key_of)
                .unwrap_or_default();
            let info = entry.metadata().map(|meta| BlobInfo {
                path: key.clone(),
                size: meta.len(),
                modified: meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now()),
            });
            Some(info.map_err(|err| {
                let io = err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("metadata unavailable"));
                (key, StoreError::Io(io))
            }))
        })
        .collect()
}

fn key_of(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

struct LocalWriter {
    key: String,
    target: PathBuf,
    staging: PathBuf,
    file: Option<fs::File>,
    /// Set once the staging file has been renamed into place or removed.
    settled: bool,
}

#[async_trait]
impl BlobWriter for LocalWriter {
    fn set_content_type(&mut self, _content_type: &str) {}

    async fn write(&mut self, buf: &[u8]) -> StoreResult<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| StoreError::NotFound(self.key.clone()))?;
        file.write_all(buf).await?;
        Ok(())
    }

    async fn sync(&mut self) -> StoreResult<()> {
        let Some(mut file) = self.file.take() else {
            return Err(StoreError::NotFound(self.key.clone()));
        };
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        ensure_parent(&self.target).await?;
        fs::rename(&self.staging, &self.target).await?;
        self.settled = true;
        debug!(path = %self.key, "synced local blob");
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> StoreResult<()> {
        drop(self.file.take());
        if !self.settled {
            self.settled = true;
            match fs::remove_file(&self.staging).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

// A writer dropped mid-write, e.g. by a cancelled request, never reaches
// `close`.
impl Drop for LocalWriter {
    fn drop(&mut self) {
        if !self.settled {
            if let Err(e) = std::fs::remove_file(&self.staging) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!(path = %self.staging.display(), error = %e, "could not remove staging file");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    async fn store() -> (tempfile::TempDir, LocalFileSystem) {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::open_root(dir.path()).await.unwrap();
        (dir, fs)
    }

    #[tokio::test]
    async fn put_then_open() {
        let (_dir, store) = store().await;
        store
            .put("abc", Bytes::from_static(b"hello"), "text/plain")
            .await
            .unwrap();
        let reader = store.open("abc").await.unwrap();
        assert_eq!(reader.size(), 5);
        assert_eq!(reader.content_type(), DEFAULT_CONTENT_TYPE);
        assert_eq!(reader.read_to_end().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn write_invisible_until_sync() {
        let (_dir, store) = store().await;
        let mut writer = store.create("abc").await.unwrap();
        writer.write(b"pending").await.unwrap();
        assert!(!store.exists("abc").await.unwrap());
        writer.sync().await.unwrap();
        writer.close().await.unwrap();
        assert!(store.exists("abc").await.unwrap());
    }

    #[tokio::test]
    async fn close_without_sync_cleans_staging() {
        let (dir, store) = store().await;
        let mut writer = store.create("abc").await.unwrap();
        writer.write(b"dropped").await.unwrap();
        writer.close().await.unwrap();
        assert!(!store.exists("abc").await.unwrap());
        let staged = std::fs::read_dir(dir.path().join(STAGING_DIR)).unwrap().count();
        assert_eq!(staged, 0);
    }

    #[tokio::test]
    async fn dropped_writer_cleans_staging() {
        let (dir, store) = store().await;
        let mut writer = store.create("abc").await.unwrap();
        writer.write(b"abandoned").await.unwrap();
        drop(writer);
        assert!(!store.exists("abc").await.unwrap());
        let staged = std::fs::read_dir(dir.path().join(STAGING_DIR)).unwrap().count();
        assert_eq!(staged, 0);
    }

    #[tokio::test]
    async fn touch_refreshes_modified() {
        let (dir, store) = store().await;
        store.put("abc", Bytes::from_static(b"hello"), "").await.unwrap();
        let old = SystemTime::now() - std::time::Duration::from_secs(7200);
        std::fs::File::options()
            .write(true)
            .open(dir.path().join("abc"))
            .unwrap()
            .set_modified(old)
            .unwrap();
        let before = store.stat("abc").await.unwrap();
        assert_eq!(before.size, 5);
        assert!(before.modified < Utc::now() - chrono::Duration::hours(1));

        store.touch("abc").await.unwrap();
        let after = store.stat("abc").await.unwrap();
        assert!(after.modified > Utc::now() - chrono::Duration::minutes(1));
        let data = store.open("abc").await.unwrap().read_to_end().await.unwrap();
        assert_eq!(data, Bytes::from_static(b"hello"));
        assert!(store.touch("missing").await.unwrap_err().is_not_found());
        assert!(store.stat("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn recreate_truncates() {
        let (_dir, store) = store().await;
        store.put("k", Bytes::from_static(b"a long payload"), "").await.unwrap();
        store.put("k", Bytes::from_static(b"tiny"), "").await.unwrap();
        let data = store.open("k").await.unwrap().read_to_end().await.unwrap();
        assert_eq!(data, Bytes::from_static(b"tiny"));
    }

    #[tokio::test]
    async fn missing_paths_are_not_found() {
        let (_dir, store) = store().await;
        assert!(store.open("nope").await.unwrap_err().is_not_found());
        assert!(store.remove("nope").await.unwrap_err().is_not_found());
        assert!(store.rename("nope", "other").await.unwrap_err().is_not_found());
        assert!(!store.exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn rename_creates_parent_directories() {
        let (_dir, store) = store().await;
        store.put("flat", Bytes::from_static(b"x"), "").await.unwrap();
        store.rename("flat", "nested/dir/key").await.unwrap();
        assert!(!store.exists("flat").await.unwrap());
        assert!(store.exists("nested/dir/key").await.unwrap());
    }

    #[tokio::test]
    async fn staging_area_is_not_addressable() {
        let (_dir, store) = store().await;
        assert!(matches!(
            store.open(".staging/0").await.unwrap_err(),
            StoreError::InvalidPath(_)
        ));
        assert!(store.resolve("../outside").is_err());
    }

    #[tokio::test]
    async fn walk_reports_files_under_prefix() {
        let (_dir, store) = store().await;
        store.put("aa/one", Bytes::from_static(b"1"), "").await.unwrap();
        store.put("aa/two", Bytes::from_static(b"22"), "").await.unwrap();
        store.put("bb", Bytes::from_static(b"333"), "").await.unwrap();
        // An unsynced writer must not show up.
        let _pending = store.create("aa/three").await.unwrap();

        let mut seen = Vec::new();
        store
            .walk("aa/", &mut |path, info| {
                seen.push((path.to_string(), info?.size));
                Ok(())
            })
            .await
            .unwrap();
        seen.sort();
        assert_eq!(
            seen,
            vec![("aa/one".to_string(), 1), ("aa/two".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn walk_propagates_visitor_error() {
        let (_dir, store) = store().await;
        store.put("a", Bytes::from_static(b"1"), "").await.unwrap();
        let err = store
            .walk("", &mut |path, _| Err(StoreError::NotFound(path.to_string())))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
