use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::path;
use crate::traits::{effective_content_type, BlobInfo, BlobReader, BlobStore, BlobWriter, WalkFn};

#[derive(Clone, Debug)]
struct MemoryBlob {
    data: Bytes,
    content_type: String,
    modified: DateTime<Utc>,
}

type BlobMap = Arc<RwLock<HashMap<String, MemoryBlob>>>;

/// In-memory, HashMap-based blob store.
///
/// Intended for tests and embedding. The map sits behind a `RwLock` that is
/// held for the duration of each operation; blob payloads are reference
/// counted so reads never copy.
#[derive(Default)]
pub struct VirtualFileSystem {
    blobs: BlobMap,
}

impl VirtualFileSystem {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs
            .read()
            .values()
            .map(|blob| blob.data.len() as u64)
            .sum()
    }

    /// Remove all blobs.
    pub fn clear(&self) {
        self.blobs.write().clear();
    }

    /// Sorted list of every stored path.
    pub fn paths(&self) -> Vec<String> {
        let map = self.blobs.read();
        let mut paths: Vec<String> = map.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Overwrite the modification time of a blob. Test hook for age-based
    /// sweeps.
    pub fn set_modified(&self, path: &str, modified: DateTime<Utc>) -> StoreResult<()> {
        let mut map = self.blobs.write();
        let blob = map
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        blob.modified = modified;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for VirtualFileSystem {
    async fn create(&self, path: &str) -> StoreResult<Box<dyn BlobWriter>> {
        let path = path::validate(path)?;
        // Truncate on create so a concurrent open never sees stale bytes.
        self.blobs.write().remove(path);
        Ok(Box::new(VirtualWriter {
            blobs: Arc::clone(&self.blobs),
            path: path.to_string(),
            buf: BytesMut::new(),
            content_type: None,
        }))
    }

    async fn open(&self, path: &str) -> StoreResult<BlobReader> {
        let path = path::validate(path)?;
        let map = self.blobs.read();
        let blob = map
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        Ok(BlobReader::from_bytes(
            path,
            blob.data.clone(),
            blob.content_type.clone(),
        ))
    }

    async fn rename(&self, old: &str, new: &str) -> StoreResult<()> {
        let old = path::validate(old)?;
        let new = path::validate(new)?;
        let mut map = self.blobs.write();
        let blob = map
            .remove(old)
            .ok_or_else(|| StoreError::NotFound(old.to_string()))?;
        map.insert(new.to_string(), blob);
        Ok(())
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        let Ok(path) = path::validate(path) else {
            return Ok(false);
        };
        Ok(self.blobs.read().contains_key(path))
    }

    async fn remove(&self, path: &str) -> StoreResult<()> {
        let path = path::validate(path)?;
        let mut map = self.blobs.write();
        map.remove(path)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn walk(&self, prefix: &str, visit: &mut WalkFn<'_>) -> StoreResult<()> {
        let map = self.blobs.read();
        for (path, blob) in map.iter().filter(|(path, _)| path.starts_with(prefix)) {
            let info = BlobInfo {
                path: path.clone(),
                size: blob.data.len() as u64,
                modified: blob.modified,
            };
            visit(path, Ok(&info))?;
        }
        Ok(())
    }

    async fn stat(&self, path: &str) -> StoreResult<BlobInfo> {
        let path = path::validate(path)?;
        let map = self.blobs.read();
        let blob = map
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        Ok(BlobInfo {
            path: path.to_string(),
            size: blob.data.len() as u64,
            modified: blob.modified,
        })
    }

    async fn touch(&self, path: &str) -> StoreResult<()> {
        let path = path::validate(path)?;
        self.set_modified(path, Utc::now())
    }
}

impl std::fmt::Debug for VirtualFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualFileSystem")
            .field("blob_count", &self.len())
            .finish()
    }
}

struct VirtualWriter {
    blobs: BlobMap,
    path: String,
    buf: BytesMut,
    content_type: Option<String>,
}

#[async_trait]
impl BlobWriter for VirtualWriter {
    fn set_content_type(&mut self, content_type: &str) {
        self.content_type = Some(content_type.to_string());
    }

    async fn write(&mut self, buf: &[u8]) -> StoreResult<()> {
        self.buf.extend_from_slice(buf);
        Ok(())
    }

    async fn sync(&mut self) -> StoreResult<()> {
        let blob = MemoryBlob {
            data: Bytes::copy_from_slice(&self.buf),
            content_type: effective_content_type(self.content_type.as_deref()),
            modified: Utc::now(),
        };
        self.blobs
            .write()
            .insert(self.path.clone(), blob);
        Ok(())
    }

    async fn close(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
