use std::fmt;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::error::{StoreError, StoreResult};

/// MIME type recorded for blobs written without an explicit content type.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Visitor passed to [`BlobStore::walk`].
///
/// Receives each path together with its metadata, or the error hit while
/// listing that entry. Returning `Err` stops the walk and the error is handed
/// back to the caller of `walk`.
pub type WalkFn<'a> = dyn FnMut(&str, StoreResult<&BlobInfo>) -> StoreResult<()> + Send + 'a;

/// Metadata about a stored blob, as reported by [`BlobStore::walk`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobInfo {
    pub path: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Blob storage backend.
///
/// All implementations must satisfy these invariants:
/// - A blob created with [`create`](Self::create) is visible only after its
///   writer has been synced.
/// - Creating a path that already exists truncates it.
/// - `open`, `rename`, and `remove` fail with [`StoreError::NotFound`] when
///   the path is absent.
/// - `exists` never reports a missing path as an error.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Start writing a blob at `path`.
    async fn create(&self, path: &str) -> StoreResult<Box<dyn BlobWriter>>;

    /// Open a blob for reading.
    async fn open(&self, path: &str) -> StoreResult<BlobReader>;

    /// Move a blob from `old` to `new`.
    async fn rename(&self, old: &str, new: &str) -> StoreResult<()>;

    /// Check whether a blob exists.
    ///
    /// Returns `Ok(false)` for absent paths; only hard I/O or transport
    /// failures are errors.
    async fn exists(&self, path: &str) -> StoreResult<bool>;

    /// Delete a blob.
    async fn remove(&self, path: &str) -> StoreResult<()>;

    /// Visit every blob whose path begins with `prefix`.
    async fn walk(&self, prefix: &str, visit: &mut WalkFn<'_>) -> StoreResult<()>;

    /// Metadata for one blob. Fails with [`StoreError::NotFound`] when absent.
    async fn stat(&self, path: &str) -> StoreResult<BlobInfo>;

    /// Mark an existing blob as modified now, keeping its bytes.
    ///
    /// Fails with [`StoreError::NotFound`] when absent. The default rewrites
    /// the blob in place; backends with a cheaper way override it.
    async fn touch(&self, path: &str) -> StoreResult<()> {
        let reader = self.open(path).await?;
        let content_type = reader.content_type().to_string();
        let data = reader.read_to_end().await?;
        self.put(path, data, &content_type).await
    }

    /// Write a whole payload in one call: create, write, sync, close.
    async fn put(&self, path: &str, data: Bytes, content_type: &str) -> StoreResult<()> {
        let mut writer = self.create(path).await?;
        writer.set_content_type(content_type);
        writer.write(&data).await?;
        writer.sync().await?;
        writer.close().await
    }
}

/// Handle onto which bytes are appended.
///
/// Nothing is committed until [`sync`](Self::sync) succeeds. Closing a
/// writer that was never synced discards whatever the backend had not yet
/// committed.
#[async_trait]
pub trait BlobWriter: Send {
    /// Override the MIME type recorded with the blob.
    fn set_content_type(&mut self, content_type: &str);

    /// Append bytes.
    async fn write(&mut self, buf: &[u8]) -> StoreResult<()>;

    /// Durably commit everything written so far.
    async fn sync(&mut self) -> StoreResult<()>;

    /// Release the writer.
    async fn close(self: Box<Self>) -> StoreResult<()>;
}

/// Handle for reading one blob.
///
/// The byte stream can be consumed once, either whole with
/// [`read_to_end`](Self::read_to_end) or incrementally with
/// [`into_stream`](Self::into_stream). Dropping the reader closes it.
pub struct BlobReader {
    path: String,
    size: u64,
    content_type: String,
    stream: BoxStream<'static, StoreResult<Bytes>>,
}

impl BlobReader {
    /// Build a reader over an existing chunk stream.
    pub fn new(
        path: impl Into<String>,
        size: u64,
        content_type: impl Into<String>,
        stream: BoxStream<'static, StoreResult<Bytes>>,
    ) -> Self {
        Self {
            path: path.into(),
            size,
            content_type: content_type.into(),
            stream,
        }
    }

    /// Build a reader over an in-memory payload.
    pub fn from_bytes(path: impl Into<String>, data: Bytes, content_type: impl Into<String>) -> Self {
        let size = data.len() as u64;
        Self::new(path, size, content_type, stream::once(async move { Ok::<_, StoreError>(data) }).boxed())
    }

    /// The path this reader was opened on.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Size of the blob in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// MIME type recorded with the blob.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Read the whole blob into memory.
    pub async fn read_to_end(self) -> StoreResult<Bytes> {
        let capacity = usize::try_from(self.size).unwrap_or(0);
        let buf = self
            .stream
            .try_fold(BytesMut::with_capacity(capacity), |mut buf, chunk| async move {
                buf.extend_from_slice(&chunk);
                Ok(buf)
            })
            .await?;
        Ok(buf.freeze())
    }

    /// Take the chunk stream.
    pub fn into_stream(self) -> BoxStream<'static, StoreResult<Bytes>> {
        self.stream
    }

    /// Split into metadata and chunk stream.
    pub fn into_parts(self) -> (u64, String, BoxStream<'static, StoreResult<Bytes>>) {
        (self.size, self.content_type, self.stream)
    }
}

impl fmt::Debug for BlobReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobReader")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// Resolve the content type a writer should record.
pub(crate) fn effective_content_type(content_type: Option<&str>) -> String {
    content_type
        .filter(|ct| !ct.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// Collect a walk error for paths that could not be listed.
pub(crate) fn visit_error(visit: &mut WalkFn<'_>, path: &str, err: StoreError) -> StoreResult<()> {
    visit(path, Err(err))
}
