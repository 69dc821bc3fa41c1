use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::path;
use crate::traits::{BlobInfo, BlobReader, BlobStore, BlobWriter, WalkFn};

/// Blob store that accepts every write and stores nothing.
///
/// Reads and renames report [`StoreError::NotFound`]; `exists` is always
/// `false`; `walk` visits nothing. Useful for load-testing the metadata
/// path in isolation.
#[derive(Clone, Copy, Debug, Default)]
pub struct NopFileSystem;

impl NopFileSystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BlobStore for NopFileSystem {
    async fn create(&self, path: &str) -> StoreResult<Box<dyn BlobWriter>> {
        path::validate(path)?;
        Ok(Box::new(NopWriter))
    }

    async fn open(&self, path: &str) -> StoreResult<BlobReader> {
        Err(StoreError::NotFound(path.to_string()))
    }

    async fn rename(&self, old: &str, _new: &str) -> StoreResult<()> {
        Err(StoreError::NotFound(old.to_string()))
    }

    async fn exists(&self, _path: &str) -> StoreResult<bool> {
        Ok(false)
    }

    async fn remove(&self, path: &str) -> StoreResult<()> {
        Err(StoreError::NotFound(path.to_string()))
    }

    async fn walk(&self, _prefix: &str, _visit: &mut WalkFn<'_>) -> StoreResult<()> {
        Ok(())
    }

    async fn stat(&self, path: &str) -> StoreResult<BlobInfo> {
        Err(StoreError::NotFound(path.to_string()))
    }

    async fn touch(&self, path: &str) -> StoreResult<()> {
        Err(StoreError::NotFound(path.to_string()))
    }
}

struct NopWriter;

#[async_trait]
impl BlobWriter for NopWriter {
    fn set_content_type(&mut self, _content_type: &str) {}

    async fn write(&mut self, _buf: &[u8]) -> StoreResult<()> {
        Ok(())
    }

    async fn sync(&mut self) -> StoreResult<()> {
        Ok(())
    }

    async fn close(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
