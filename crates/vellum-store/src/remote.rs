use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, AttributeValue, Attributes, ObjectStore, PutOptions, PutPayload};
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::error::{StoreError, StoreResult};
use crate::path;
use crate::traits::{effective_content_type, BlobInfo, BlobReader, BlobStore, BlobWriter, WalkFn};

/// Blob store over any [`ObjectStore`] backend.
///
/// Production deployments point this at S3 (or an S3-compatible endpoint)
/// through [`RemoteFileSystem::s3`]. Writes are buffered in memory and sent
/// as a single `PUT` on sync. Rename is a copy followed by a delete; a crash
/// in between leaves both keys present.
#[derive(Clone)]
pub struct RemoteFileSystem {
    inner: Arc<dyn ObjectStore>,
}

impl RemoteFileSystem {
    /// Wrap an existing object store.
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self { inner }
    }

    /// Build an S3 client from configuration.
    pub fn s3(config: &RemoteConfig) -> StoreResult<Self> {
        if config.bucket.is_empty() {
            return Err(StoreError::InvalidConfig("bucket is required".into()));
        }
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region);
        if !config.access_key_id.is_empty() {
            builder = builder.with_access_key_id(&config.access_key_id);
        }
        if !config.secret_access_key.is_empty() {
            builder = builder.with_secret_access_key(&config.secret_access_key);
        }
        if !config.token.is_empty() {
            builder = builder.with_token(&config.token);
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        let store = builder
            .build()
            .map_err(|e| StoreError::InvalidConfig(format!("failed to build S3 store: {e}")))?;
        debug!(bucket = %config.bucket, region = %config.region, "configured S3 blob store");
        Ok(Self::new(Arc::new(store)))
    }

    fn location(path: &str) -> StoreResult<ObjectPath> {
        let path = path::validate(path)?;
        ObjectPath::parse(path).map_err(|_| StoreError::InvalidPath(path.to_string()))
    }
}

fn content_type_of(attributes: &Attributes) -> String {
    let recorded = attributes.get(&Attribute::ContentType).map(|value| {
        let value: &str = value;
        value
    });
    effective_content_type(recorded)
}

#[async_trait]
impl BlobStore for RemoteFileSystem {
    async fn create(&self, path: &str) -> StoreResult<Box<dyn BlobWriter>> {
        let location = Self::location(path)?;
        Ok(Box::new(RemoteWriter {
            inner: Arc::clone(&self.inner),
            location,
            buf: BytesMut::new(),
            content_type: None,
        }))
    }

    async fn open(&self, path: &str) -> StoreResult<BlobReader> {
        let location = Self::location(path)?;
        let result = self.inner.get(&location).await?;
        let size = result.meta.size as u64;
        let content_type = content_type_of(&result.attributes);
        let stream = result.into_stream().map_err(StoreError::from).boxed();
        Ok(BlobReader::new(path, size, content_type, stream))
    }

    async fn rename(&self, old: &str, new: &str) -> StoreResult<()> {
        let from = Self::location(old)?;
        let to = Self::location(new)?;
        self.inner.copy(&from, &to).await?;
        if let Err(err) = self.inner.delete(&from).await {
            warn!(from = %from, to = %to, error = %err, "rename left source behind");
            return Err(err.into());
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        let Ok(location) = Self::location(path) else {
            return Ok(false);
        };
        match self.inner.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn remove(&self, path: &str) -> StoreResult<()> {
        let location = Self::location(path)?;
        // S3 deletes are idempotent; probe first so absent keys report NotFound.
        self.inner.head(&location).await?;
        self.inner.delete(&location).await?;
        Ok(())
    }

    async fn walk(&self, prefix: &str, visit: &mut WalkFn<'_>) -> StoreResult<()> {
        // Object store prefixes match whole segments only, so list everything
        // and filter on the raw string.
        let mut listing = self.inner.list(None);
        while let Some(entry) = listing.next().await {
            match entry {
                Ok(meta) => {
                    let key = meta.location.as_ref();
                    if !key.starts_with(prefix) {
                        continue;
                    }
                    let info = BlobInfo {
                        path: key.to_string(),
                        size: meta.size as u64,
                        modified: meta.last_modified,
                    };
                    visit(key, Ok(&info))?;
                }
                Err(err) => visit(prefix, Err(err.into()))?,
            }
        }
        Ok(())
    }

    async fn stat(&self, path: &str) -> StoreResult<BlobInfo> {
        let location = Self::location(path)?;
        let meta = self.inner.head(&location).await?;
        Ok(BlobInfo {
            path: path.to_string(),
            size: meta.size as u64,
            modified: meta.last_modified,
        })
    }
}

impl std::fmt::Debug for RemoteFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFileSystem")
            .field("store", &self.inner.to_string())
            .finish()
    }
}

struct RemoteWriter {
    inner: Arc<dyn ObjectStore>,
    location: ObjectPath,
    buf: BytesMut,
    content_type: Option<String>,
}

#[async_trait]
impl BlobWriter for RemoteWriter {
    fn set_content_type(&mut self, content_type: &str) {
        self.content_type = Some(content_type.to_string());
    }

    async fn write(&mut self, buf: &[u8]) -> StoreResult<()> {
        self.buf.extend_from_slice(buf);
        Ok(())
    }

    async fn sync(&mut self) -> StoreResult<()> {
        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(effective_content_type(self.content_type.as_deref())),
        );
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };
        let payload = PutPayload::from(Bytes::copy_from_slice(&self.buf));
        self.inner.put_opts(&self.location, payload, opts).await?;
        debug!(path = %self.location, size = self.buf.len(), "uploaded blob");
        Ok(())
    }

    async fn close(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
