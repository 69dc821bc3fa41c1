use async_trait::async_trait;
use tracing::info;

use crate::config::{FileSystemConfig, FileSystemKind};
use crate::error::StoreResult;
use crate::local::LocalFileSystem;
use crate::memory::VirtualFileSystem;
use crate::nop::NopFileSystem;
use crate::remote::RemoteFileSystem;
use crate::traits::{BlobInfo, BlobReader, BlobStore, BlobWriter, WalkFn};

/// The blob store selected at runtime.
#[derive(Debug)]
pub enum FileSystem {
    Local(LocalFileSystem),
    Remote(RemoteFileSystem),
    Virtual(VirtualFileSystem),
    Nop(NopFileSystem),
}

impl FileSystem {
    /// Construct the backend named by `config.kind`.
    pub async fn from_config(config: &FileSystemConfig) -> StoreResult<Self> {
        let fs = match config.kind {
            FileSystemKind::Local => Self::Local(LocalFileSystem::open_root(&config.root).await?),
            FileSystemKind::Remote => Self::Remote(RemoteFileSystem::s3(&config.remote)?),
            FileSystemKind::Virtual => Self::Virtual(VirtualFileSystem::new()),
            FileSystemKind::Nop => Self::Nop(NopFileSystem::new()),
        };
        info!(kind = %fs.kind(), "blob store ready");
        Ok(fs)
    }

    /// Which backend this is.
    pub fn kind(&self) -> FileSystemKind {
        match self {
            Self::Local(_) => FileSystemKind::Local,
            Self::Remote(_) => FileSystemKind::Remote,
            Self::Virtual(_) => FileSystemKind::Virtual,
            Self::Nop(_) => FileSystemKind::Nop,
        }
    }

    /// The in-memory backend, if that is what this is.
    pub fn as_virtual(&self) -> Option<&VirtualFileSystem> {
        match self {
            Self::Virtual(fs) => Some(fs),
            _ => None,
        }
    }

    fn backend(&self) -> &dyn BlobStore {
        match self {
            Self::Local(fs) => fs,
            Self::Remote(fs) => fs,
            Self::Virtual(fs) => fs,
            Self::Nop(fs) => fs,
        }
    }
}

impl From<VirtualFileSystem> for FileSystem {
    fn from(fs: VirtualFileSystem) -> Self {
        Self::Virtual(fs)
    }
}

#[async_trait]
impl BlobStore for FileSystem {
    async fn create(&self, path: &str) -> StoreResult<Box<dyn BlobWriter>> {
        self.backend().create(path).await
    }

    async fn open(&self, path: &str) -> StoreResult<BlobReader> {
        self.backend().open(path).await
    }

    async fn rename(&self, old: &str, new: &str) -> StoreResult<()> {
        self.backend().rename(old, new).await
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        self.backend().exists(path).await
    }

    async fn remove(&self, path: &str) -> StoreResult<()> {
        self.backend().remove(path).await
    }

    async fn walk(&self, prefix: &str, visit: &mut WalkFn<'_>) -> StoreResult<()> {
        self.backend().walk(prefix, visit).await
    }

    async fn stat(&self, path: &str) -> StoreResult<BlobInfo> {
        self.backend().stat(path).await
    }

    async fn touch(&self, path: &str) -> StoreResult<()> {
        self.backend().touch(path).await
    }
}
