//! Blob storage for vellum.
//!
//! Blobs are opaque byte streams keyed by a path string. The repository uses
//! content addresses as keys, but the store itself never interprets keys or
//! contents.
//!
//! # Storage Backends
//!
//! All backends implement the [`BlobStore`] trait:
//!
//! - [`LocalFileSystem`] -- files under a root directory
//! - [`RemoteFileSystem`] -- any `object_store` backend (S3 in production)
//! - [`VirtualFileSystem`] -- `HashMap`-based store for tests and embedding
//! - [`NopFileSystem`] -- discards writes, finds nothing
//!
//! [`FileSystem`] is the tagged variant selected at runtime from a
//! [`FileSystemConfig`].
//!
//! # Design Rules
//!
//! 1. Writes become visible only after [`BlobWriter::sync`].
//! 2. Re-creating an existing path truncates it.
//! 3. Missing paths surface as [`StoreError::NotFound`], never as I/O errors.
//! 4. Walk ordering is unspecified.
//! 5. Remote renames are copy-then-delete and are not atomic.

pub mod config;
pub mod error;
pub mod filesystem;
pub mod local;
pub mod memory;
pub mod nop;
pub mod path;
pub mod remote;
pub mod traits;

pub use config::{FileSystemConfig, FileSystemKind, FileSystemOption, RemoteConfig, RemoteOption};
pub use error::{StoreError, StoreResult};
pub use filesystem::FileSystem;
pub use local::LocalFileSystem;
pub use memory::VirtualFileSystem;
pub use nop::NopFileSystem;
pub use remote::RemoteFileSystem;
pub use traits::{BlobInfo, BlobReader, BlobStore, BlobWriter, WalkFn, DEFAULT_CONTENT_TYPE};
