//! Content addressing for vellum.
//!
//! Every blob is keyed by the SHA-256 digest of its bytes. The digest is
//! rendered as lowercase hex by default; a padded URL-safe base64 rendering
//! is available for stores populated with that encoding.

pub mod hasher;

pub use hasher::{address, AddressEncoding, ContentHasher, HasherError};
