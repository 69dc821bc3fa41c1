//! Foundation types for vellum.
//!
//! This crate provides the identity, addressing, and temporal types shared by
//! every other vellum crate.
//!
//! # Key Types
//!
//! - [`Id`] -- 128-bit opaque identifier with a canonical dashed hex form
//! - [`Address`] -- content address of a blob (digest of its bytes)
//! - [`time`] -- the zero instant and RFC 3339 second-precision encoding

pub mod address;
pub mod error;
pub mod id;
pub mod time;

pub use address::Address;
pub use error::TypeError;
pub use id::Id;
