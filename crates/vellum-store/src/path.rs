//! Blob path validation.
//!
//! Paths are `/`-separated relative keys. They must be non-empty, must not
//! start or end with `/`, and no segment may be empty, `.`, or `..`. This
//! keeps local-filesystem keys inside the store root and gives every backend
//! the same key space.

use crate::error::{StoreError, StoreResult};

/// Validate a blob path, returning it unchanged if valid.
pub fn validate(path: &str) -> StoreResult<&str> {
    if path.is_empty() || path.contains('\0') || path.contains('\\') {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    let bad_segment = path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if bad_segment {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(path)
}
