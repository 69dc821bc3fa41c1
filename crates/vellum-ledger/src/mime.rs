//! Minimal MIME type validation.
//!
//! Accepts `type/subtype` followed by optional `; name=value` parameters,
//! where every name is an RFC 7230 token and values are tokens or quoted
//! strings.

use crate::error::{LedgerError, LedgerResult};

fn is_tchar(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_tchar)
}

fn is_quoted(s: &str) -> bool {
    s.len() >= 2
        && s.starts_with('"')
        && s.ends_with('"')
        && s[1..s.len() - 1].chars().all(|c| c != '"' && !c.is_control())
}

/// Returns `true` if `value` is a well-formed media type.
pub fn is_valid(value: &str) -> bool {
    let mut parts = value.split(';');
    let essence = parts.next().unwrap_or_default().trim();
    let Some((kind, subtype)) = essence.split_once('/') else {
        return false;
    };
    if !is_token(kind) || !is_token(subtype) {
        return false;
    }
    parts.all(|param| {
        let Some((name, value)) = param.trim().split_once('=') else {
            return false;
        };
        is_token(name) && (is_token(value) || is_quoted(value))
    })
}

/// Validate a media type, reporting failures as invalid input.
pub fn validate(value: &str) -> LedgerResult<()> {
    if is_valid(value) {
        Ok(())
    } else {
        Err(LedgerError::InvalidInput(format!(
            "malformed content type {value:?}"
        )))
    }
}

/// The `type/subtype` part, lowercased, without parameters.
pub fn essence(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
