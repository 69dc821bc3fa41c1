//! Timestamps.
//!
//! Revisions carry UTC timestamps with microsecond precision internally (the
//! precision PostgreSQL `timestamptz` keeps) and are rendered as RFC 3339
//! with whole seconds on the wire. "Not set" is the zero instant
//! `0001-01-01T00:00:00Z` rather than an `Option`, so a live revision still
//! serializes a `deleted_on` value.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

use crate::error::TypeError;

/// Seconds between 0001-01-01T00:00:00Z and the Unix epoch.
const ZERO_INSTANT_SECS: i64 = -62_135_596_800;

/// The zero instant, `0001-01-01T00:00:00Z`.
pub fn zero() -> DateTime<Utc> {
    DateTime::from_timestamp(ZERO_INSTANT_SECS, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Returns `true` if `t` is the zero instant.
pub fn is_zero(t: &DateTime<Utc>) -> bool {
    *t == zero()
}

/// The current wall-clock time truncated to microseconds.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Render as RFC 3339 with whole seconds and a `Z` suffix.
pub fn format_rfc3339(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC 3339 timestamp into UTC.
pub fn parse_rfc3339(text: &str) -> Result<DateTime<Utc>, TypeError> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| TypeError::InvalidTimestamp(format!("{text:?}: {e}")))
}

/// Serde adapter: RFC 3339, second precision, `null` reads as the zero
/// instant.
pub mod rfc3339_seconds {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_rfc3339(t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(super::zero()),
            Some(text) => super::parse_rfc3339(&text).map_err(serde::de::Error::custom),
        }
    }
}
