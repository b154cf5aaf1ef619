//! Expiration policy.
//!
//! A stored `ttl` is an absolute instant in milliseconds since the Unix
//! epoch. Negative values never expire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Time-to-live requested for a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ttl {
    /// Non-negative: lifetime in milliseconds from the write.
    /// Negative: stored verbatim, never expires.
    Millis(i64),
    /// Absolute expiration instant
    At(DateTime<Utc>),
}

impl Ttl {
    /// Never expires
    pub const NEVER: Ttl = Ttl::Millis(-1);

    /// Expire `duration` after the write
    pub fn after(duration: Duration) -> Self {
        Self::Millis(i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
    }

    pub fn at(instant: DateTime<Utc>) -> Self {
        Self::At(instant)
    }

    /// Absolute stored value for a write happening at `now_ms`
    pub fn resolve_at(self, now_ms: i64) -> i64 {
        match self {
            Self::At(instant) => instant.timestamp_millis(),
            Self::Millis(ms) if ms < 0 => ms,
            Self::Millis(ms) => now_ms.saturating_add(ms),
        }
    }
}

impl From<Duration> for Ttl {
    fn from(duration: Duration) -> Self {
        Self::after(duration)
    }
}

impl From<DateTime<Utc>> for Ttl {
    fn from(instant: DateTime<Utc>) -> Self {
        Self::At(instant)
    }
}

impl From<i64> for Ttl {
    fn from(ms: i64) -> Self {
        Self::Millis(ms)
    }
}

/// Current time in milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Pick `explicit` over `fallback` and turn it into a stored instant.
///
/// Returns `None` when neither is configured.
pub fn resolve_ttl(explicit: Option<Ttl>, fallback: Option<Ttl>, now_ms: i64) -> Option<i64> {
    explicit.or(fallback).map(|ttl| ttl.resolve_at(now_ms))
}

/// Whether a stored instant has passed
pub fn is_expired(ttl: f64, now_ms: i64) -> bool {
    ttl >= 0.0 && ttl < now_ms as f64
}
