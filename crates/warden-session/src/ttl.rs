//! TTL derivation from absolute expiry timestamps.
//!
//! A session's `expires_at` is fixed at creation. Every write derives its
//! backend TTL from `expires_at - now`, so the TTL only shrinks as time
//! passes. The backends work at millisecond resolution, so anything below
//! one millisecond counts as already expired.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Smallest TTL a backend can represent.
pub const TTL_RESOLUTION: Duration = Duration::from_millis(1);

/// Remaining lifetime of something expiring at `expires_at`.
///
/// Returns `None` once less than [`TTL_RESOLUTION`] remains.
pub fn remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
    let left = (expires_at - now).to_std().ok()?;
    (left >= TTL_RESOLUTION).then_some(left)
}

/// Remaining lifetime, clamped up to `minimum` once it has run out.
///
/// Used for blacklist entries and revoked-record rewrites, which must
/// outlive the clock-skew window even when the source session just expired.
pub fn remaining_or(expires_at: DateTime<Utc>, now: DateTime<Utc>, minimum: Duration) -> Duration {
    remaining(expires_at, now).unwrap_or(minimum)
}

/// Clamp a possibly-absent or zero TTL up to `minimum`.
pub fn at_least(ttl: Option<Duration>, minimum: Duration) -> Duration {
    match ttl {
        Some(ttl) if !ttl.is_zero() => ttl,
        _ => minimum,
    }
}
