//! Epoch and TTL helpers.
//!
//! The table service expires items through an `expiresAt` attribute holding
//! epoch seconds; expiry is advisory and eventual, not instantaneous. Every
//! mutating call that touches a room refreshes its TTL through
//! [`ttl_seconds`], which is why the clamp lives here rather than in any one
//! store.

use chrono::Utc;

/// Smallest TTL window the stores will ever request, in milliseconds.
pub const MIN_TTL_MS: i64 = 1000;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert a duration from `now_ms` into an absolute `expiresAt` value in
/// epoch seconds, clamping the duration into `[MIN_TTL_MS, max_ms]`.
pub fn ttl_seconds(now_ms: i64, duration_ms: i64, max_ms: i64) -> i64 {
    let clamped = duration_ms.clamp(MIN_TTL_MS, max_ms.max(MIN_TTL_MS));
    (now_ms + clamped) / 1000
}
