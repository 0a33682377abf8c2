//! Expiry checks on decoded access token claims.

use crate::credentials::DecodedClaims;

/// Buffer used right before sending a request (60 seconds).
pub const REACTIVE_BUFFER_SECS: i64 = 60;

/// Buffer for voluntary checks ahead of a batch of calls (5 minutes / 300 seconds).
pub const PROACTIVE_BUFFER_SECS: i64 = 300;

/// Whether a token with `claims` should be refreshed at `now` (epoch seconds).
///
/// Absent claims count as expiring. Claims without an `exp` never expire.
pub fn is_expiring_at(claims: Option<&DecodedClaims>, buffer_secs: i64, now: i64) -> bool {
    match claims {
        None => true,
        Some(claims) => match claims.expires_at {
            Some(exp) => exp <= now.saturating_add(buffer_secs),
            None => false,
        },
    }
}

/// [`is_expiring_at`] against the current wall clock.
pub fn is_expiring(claims: Option<&DecodedClaims>, buffer_secs: i64) -> bool {
    is_expiring_at(claims, buffer_secs, chrono::Utc::now().timestamp())
}
