//! Admission trait for abstracting the limiter behind the gate.

use std::time::Duration;

use super::limiter::RateLimitInfo;

/// Trait for rate limiter implementations.
///
/// The gate only needs these three operations, so it is generic over this
/// trait rather than tied to [`RateLimiter`](super::RateLimiter).
pub trait AdmissionControl: Send + Sync {
    /// Decide whether the session may make one more request, counting it if so.
    fn check_rate_limit(&self, session_id: &str) -> bool;

    /// Remaining requests per window, without changing any state.
    fn rate_limit_info(&self, session_id: &str) -> RateLimitInfo;

    /// How long until the session would be admitted again, if it is blocked.
    fn retry_after(&self, session_id: &str) -> Option<Duration>;
}
