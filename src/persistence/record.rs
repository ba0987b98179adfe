//! Mirror record written after each admitted request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of one session's counters, keyed by `session_id` in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    /// The session the counters belong to
    pub session_id: String,
    /// Admitted requests in the current minute window
    pub minute_count: u64,
    /// Admitted requests in the current hour window
    pub hour_count: u64,
    /// Admitted requests in the current day window
    pub day_count: u64,
    /// When the admitted request was made
    pub last_request: DateTime<Utc>,
}
