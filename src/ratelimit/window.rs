//! Fixed-origin counting windows.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Granularity of a counting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeWindow {
    /// Per-minute window
    Minute,
    /// Per-hour window
    Hour,
    /// Per-day window
    Day,
}

impl TimeWindow {
    /// All granularities tracked for a session, shortest first.
    pub const ALL: [TimeWindow; 3] = [TimeWindow::Minute, TimeWindow::Hour, TimeWindow::Day];

    /// Get the duration of this time window.
    pub fn duration(&self) -> Duration {
        match self {
            TimeWindow::Minute => Duration::from_secs(60),
            TimeWindow::Hour => Duration::from_secs(3600),
            TimeWindow::Day => Duration::from_secs(86400),
        }
    }

    /// Short label used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Minute => "minute",
            TimeWindow::Hour => "hour",
            TimeWindow::Day => "day",
        }
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requests admitted since `window_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWindow {
    /// Admitted requests in the current window
    pub count: u64,
    /// When the current window started
    pub window_start: DateTime<Utc>,
}

impl RateLimitWindow {
    /// Create an empty window starting at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    /// Milliseconds elapsed since the window started.
    ///
    /// A clock reading earlier than `window_start` counts as zero elapsed.
    fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        let elapsed = now.signed_duration_since(self.window_start).num_milliseconds();
        u64::try_from(elapsed).unwrap_or(0)
    }

    /// Whether more than the window's duration has passed since it started.
    pub fn is_expired(&self, window: TimeWindow, now: DateTime<Utc>) -> bool {
        u128::from(self.elapsed_ms(now)) > window.duration().as_millis()
    }

    /// Reset the window if it has expired. Returns `true` when a reset happened.
    pub fn reset_if_expired(&mut self, window: TimeWindow, now: DateTime<Utc>) -> bool {
        if self.is_expired(window, now) {
            self.count = 0;
            self.window_start = now;
            true
        } else {
            false
        }
    }

    /// Time until the window is considered expired.
    pub fn duration_until_reset(&self, window: TimeWindow, now: DateTime<Utc>) -> Duration {
        // Expiry needs strictly more than the window duration to pass.
        let expires_after = window.duration().as_millis() as u64 + 1;
        Duration::from_millis(expires_after.saturating_sub(self.elapsed_ms(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_time_window_duration() {
        assert_eq!(TimeWindow::Minute.duration(), Duration::from_millis(60_000));
        assert_eq!(TimeWindow::Hour.duration(), Duration::from_millis(3_600_000));
        assert_eq!(TimeWindow::Day.duration(), Duration::from_millis(86_400_000));
    }

    #[test]
    fn test_window_not_expired_at_exact_duration() {
        let window = RateLimitWindow::new(t0());

        let at_boundary = t0() + chrono::Duration::milliseconds(60_000);
        assert!(!window.is_expired(TimeWindow::Minute, at_boundary));

        let past_boundary = t0() + chrono::Duration::milliseconds(60_001);
        assert!(window.is_expired(TimeWindow::Minute, past_boundary));
    }

    #[test]
    fn test_reset_if_expired_moves_start_forward() {
        let mut window = RateLimitWindow {
            count: 7,
            window_start: t0(),
        };
        let later = t0() + chrono::Duration::minutes(2);

        assert!(window.reset_if_expired(TimeWindow::Minute, later));
        assert_eq!(window.count, 0);
        assert_eq!(window.window_start, later);

        // Not yet expired again
        let still_open = later + chrono::Duration::seconds(30);
        assert!(!window.reset_if_expired(TimeWindow::Minute, still_open));
    }

    #[test]
    fn test_clock_behind_start_never_resets() {
        let mut window = RateLimitWindow {
            count: 3,
            window_start: t0(),
        };
        let earlier = t0() - chrono::Duration::days(3);

        assert!(!window.reset_if_expired(TimeWindow::Minute, earlier));
        assert_eq!(window.count, 3);
        assert_eq!(window.window_start, t0());
    }

    #[test]
    fn test_duration_until_reset() {
        let window = RateLimitWindow::new(t0());
        let now = t0() + chrono::Duration::seconds(45);

        assert_eq!(
            window.duration_until_reset(TimeWindow::Minute, now),
            Duration::from_millis(15_001)
        );

        let long_after = t0() + chrono::Duration::hours(1);
        assert_eq!(
            window.duration_until_reset(TimeWindow::Minute, long_after),
            Duration::ZERO
        );
    }
}
