//! Core rate limiter implementation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::limits::WindowLimits;
use super::window::{RateLimitWindow, TimeWindow};
use crate::persistence::{MirrorHandle, RateLimitRecord};

/// Counting state for one session: one window per granularity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitState {
    pub minute: RateLimitWindow,
    pub hour: RateLimitWindow,
    pub day: RateLimitWindow,
    /// Last time a decision was made for this session
    pub last_access: DateTime<Utc>,
}

impl RateLimitState {
    /// Create a fresh state with every window starting at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            minute: RateLimitWindow::new(now),
            hour: RateLimitWindow::new(now),
            day: RateLimitWindow::new(now),
            last_access: now,
        }
    }

    /// Get the window for a granularity.
    pub fn window(&self, window: TimeWindow) -> &RateLimitWindow {
        match window {
            TimeWindow::Minute => &self.minute,
            TimeWindow::Hour => &self.hour,
            TimeWindow::Day => &self.day,
        }
    }

    fn window_mut(&mut self, window: TimeWindow) -> &mut RateLimitWindow {
        match window {
            TimeWindow::Minute => &mut self.minute,
            TimeWindow::Hour => &mut self.hour,
            TimeWindow::Day => &mut self.day,
        }
    }

    fn all_expired(&self, now: DateTime<Utc>) -> bool {
        TimeWindow::ALL
            .iter()
            .all(|w| self.window(*w).is_expired(*w, now))
    }
}

/// Requests still available to a session in each window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub minute_remaining: u64,
    pub hour_remaining: u64,
    pub day_remaining: u64,
}

impl std::fmt::Display for RateLimitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} left this minute, {} this hour, {} today",
            self.minute_remaining, self.hour_remaining, self.day_remaining
        )
    }
}

/// The per-session rate limiter.
///
/// Holds every session's counters in memory and is the only authority for
/// admission decisions. Construct one per process and share it behind an
/// `Arc`. Decisions for the same session are serialized by the map's entry
/// lock; different sessions do not contend unless they share a shard.
pub struct RateLimiter {
    /// Session counters indexed by session id
    sessions: DashMap<String, RateLimitState>,
    /// Ceilings applied to every session
    limits: WindowLimits,
    /// Where admitted counts are mirrored, if anywhere
    mirror: Option<MirrorHandle>,
}

impl RateLimiter {
    /// Create a new rate limiter with the default ceilings.
    pub fn new() -> Self {
        Self::with_limits(WindowLimits::default())
    }

    /// Create a rate limiter with custom ceilings.
    pub fn with_limits(limits: WindowLimits) -> Self {
        Self {
            sessions: DashMap::new(),
            limits,
            mirror: None,
        }
    }

    /// Mirror admitted counts through `mirror`.
    pub fn with_mirror(mut self, mirror: MirrorHandle) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// The ceilings this limiter enforces.
    pub fn limits(&self) -> &WindowLimits {
        &self.limits
    }

    /// Decide whether `session_id` may make one more request now.
    pub fn check_rate_limit(&self, session_id: &str) -> bool {
        self.check_rate_limit_at(session_id, Utc::now())
    }

    /// Decide whether `session_id` may make one more request at `now`.
    ///
    /// Expired windows are reset first, each on its own. If any window is at
    /// its ceiling the request is rejected and no counter moves. Otherwise
    /// all three windows are incremented and the new counts are handed to the
    /// persistence mirror.
    pub fn check_rate_limit_at(&self, session_id: &str, now: DateTime<Utc>) -> bool {
        trace!(session_id = %session_id, "Checking rate limit");

        let record = {
            let mut state = self
                .sessions
                .entry(session_id.to_string())
                .or_insert_with(|| {
                    debug!(session_id = %session_id, "Creating rate limit state");
                    RateLimitState::new(now)
                });
            state.last_access = now;

            for window in TimeWindow::ALL {
                if state.window_mut(window).reset_if_expired(window, now) {
                    trace!(session_id = %session_id, window = %window, "Window expired, reset");
                }
            }

            let exhausted = TimeWindow::ALL
                .into_iter()
                .find(|w| state.window(*w).count >= self.limits.ceiling(*w));

            if let Some(window) = exhausted {
                debug!(
                    session_id = %session_id,
                    window = %window,
                    minute_count = state.minute.count,
                    hour_count = state.hour.count,
                    day_count = state.day.count,
                    "Rate limit exceeded"
                );
                return false;
            }

            for window in TimeWindow::ALL {
                state.window_mut(window).count += 1;
            }

            RateLimitRecord {
                session_id: session_id.to_string(),
                minute_count: state.minute.count,
                hour_count: state.hour.count,
                day_count: state.day.count,
                last_request: now,
            }
        };

        if let Some(mirror) = &self.mirror {
            mirror.submit(record);
        }

        true
    }

    /// Remaining requests per window for `session_id`.
    ///
    /// Reports counts as last written by a check; expired windows are not
    /// reset here. Unknown sessions get the full ceilings and no state is
    /// created for them.
    pub fn rate_limit_info(&self, session_id: &str) -> RateLimitInfo {
        let state = self.sessions.get(session_id);
        let state = state.as_deref();
        RateLimitInfo {
            minute_remaining: self.remaining(state, TimeWindow::Minute),
            hour_remaining: self.remaining(state, TimeWindow::Hour),
            day_remaining: self.remaining(state, TimeWindow::Day),
        }
    }

    fn remaining(&self, state: Option<&RateLimitState>, window: TimeWindow) -> u64 {
        let used = state.map_or(0, |s| s.window(window).count);
        self.limits.ceiling(window).saturating_sub(used)
    }

    /// How long until `session_id` would be admitted again.
    pub fn retry_after(&self, session_id: &str) -> Option<Duration> {
        self.retry_after_at(session_id, Utc::now())
    }

    /// How long after `now` every exhausted window of `session_id` resets.
    ///
    /// Returns `None` for unknown sessions and for sessions with no window at
    /// its ceiling. A full window that has already expired no longer blocks,
    /// even before the next check resets it.
    pub fn retry_after_at(&self, session_id: &str, now: DateTime<Utc>) -> Option<Duration> {
        let state = self.sessions.get(session_id)?;

        let wait = TimeWindow::ALL
            .into_iter()
            .filter(|w| {
                let current = state.window(*w);
                current.count >= self.limits.ceiling(*w) && !current.is_expired(*w, now)
            })
            .map(|w| state.window(w).duration_until_reset(w, now))
            .max();
        wait
    }

    /// Drop sessions idle for longer than `idle` whose windows have all expired.
    ///
    /// Returns the number of sessions removed.
    pub fn evict_idle_at(&self, now: DateTime<Utc>, idle: Duration) -> usize {
        let before = self.sessions.len();

        self.sessions.retain(|_, state| {
            let idle_for = now
                .signed_duration_since(state.last_access)
                .to_std()
                .unwrap_or(Duration::ZERO);
            !(idle_for > idle && state.all_expired(now))
        });

        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            info!(
                evicted = evicted,
                remaining = self.sessions.len(),
                "Evicted idle sessions"
            );
        }
        evicted
    }

    /// Get a copy of the state held for a session.
    pub fn session_state(&self, session_id: &str) -> Option<RateLimitState> {
        self.sessions.get(session_id).map(|s| s.value().clone())
    }

    /// Number of sessions currently tracked.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Clear all sessions.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.sessions.clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl super::backend::AdmissionControl for RateLimiter {
    fn check_rate_limit(&self, session_id: &str) -> bool {
        RateLimiter::check_rate_limit(self, session_id)
    }

    fn rate_limit_info(&self, session_id: &str) -> RateLimitInfo {
        RateLimiter::rate_limit_info(self, session_id)
    }

    fn retry_after(&self, session_id: &str) -> Option<Duration> {
        RateLimiter::retry_after(self, session_id)
    }
}
