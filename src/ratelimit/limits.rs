//! Per-window request ceilings.
//!
//! Ceilings default to 15 requests per minute, 250 per hour and 500 per day.
//! They can be overridden from configuration; window durations are fixed.

use serde::{Deserialize, Serialize};

use super::window::TimeWindow;
use crate::error::{LimiterError, Result};

/// Default ceiling for the minute window.
pub const DEFAULT_PER_MINUTE: u64 = 15;
/// Default ceiling for the hour window.
pub const DEFAULT_PER_HOUR: u64 = 250;
/// Default ceiling for the day window.
pub const DEFAULT_PER_DAY: u64 = 500;

/// Maximum admitted requests in each window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimits {
    /// Requests allowed per minute
    #[serde(default = "default_per_minute")]
    pub per_minute: u64,
    /// Requests allowed per hour
    #[serde(default = "default_per_hour")]
    pub per_hour: u64,
    /// Requests allowed per day
    #[serde(default = "default_per_day")]
    pub per_day: u64,
}

impl Default for WindowLimits {
    fn default() -> Self {
        Self {
            per_minute: DEFAULT_PER_MINUTE,
            per_hour: DEFAULT_PER_HOUR,
            per_day: DEFAULT_PER_DAY,
        }
    }
}

fn default_per_minute() -> u64 {
    DEFAULT_PER_MINUTE
}

fn default_per_hour() -> u64 {
    DEFAULT_PER_HOUR
}

fn default_per_day() -> u64 {
    DEFAULT_PER_DAY
}

impl WindowLimits {
    /// Create limits from explicit ceilings.
    pub fn new(per_minute: u64, per_hour: u64, per_day: u64) -> Self {
        Self {
            per_minute,
            per_hour,
            per_day,
        }
    }

    /// Load limits from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let limits: WindowLimits = serde_yaml::from_str(yaml)
            .map_err(|e| LimiterError::Config(format!("Failed to parse limits: {}", e)))?;
        limits.validate()?;
        Ok(limits)
    }

    /// Get the ceiling for a window.
    pub fn ceiling(&self, window: TimeWindow) -> u64 {
        match window {
            TimeWindow::Minute => self.per_minute,
            TimeWindow::Hour => self.per_hour,
            TimeWindow::Day => self.per_day,
        }
    }

    /// Reject ceilings that would block every request.
    pub fn validate(&self) -> Result<()> {
        for window in TimeWindow::ALL {
            if self.ceiling(window) == 0 {
                return Err(LimiterError::Config(format!(
                    "{} ceiling must be at least 1",
                    window
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = WindowLimits::default();
        assert_eq!(limits.ceiling(TimeWindow::Minute), 15);
        assert_eq!(limits.ceiling(TimeWindow::Hour), 250);
        assert_eq!(limits.ceiling(TimeWindow::Day), 500);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
per_minute: 5
"#;
        let limits = WindowLimits::from_yaml(yaml).unwrap();
        assert_eq!(limits.per_minute, 5);
        assert_eq!(limits.per_hour, DEFAULT_PER_HOUR);
        assert_eq!(limits.per_day, DEFAULT_PER_DAY);
    }

    #[test]
    fn test_zero_ceiling_rejected() {
        let yaml = r#"
per_minute: 10
per_hour: 0
"#;
        let err = WindowLimits::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, LimiterError::Config(_)));
        assert!(err.to_string().contains("hour"));
    }

    #[test]
    fn test_malformed_yaml_rejected() {
        let result = WindowLimits::from_yaml("per_minute: lots");
        assert!(matches!(result, Err(LimiterError::Config(_))));
    }
}
