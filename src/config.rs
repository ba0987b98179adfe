//! Configuration management for the session limiter.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{LimiterError, Result};
use crate::ratelimit::WindowLimits;

/// Main configuration for the session limiter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Per-window ceilings
    #[serde(default)]
    pub limits: WindowLimits,

    /// Counter mirroring
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Idle session eviction
    #[serde(default)]
    pub eviction: EvictionConfig,
}

/// Persistence mirror configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// JSON file receiving mirrored counters. No mirroring when unset.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

/// Idle session eviction configuration.
///
/// Sessions are kept for the life of the process unless `idle_after_secs`
/// is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvictionConfig {
    /// Evict sessions idle this long whose windows have all expired
    #[serde(default)]
    pub idle_after_secs: Option<u64>,

    /// How often the eviction sweep runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            idle_after_secs: None,
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    300
}

impl EvictionConfig {
    /// Idle threshold, if eviction is enabled.
    pub fn idle_after(&self) -> Option<Duration> {
        self.idle_after_secs.map(Duration::from_secs)
    }

    /// Interval between eviction sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl LimiterConfig {
    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: LimiterConfig =
            serde_yaml::from_str(yaml).map_err(|e| LimiterError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        self.limits.validate()?;
        if self.eviction.sweep_interval_secs == 0 {
            return Err(LimiterError::Config(
                "eviction sweep interval must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }
}
