//! Engine configuration
//!
//! Every section has working defaults; a TOML file only needs the keys it
//! wants to override:
//!
//! ```toml
//! [campaign]
//! seed = 1881
//!
//! [rules]
//! decay_factor = 0.98
//!
//! [retry]
//! max_attempts = 8
//! ```

use crate::error::{GameError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub campaign: CampaignConfig,
    pub rules: Rules,
    pub store: StoreConfig,
    pub retry: RetryPolicy,
}

/// Campaign identity. The seed keys every random draw the engine makes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CampaignConfig {
    pub seed: u64,
    pub start_year: i32,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            start_year: 1900,
        }
    }
}

/// Numeric game rules consumed by the fold. Two folds only agree if they
/// were given the same rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Rules {
    /// Multiplier applied to every active feeling per year
    pub decay_factor: f64,
    /// Magnitude below which decay stops
    pub feeling_floor: f64,
    pub reputation_min: i32,
    pub reputation_max: i32,
    /// Influence cap at zero (or negative) reputation
    pub influence_base_cap: i32,
    /// Reputation points per extra point of influence cap
    pub influence_cap_step: i32,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            decay_factor: 0.98,
            feeling_floor: 0.01,
            reputation_min: -50,
            reputation_max: 50,
            influence_base_cap: 5,
            influence_cap_step: 5,
        }
    }
}

impl Rules {
    /// Per-faction influence ceiling for a given reputation
    pub fn influence_soft_cap(&self, reputation: i32) -> i32 {
        self.influence_base_cap + reputation.max(0) / self.influence_cap_step.max(1)
    }

    pub fn clamp_reputation(&self, reputation: i32) -> i32 {
        reputation.clamp(self.reputation_min, self.reputation_max)
    }

    fn validate(&self) -> Result<()> {
        if !(self.decay_factor > 0.0 && self.decay_factor <= 1.0) {
            return Err(GameError::Config(format!(
                "rules.decay_factor must be in (0, 1], got {}",
                self.decay_factor
            )));
        }
        if !(self.feeling_floor > 0.0) {
            return Err(GameError::Config(format!(
                "rules.feeling_floor must be positive, got {}",
                self.feeling_floor
            )));
        }
        if self.reputation_min >= self.reputation_max {
            return Err(GameError::Config(
                "rules.reputation_min must be below rules.reputation_max".into(),
            ));
        }
        if self.influence_base_cap < 0 || self.influence_cap_step < 1 {
            return Err(GameError::Config(
                "rules.influence_base_cap must be >= 0 and rules.influence_cap_step >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// Storage tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// How long SQLite itself waits on a lock before reporting busy
    pub busy_timeout_ms: u64,
    /// Rows fetched per page by lazy range reads
    pub page_size: usize,
    /// Write a checkpoint every N events (0 = never)
    pub checkpoint_interval: u64,
    /// How often subscriptions poll for new events
    pub poll_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 250,
            page_size: 256,
            checkpoint_interval: 500,
            poll_interval_ms: 200,
        }
    }
}

/// Bounded exponential backoff for lock contention
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 10,
            max_backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

impl EngineConfig {
    /// Parse a TOML document, filling unspecified keys with defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(text).map_err(|e| GameError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.rules.validate()?;
        if self.store.page_size == 0 {
            return Err(GameError::Config("store.page_size must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(GameError::Config("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Default data directory: XDG data dir on Linux, Application Support on macOS
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("great-work")
}
