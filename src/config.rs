use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::matching::MatchingConfig;

pub const DAILY_LIMIT_ENV: &str = "FOLLOW_ALONG_DAILY_LIMIT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FollowAlongConfig {
    pub matching: MatchingConfig,

    /// Secondary floor applied to the selected match before it is surfaced.
    /// Per-verse thresholds currently dominate it.
    pub match_floor: f64,

    /// Verses after the matched one kept in the candidate window
    pub lookahead_verses: usize,

    /// Window size from the top of the surah while nothing is matched
    pub initial_window: usize,

    /// Sessions per calendar day for users without unlimited usage
    pub daily_session_limit: u32,

    pub tick_interval_ms: u64,
}

impl Default for FollowAlongConfig {
    fn default() -> Self {
        Self {
            matching: MatchingConfig::default(),
            match_floor: 0.35,
            lookahead_verses: 3,
            initial_window: 5,
            daily_session_limit: 3,
            tick_interval_ms: 1000,
        }
    }
}

impl FollowAlongConfig {
    /// Read JSON config from `path`, defaulting when the file is absent, then
    /// apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config at {}", path.display()))?
        } else {
            Self::default()
        };

        Ok(config.with_env_overrides())
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var(DAILY_LIMIT_ENV) {
            match raw.trim().parse::<u32>() {
                Ok(limit) => self.daily_session_limit = limit,
                Err(err) => warn!("Ignoring {DAILY_LIMIT_ENV}={raw:?}: {err}"),
            }
        }
        self
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}
