use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BotError, Result};

const DAY_SECS: u64 = 24 * 60 * 60;

/// Largest accepted retention; the purge threshold must stay a valid timestamp
const RETENTION_CEILING: Duration = Duration::from_secs(100 * 365 * DAY_SECS);

/// Timing limits for purge tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeSettings {
    /// How often every active channel is rescanned, regardless of retention
    pub poll_interval: Duration,
    pub min_retention: Duration,
    pub max_retention: Duration,
}

impl Default for PurgeSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(33),
            min_retention: Duration::from_secs(30),
            max_retention: Duration::from_secs(3333 * DAY_SECS),
        }
    }
}

impl PurgeSettings {
    /// Clamp a requested retention into `[min_retention, max_retention]`
    pub fn clamp_retention(&self, requested: Duration) -> Duration {
        requested.min(self.max_retention).max(self.min_retention)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(BotError::Config {
                message: "poll interval must be greater than zero".to_string(),
            });
        }
        if self.max_retention > RETENTION_CEILING {
            return Err(BotError::Config {
                message: format!(
                    "maximum retention ({}s) exceeds the supported ceiling ({}s)",
                    self.max_retention.as_secs(),
                    RETENTION_CEILING.as_secs()
                ),
            });
        }
        if self.min_retention > self.max_retention {
            return Err(BotError::Config {
                message: format!(
                    "minimum retention ({}s) exceeds maximum retention ({}s)",
                    self.min_retention.as_secs(),
                    self.max_retention.as_secs()
                ),
            });
        }
        Ok(())
    }
}

/// Process configuration, read from the environment (and `.env`)
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    /// Directory holding `purge_state.json`
    pub state_path: PathBuf,
    pub purge: PurgeSettings,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let token = lookup("DISCORD_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| BotError::Config {
                message: "DISCORD_TOKEN is not set".to_string(),
            })?;

        let defaults = PurgeSettings::default();
        let purge = PurgeSettings {
            poll_interval: secs_var(&lookup, "PURGE_POLL_INTERVAL_SECS")?
                .unwrap_or(defaults.poll_interval),
            min_retention: secs_var(&lookup, "PURGE_MIN_RETENTION_SECS")?
                .unwrap_or(defaults.min_retention),
            max_retention: secs_var(&lookup, "PURGE_MAX_RETENTION_SECS")?
                .unwrap_or(defaults.max_retention),
        };
        purge.validate()?;

        Ok(Self {
            token,
            state_path: lookup("STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("state")),
            purge,
        })
    }

    /// Apply command line overrides on top of the environment
    pub fn with_overrides(
        mut self,
        state_path: Option<PathBuf>,
        poll_interval_secs: Option<u64>,
    ) -> Result<Self> {
        if let Some(path) = state_path {
            self.state_path = path;
        }
        if let Some(secs) = poll_interval_secs {
            self.purge.poll_interval = Duration::from_secs(secs);
        }
        self.purge.validate()?;
        Ok(self)
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_path.join("purge_state.json")
    }
}

fn secs_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<Duration>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| BotError::Config {
                message: format!("{} must be a whole number of seconds, got '{}'", key, raw),
            }),
    }
}
