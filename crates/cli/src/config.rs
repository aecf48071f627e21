//! Configuration file loading
//!
//! Values come from, in increasing precedence: built-in defaults, the
//! `regen.toml` file, and command-line flags.

use anyhow::{Context, Result};
use regen_trigger::TriggerConfig;
use regen_watcher::{Backend, IgnoreConfig};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Duration;

/// Config file picked up from the working directory
pub const CONFIG_FILE_NAME: &str = "regen.toml";

/// Accepted range for every interval, in milliseconds
const VALID_INTERVAL_MS: RangeInclusive<u64> = 1..=60_000;

/// Default detector interval (poll period / notification wait)
const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Full `regen.toml` contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegenConfig {
    #[serde(default)]
    pub trigger: TriggerConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub ignore: IgnoreConfig,
}

/// `[watch]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Detection backend (default: notify)
    #[serde(default)]
    pub backend: Backend,

    /// Poll period, or longest wait for a notification (default: 250ms)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Command-line values that win over the file
#[derive(Debug, Default)]
pub struct Overrides {
    pub backend: Option<Backend>,
    pub tick_ms: Option<u64>,
    pub window_ms: Option<u64>,
    pub poll_ms: Option<u64>,
}

impl RegenConfig {
    /// Apply command-line overrides
    pub fn with_overrides(mut self, overrides: &Overrides) -> Self {
        if let Some(backend) = overrides.backend {
            self.watch.backend = backend;
        }
        if let Some(tick) = overrides.tick_ms {
            self.trigger.tick_interval_ms = tick;
        }
        if let Some(window) = overrides.window_ms {
            self.trigger.quiet_window_ms = window;
        }
        if let Some(poll) = overrides.poll_ms {
            self.watch.poll_interval_ms = poll;
        }
        self
    }

    /// Reject intervals outside 1-60000ms
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("trigger.tick_interval_ms", self.trigger.tick_interval_ms),
            ("trigger.quiet_window_ms", self.trigger.quiet_window_ms),
            ("watch.poll_interval_ms", self.watch.poll_interval_ms),
        ];

        for (key, value) in intervals {
            if !VALID_INTERVAL_MS.contains(&value) {
                anyhow::bail!(
                    "Invalid {}: {} (must be between {} and {} ms)",
                    key,
                    value,
                    VALID_INTERVAL_MS.start(),
                    VALID_INTERVAL_MS.end()
                );
            }
        }
        Ok(())
    }
}

/// Load configuration
///
/// An explicit path must exist. Otherwise `regen.toml` in `dir` is used if
/// present, falling back to defaults.
pub fn load(explicit: Option<&Path>, dir: &Path) -> Result<RegenConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let candidate = dir.join(CONFIG_FILE_NAME);
            if !candidate.is_file() {
                return Ok(RegenConfig::default());
            }
            candidate
        }
    };

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}
