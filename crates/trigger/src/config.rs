//! Trigger timing configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default tick interval and quiet window, in milliseconds
pub const DEFAULT_INTERVAL_MS: u64 = 300;

/// Shortest tick the debounce loop will sleep for
pub const MIN_TICK_MS: u64 = 1;

/// Timing of the debounce loop
///
/// The tick interval is how often the debounce loop wakes up; the quiet
/// window is how long no change may arrive before a batch is released.
/// The window is always measured from the last recorded change. With both
/// at the same value a burst is flushed one to two ticks after it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Debounce loop sleep between checks (default: 300ms)
    #[serde(default = "default_interval_ms")]
    pub tick_interval_ms: u64,

    /// Idle time after the last change before regeneration (default: 300ms)
    #[serde(default = "default_interval_ms")]
    pub quiet_window_ms: u64,
}

impl TriggerConfig {
    /// Tick interval as a `Duration`
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Quiet window as a `Duration`
    pub fn quiet_window(&self) -> Duration {
        Duration::from_millis(self.quiet_window_ms)
    }

    /// Same config with a different tick interval
    pub fn with_tick_interval(mut self, tick: Duration) -> Self {
        self.tick_interval_ms = saturating_millis(tick);
        self
    }

    /// Same config with a different quiet window
    pub fn with_quiet_window(mut self, window: Duration) -> Self {
        self.quiet_window_ms = saturating_millis(window);
        self
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_INTERVAL_MS,
            quiet_window_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
