//! Detector backend selection

use crate::ignore::IgnoreRules;
use crate::native::NotifyDetector;
use crate::poll::PollingDetector;
use anyhow::Result;
use regen_trigger::SourceDetector;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// How source changes are detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// OS change notifications
    #[default]
    Notify,
    /// Periodic modification-time scans
    Poll,
}

/// Backend name that is neither `notify` nor `poll`
#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown backend '{0}' (expected 'notify' or 'poll')")]
pub struct UnknownBackend(pub String);

impl FromStr for Backend {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "notify" => Ok(Backend::Notify),
            "poll" => Ok(Backend::Poll),
            _ => Err(UnknownBackend(s.to_string())),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Notify => f.write_str("notify"),
            Backend::Poll => f.write_str("poll"),
        }
    }
}

/// Build the detector for `backend`
///
/// `interval` is the rescan period for polling and the longest a poll
/// blocks for notifications.
pub fn build_detector(
    backend: Backend,
    interval: Duration,
    rules: IgnoreRules,
) -> Result<Box<dyn SourceDetector>> {
    let detector: Box<dyn SourceDetector> = match backend {
        Backend::Notify => Box::new(NotifyDetector::new(interval, rules)?),
        Backend::Poll => Box::new(PollingDetector::new(interval, rules)),
    };
    Ok(detector)
}
