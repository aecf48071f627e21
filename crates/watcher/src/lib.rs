//! Filesystem source detectors for Regen
//!
//! This crate provides [`SourceDetector`](regen_trigger::SourceDetector)
//! implementations whose source identifiers are file paths:
//! - OS notification watching (notify crate)
//! - Modification-time polling for filesystems without notifications
//! - Ignore rules so editor temporaries and VCS internals never trigger

pub mod backend;
pub mod ignore;
pub mod native;
pub mod poll;

pub use backend::{build_detector, Backend, UnknownBackend};
pub use crate::ignore::{IgnoreConfig, IgnoreRules};
pub use native::NotifyDetector;
pub use poll::PollingDetector;
