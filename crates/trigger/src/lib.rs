//! Debounced regeneration trigger
//!
//! This crate provides the change-coalescing core used by `regen`:
//! - A pluggable [`SourceDetector`] reporting which sources changed
//! - An [`Accumulator`] collecting changed sources and the time of the last change
//! - A [`Trigger`] running a detector loop and a debounce loop on two threads
//! - One [`Regenerate`] call per quiet window with every source that changed in it
//!
//! How changes are detected and what regeneration does are both left to the
//! caller. See the `regen-watcher` crate for filesystem detectors.

pub mod accumulator;
pub mod config;
pub mod detector;
pub mod error;
pub mod trigger;

// Re-exports
pub use accumulator::Accumulator;
pub use config::TriggerConfig;
pub use detector::{Regenerate, SourceDetector, SourceId};
pub use error::{Result, TriggerError};
pub use trigger::{Trigger, Workers};
