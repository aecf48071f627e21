//! Error types for the trigger
//!
//! The trigger does no recovery of its own. These errors only report which
//! worker went down and why, so whoever supervises it can decide.

use thiserror::Error;

/// Convenience type for trigger operations.
pub type Result<T> = std::result::Result<T, TriggerError>;

/// Things that can go wrong while running a trigger.
#[derive(Error, Debug)]
pub enum TriggerError {
    /// The source detector failed to register or poll a source.
    #[error("source detector failed")]
    Detector(#[source] anyhow::Error),

    /// A worker thread panicked, usually inside the regeneration callback.
    #[error("{worker} worker panicked")]
    WorkerPanicked { worker: &'static str },

    /// The OS refused to spawn a worker thread.
    #[error("failed to spawn {worker} worker")]
    Spawn {
        worker: &'static str,
        #[source]
        source: std::io::Error,
    },
}
