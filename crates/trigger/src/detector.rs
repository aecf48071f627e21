//! Collaborator traits
//!
//! A [`SourceDetector`] knows how to notice that a source changed; a
//! [`Regenerate`] knows what to do about it. The trigger only sequences the two.

use std::collections::HashSet;
use std::sync::Arc;

/// Opaque name of one watchable input, typically a file path
pub type SourceId = String;

/// Strategy that tracks sources and reports which ones changed
///
/// Implementations are shared between the caller (who registers sources)
/// and the detector thread (which polls), so every method takes `&self`.
pub trait SourceDetector: Send + Sync + 'static {
    /// Begin tracking one source
    fn register_source(&self, source: &str) -> anyhow::Result<()>;

    /// Sources changed since the previous call
    ///
    /// May block; the detector owns the polling cadence. An empty set means
    /// nothing changed this cycle. An error ends the detector loop.
    fn poll_changed_sources(&self) -> anyhow::Result<HashSet<SourceId>>;

    /// Release resources when the trigger's lifecycle ends
    fn on_stop(&self, _regenerate: &dyn Regenerate) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<D: SourceDetector + ?Sized> SourceDetector for Box<D> {
    fn register_source(&self, source: &str) -> anyhow::Result<()> {
        (**self).register_source(source)
    }

    fn poll_changed_sources(&self) -> anyhow::Result<HashSet<SourceId>> {
        (**self).poll_changed_sources()
    }

    fn on_stop(&self, regenerate: &dyn Regenerate) -> anyhow::Result<()> {
        (**self).on_stop(regenerate)
    }
}

impl<D: SourceDetector + ?Sized> SourceDetector for Arc<D> {
    fn register_source(&self, source: &str) -> anyhow::Result<()> {
        (**self).register_source(source)
    }

    fn poll_changed_sources(&self) -> anyhow::Result<HashSet<SourceId>> {
        (**self).poll_changed_sources()
    }

    fn on_stop(&self, regenerate: &dyn Regenerate) -> anyhow::Result<()> {
        (**self).on_stop(regenerate)
    }
}

/// Downstream regeneration, called once per quiet window
///
/// `sources` is never empty and holds each changed source once. Errors are
/// the implementation's to handle; a panic takes down the debounce worker.
pub trait Regenerate: Send + Sync + 'static {
    fn regenerate(&self, sources: HashSet<SourceId>);
}

impl<F> Regenerate for F
where
    F: Fn(HashSet<SourceId>) + Send + Sync + 'static,
{
    fn regenerate(&self, sources: HashSet<SourceId>) {
        self(sources)
    }
}
