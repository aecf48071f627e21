//! OS notification detector
//!
//! Uses the notify crate (inotify, FSEvents, ReadDirectoryChangesW) to
//! receive change events and hands them to the trigger in batches.

use crate::ignore::IgnoreRules;
use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use notify::event::{AccessKind, MetadataKind, ModifyKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use regen_trigger::{Regenerate, SourceDetector, SourceId};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Source detector backed by OS file notifications
pub struct NotifyDetector {
    /// Longest a poll blocks waiting for the first event
    interval: Duration,

    watcher: Mutex<RecommendedWatcher>,

    /// Changed paths forwarded by the notify callback
    events: Receiver<PathBuf>,

    /// Canonical paths handed to the watcher
    watched: Mutex<HashSet<PathBuf>>,

    /// Applied when polling, relative to the watch root each path falls under
    rules: IgnoreRules,
}

impl NotifyDetector {
    /// Create a detector whose polls block for at most `interval`
    pub fn new(interval: Duration, rules: IgnoreRules) -> Result<Self> {
        let (tx, rx) = unbounded();

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if !is_content_change(&event.kind) {
                    return;
                }

                for path in event.paths {
                    if tx.send(path).is_err() {
                        warn!("Failed to forward file change event");
                    }
                }
            }
            Err(e) => warn!("Watch error: {}", e),
        })
        .context("Failed to create file watcher")?;

        Ok(Self {
            interval,
            watcher: Mutex::new(watcher),
            events: rx,
            watched: Mutex::new(HashSet::new()),
            rules,
        })
    }

    /// Paths currently registered with the OS watcher
    pub fn watched(&self) -> Vec<PathBuf> {
        self.watched.lock().iter().cloned().collect()
    }

    /// Whether `path` is ignored below the deepest watch root containing it
    fn is_ignored(&self, path: &Path, watched: &HashSet<PathBuf>) -> bool {
        let watch_root = watched
            .iter()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.components().count());

        let ignored = match watch_root {
            Some(root) => self.rules.should_ignore_under(path, root),
            None => self.rules.should_ignore(path),
        };
        if ignored {
            trace!("Ignoring {}", path.display());
        }
        ignored
    }

    /// Identifier for a changed path, relative to the rules root when possible
    fn source_id(&self, path: &Path) -> SourceId {
        path.strip_prefix(self.rules.root())
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

impl SourceDetector for NotifyDetector {
    fn register_source(&self, source: &str) -> anyhow::Result<()> {
        let path = std::fs::canonicalize(source)
            .with_context(|| format!("Cannot watch '{}'", source))?;

        let mut watched = self.watched.lock();
        if watched.contains(&path) {
            debug!("Already watching {}", path.display());
            return Ok(());
        }

        self.watcher
            .lock()
            .watch(&path, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", path.display()))?;

        info!("Watching {} for changes", path.display());
        watched.insert(path);
        Ok(())
    }

    fn poll_changed_sources(&self) -> anyhow::Result<HashSet<SourceId>> {
        let first = match self.events.recv_timeout(self.interval) {
            Ok(path) => path,
            Err(RecvTimeoutError::Timeout) => return Ok(HashSet::new()),
            Err(RecvTimeoutError::Disconnected) => {
                anyhow::bail!("File watcher event channel closed")
            }
        };

        // Whatever else already arrived belongs to the same batch
        let paths: Vec<PathBuf> = std::iter::once(first).chain(self.events.try_iter()).collect();

        let watched = self.watched.lock();
        Ok(paths
            .iter()
            .filter(|path| !self.is_ignored(path, &watched))
            .map(|path| self.source_id(path))
            .collect())
    }

    fn on_stop(&self, _regenerate: &dyn Regenerate) -> anyhow::Result<()> {
        let mut watched = self.watched.lock();
        let mut watcher = self.watcher.lock();
        for path in watched.drain() {
            if let Err(e) = watcher.unwatch(&path) {
                warn!("Failed to unwatch {}: {}", path.display(), e);
            }
        }
        Ok(())
    }
}

/// Events that may change what regeneration would produce
fn is_content_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::AccessTime)) => false,
        EventKind::Modify(_) => true,
        // A writer closing the file is the last event of a save on Linux
        EventKind::Access(AccessKind::Close(notify::event::AccessMode::Write)) => true,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => false,
    }
}
