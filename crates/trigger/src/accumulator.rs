//! Pending-source accumulator
//!
//! Bridges the detector loop (which appends) and the debounce loop (which
//! drains). The pending set and the time of the last append live behind one
//! lock so a drain can never race an append.

use crate::SourceId;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Sources waiting for regeneration
#[derive(Debug, Default)]
struct Pending {
    /// Changed sources not yet delivered
    sources: HashSet<SourceId>,

    /// When `sources` was last appended to
    last_change: Option<Instant>,
}

/// Lock-protected pending set plus last-change timestamp
///
/// Every operation takes the current time as a parameter; callers pass
/// `Instant::now()`, tests pass synthetic instants.
#[derive(Debug, Default)]
pub struct Accumulator {
    inner: Mutex<Pending>,
}

impl Accumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch of changed sources and restamp the last-change time
    ///
    /// An empty batch leaves both the set and the timestamp untouched.
    /// Returns the number of sources that were not already pending.
    pub fn append<I>(&self, sources: I, now: Instant) -> usize
    where
        I: IntoIterator<Item = SourceId>,
    {
        let mut sources = sources.into_iter().peekable();
        if sources.peek().is_none() {
            return 0;
        }

        let mut pending = self.inner.lock();
        let before = pending.sources.len();
        pending.sources.extend(sources);
        pending.last_change = Some(now);
        pending.sources.len() - before
    }

    /// Take every pending source if nothing was appended for longer than `window`
    ///
    /// Ready means the set is non-empty and `now` is strictly after
    /// `last_change + window`. The returned set is removed from the
    /// accumulator in the same critical section; appends that happen after
    /// this call land in the next batch.
    pub fn drain_ready(&self, now: Instant, window: Duration) -> Option<HashSet<SourceId>> {
        let mut pending = self.inner.lock();
        if pending.sources.is_empty() {
            return None;
        }

        let deadline = pending.last_change?.checked_add(window)?;
        if now <= deadline {
            return None;
        }

        pending.last_change = None;
        Some(std::mem::take(&mut pending.sources))
    }

    /// Number of pending sources
    pub fn len(&self) -> usize {
        self.inner.lock().sources.len()
    }

    /// True when nothing is waiting for regeneration
    pub fn is_empty(&self) -> bool {
        self.inner.lock().sources.is_empty()
    }

    /// Time of the last append still pending, if any
    pub fn last_change(&self) -> Option<Instant> {
        self.inner.lock().last_change
    }
}
