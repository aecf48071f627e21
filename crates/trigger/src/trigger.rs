//! Detector and debounce loops
//!
//! `start` spawns two threads per activation:
//! - `regen-detector` polls the [`SourceDetector`] and appends to the accumulator
//! - `regen-debounce` wakes every tick and releases quiet batches to [`Regenerate`]
//!
//! Both loops check the active flag at each iteration boundary. Clearing it
//! is the only way to stop them; a blocked poll or a running callback is
//! never interrupted.

use crate::accumulator::Accumulator;
use crate::config::{TriggerConfig, MIN_TICK_MS};
use crate::detector::{Regenerate, SourceDetector, SourceId};
use crate::error::{Result, TriggerError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

const DETECTOR_WORKER: &str = "regen-detector";
const DEBOUNCE_WORKER: &str = "regen-debounce";

/// State shared between the caller and both workers
struct Shared {
    /// Lifecycle flag gating both loops
    active: AtomicBool,

    /// Worker threads still running (0 or 2 after a successful start)
    running: AtomicUsize,

    /// Changed sources waiting for a quiet window
    pending: Accumulator,

    config: TriggerConfig,
}

impl Shared {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Debounced change-detection trigger
///
/// Owns a detector and an accumulator. A new trigger is inactive: call
/// [`set_active(true)`](Self::set_active) before [`watch`](Self::watch) and
/// [`start`](Self::start), otherwise both do nothing.
pub struct Trigger<D> {
    detector: Arc<D>,
    shared: Arc<Shared>,
}

impl<D: SourceDetector> Trigger<D> {
    /// Create an inactive trigger around `detector`
    ///
    /// A zero tick interval is raised to [`MIN_TICK_MS`] so the debounce
    /// loop always sleeps between checks.
    pub fn new(detector: D, mut config: TriggerConfig) -> Self {
        if config.tick_interval_ms < MIN_TICK_MS {
            warn!(
                "Tick interval {}ms too short, using {}ms",
                config.tick_interval_ms, MIN_TICK_MS
            );
            config.tick_interval_ms = MIN_TICK_MS;
        }

        Self {
            detector: Arc::new(detector),
            shared: Arc::new(Shared {
                active: AtomicBool::new(false),
                running: AtomicUsize::new(0),
                pending: Accumulator::new(),
                config,
            }),
        }
    }

    /// Whether the loops are allowed to keep running
    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    /// Flip the lifecycle flag
    ///
    /// Running loops notice `false` at their next iteration boundary.
    pub fn set_active(&self, active: bool) {
        self.shared.active.store(active, Ordering::SeqCst);
    }

    /// The detection strategy this trigger polls
    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Timing this trigger was built with
    pub fn config(&self) -> &TriggerConfig {
        &self.shared.config
    }

    /// Number of changed sources not yet handed to regeneration
    pub fn pending_len(&self) -> usize {
        self.shared.pending.len()
    }

    /// Register a source with the detector
    ///
    /// Does nothing while the trigger is inactive.
    pub fn watch(&self, source: &str) -> Result<()> {
        if !self.is_active() {
            debug!(source, "Trigger inactive, not watching");
            return Ok(());
        }

        self.detector
            .register_source(source)
            .map_err(TriggerError::Detector)
    }

    /// Spawn the detector and debounce workers
    ///
    /// Returns `Ok(None)` without spawning anything when the trigger is
    /// inactive or when workers from an earlier start are still running.
    pub fn start<R: Regenerate>(&self, regenerate: R) -> Result<Option<Workers>> {
        if !self.is_active() {
            debug!("Trigger inactive, not starting workers");
            return Ok(None);
        }

        if self
            .shared
            .running
            .compare_exchange(0, 2, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Trigger workers already running, ignoring start");
            return Ok(None);
        }

        let detector = Arc::clone(&self.detector);
        let shared = Arc::clone(&self.shared);
        let detector_handle = thread::Builder::new()
            .name(DETECTOR_WORKER.to_string())
            .spawn(move || detect_loop(detector, shared))
            .map_err(|source| {
                // Neither worker is alive
                self.shared.running.store(0, Ordering::SeqCst);
                TriggerError::Spawn {
                    worker: DETECTOR_WORKER,
                    source,
                }
            })?;

        let shared = Arc::clone(&self.shared);
        let debounce_handle = thread::Builder::new()
            .name(DEBOUNCE_WORKER.to_string())
            .spawn(move || debounce_loop(regenerate, shared))
            .map_err(|source| {
                // Let the detector wind down on its own
                self.shared.running.fetch_sub(1, Ordering::SeqCst);
                self.set_active(false);
                TriggerError::Spawn {
                    worker: DEBOUNCE_WORKER,
                    source,
                }
            })?;

        info!(
            tick_ms = self.shared.config.tick_interval_ms,
            window_ms = self.shared.config.quiet_window_ms,
            "Started trigger workers"
        );

        Ok(Some(Workers {
            detector: detector_handle,
            debounce: debounce_handle,
        }))
    }

    /// Deactivate and let the detector release its resources
    ///
    /// Workers stop after their current poll or tick; join them through
    /// [`Workers::join`] if the caller needs to wait.
    pub fn end(&self, regenerate: &dyn Regenerate) -> Result<()> {
        self.set_active(false);
        self.detector
            .on_stop(regenerate)
            .map_err(TriggerError::Detector)
    }
}

/// Join handles for one pair of workers
pub struct Workers {
    detector: JoinHandle<anyhow::Result<()>>,
    debounce: JoinHandle<()>,
}

impl Workers {
    /// True once both workers have exited
    pub fn is_finished(&self) -> bool {
        self.detector.is_finished() && self.debounce.is_finished()
    }

    /// True once either worker has exited
    ///
    /// While the trigger is active this means a worker died: the detector
    /// returned an error or a thread panicked.
    pub fn any_finished(&self) -> bool {
        self.detector.is_finished() || self.debounce.is_finished()
    }

    /// Wait for both workers to exit
    ///
    /// Blocks until the trigger is deactivated and both loops notice. A
    /// debounce panic is reported ahead of a detector failure.
    pub fn join(self) -> Result<()> {
        let detected = self.detector.join();
        let debounced = self.debounce.join();

        if debounced.is_err() {
            return Err(TriggerError::WorkerPanicked {
                worker: DEBOUNCE_WORKER,
            });
        }

        match detected {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TriggerError::Detector(e)),
            Err(_) => Err(TriggerError::WorkerPanicked {
                worker: DETECTOR_WORKER,
            }),
        }
    }
}

/// Decrements the running count when a worker exits, panics included
struct RunningGuard(Arc<Shared>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
    }
}

fn detect_loop<D: SourceDetector>(detector: Arc<D>, shared: Arc<Shared>) -> anyhow::Result<()> {
    let _guard = RunningGuard(Arc::clone(&shared));

    while shared.is_active() {
        let changed = match detector.poll_changed_sources() {
            Ok(changed) => changed,
            Err(e) => {
                error!("Source detection failed: {:#}", e);
                return Err(e);
            }
        };

        if changed.is_empty() {
            continue;
        }

        info!(sources = ?sorted(&changed), "Detected input source change");
        shared.pending.append(changed, Instant::now());
    }

    debug!("Detector loop stopped");
    Ok(())
}

fn debounce_loop<R: Regenerate>(regenerate: R, shared: Arc<Shared>) {
    let _guard = RunningGuard(Arc::clone(&shared));
    let tick = shared.config.tick_interval();
    let window = shared.config.quiet_window();

    while shared.is_active() {
        thread::sleep(tick);

        // Lock is released before the callback runs
        let ready = shared.pending.drain_ready(Instant::now(), window);
        if let Some(sources) = ready {
            info!(sources = ?sorted(&sources), "Regenerating from source change");
            regenerate.regenerate(sources);
        }
    }

    debug!("Debounce loop stopped");
}

fn sorted(sources: &HashSet<SourceId>) -> Vec<&str> {
    let mut names: Vec<&str> = sources.iter().map(String::as_str).collect();
    names.sort_unstable();
    names
}
