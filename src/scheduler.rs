//! Playback scheduler.
//!
//! Owns the Idle/Running lifecycle and the single run loop thread. The
//! state shared with the hotkey thread is three atomic flags:
//!
//! - `running`: the operator-visible on/off switch
//! - `cancel`: raised by [`Scheduler::stop`], observed by every wait
//! - `active`: a run loop thread exists (still true while it winds down)
//!
//! `start` refuses to launch while `active` is set, so there is never more
//! than one run loop even if the operator toggles faster than a hold can
//! be released.

use crate::config::{ConfigStore, MacroConfig};
use crate::driver::{perform, InputDriver};
use crate::notifier::{StatusEvent, StatusNotifier};
use crate::sleep::{sliced_sleep, Cancellation, CYCLE_PAUSE_MS};
use crate::toggle::PlaybackControl;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Externally observable playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Running,
    /// Stop was requested and the run loop has not exited yet.
    Stopping,
}

struct Shared {
    running: AtomicBool,
    cancel: AtomicBool,
    active: AtomicBool,
    completed_cycles: AtomicU64,
    config: Mutex<MacroConfig>,
    /// What this scheduler last loaded from or wrote to the primary file.
    synced: Mutex<Option<MacroConfig>>,
    store: ConfigStore,
    driver: Arc<dyn InputDriver>,
    notifier: Arc<dyn StatusNotifier>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Cancellation for Shared {
    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst) || !self.running.load(Ordering::SeqCst)
    }
}

impl Shared {
    fn persist(&self, config: &MacroConfig) {
        match self.store.save(config) {
            Ok(()) => *self.synced.lock() = Some(config.clone()),
            Err(e) => {
                warn!("{}", e);
                self.notifier.notify(StatusEvent::SaveFailed(e.to_string()));
            }
        }
    }

    /// Take over a save made by another process (e.g. `akp set-step` in a
    /// second terminal) since this scheduler last touched the file.
    fn adopt_external_edits(&self, config: &mut MacroConfig) {
        let mut synced = self.synced.lock();
        let Some(known) = synced.as_ref() else {
            return;
        };
        let Ok(on_disk) = ConfigStore::read(self.store.primary_path()) else {
            return;
        };
        if on_disk != *known {
            info!(
                "{} was changed elsewhere, reloading it",
                self.store.primary_path().display()
            );
            *config = on_disk.clone();
            *synced = Some(on_disk);
        }
    }

    /// Apply `f` to the config and save the result before the config lock
    /// is released, so saves land in the same order as the edits.
    fn update<R>(&self, f: impl FnOnce(&mut MacroConfig) -> R) -> (R, MacroConfig) {
        let mut config = self.config.lock();
        self.adopt_external_edits(&mut config);
        let result = f(&mut config);
        self.persist(&config);
        (result, config.clone())
    }

    fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        self.cancel.store(true, Ordering::SeqCst);
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.update(|_| ());

        info!(
            "Playback stopped after {} completed cycle(s)",
            self.completed_cycles.load(Ordering::SeqCst)
        );
        self.notifier.notify(StatusEvent::Stopped);
    }
}

/// Handle to the playback scheduler. Cheap to clone; all clones control
/// the same playback.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new(
        store: ConfigStore,
        config: MacroConfig,
        driver: Arc<dyn InputDriver>,
        notifier: Arc<dyn StatusNotifier>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                cancel: AtomicBool::new(false),
                active: AtomicBool::new(false),
                completed_cycles: AtomicU64::new(0),
                config: Mutex::new(config),
                synced: Mutex::new(None),
                store,
                driver,
                notifier,
                worker: Mutex::new(None),
            }),
        }
    }

    /// Build a scheduler around whatever `store` currently holds.
    pub fn from_store(
        store: ConfigStore,
        driver: Arc<dyn InputDriver>,
        notifier: Arc<dyn StatusNotifier>,
    ) -> Self {
        let config = store.load();
        let scheduler = Self::new(store, config.clone(), driver, notifier);
        *scheduler.shared.synced.lock() = Some(config);
        scheduler
    }

    /// Start playback of the current config. No-op while running or while a
    /// previous run is still stopping.
    ///
    /// The repeat count and hold durations are clamped in place, so the
    /// clamped values are what gets persisted and what later edits see.
    /// A newer file saved by another process replaces the in-memory config
    /// first.
    pub fn start(&self) {
        let shared = &self.shared;
        if shared.running.load(Ordering::SeqCst) {
            debug!("start ignored: already running");
            return;
        }
        if shared
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("start ignored: previous run is still stopping");
            shared.notifier.notify(StatusEvent::StillStopping);
            return;
        }

        let (_, snapshot) = shared.update(MacroConfig::clamp);

        let repeat_count = snapshot.repeat_count as u64;
        shared.completed_cycles.store(0, Ordering::SeqCst);
        shared.cancel.store(false, Ordering::SeqCst);
        shared.running.store(true, Ordering::SeqCst);

        info!(
            "Playback started ({} active step(s), repeat={})",
            snapshot.active_steps().count(),
            repeat_count
        );
        shared.notifier.notify(StatusEvent::Running { repeat_count });

        let worker_shared = Arc::clone(shared);
        let spawned = std::thread::Builder::new()
            .name("macro-playback".to_string())
            .spawn(move || run_loop(worker_shared, snapshot));

        match spawned {
            Ok(handle) => *shared.worker.lock() = Some(handle),
            Err(e) => {
                warn!("Could not spawn playback thread: {}", e);
                shared.stop();
                shared.active.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Request playback to stop. Returns without waiting for the run loop;
    /// it observes the request within one sleep slice.
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> PlaybackState {
        if self.shared.running.load(Ordering::SeqCst) {
            PlaybackState::Running
        } else if self.shared.active.load(Ordering::SeqCst) {
            PlaybackState::Stopping
        } else {
            PlaybackState::Idle
        }
    }

    /// Full cycles finished by the current (or last) run.
    pub fn completed_cycles(&self) -> u64 {
        self.shared.completed_cycles.load(Ordering::SeqCst)
    }

    /// Copy of the current config.
    pub fn config(&self) -> MacroConfig {
        self.shared.config.lock().clone()
    }

    /// Apply an edit to the config and persist it. Edits made while running
    /// take effect on the next start.
    pub fn edit<R>(&self, f: impl FnOnce(&mut MacroConfig) -> R) -> R {
        self.shared.update(f).0
    }

    /// Block until the current run loop, if any, has exited.
    pub fn wait(&self) {
        let handle = self.shared.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Playback thread panicked");
                self.shared.running.store(false, Ordering::SeqCst);
                self.shared.active.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Stop playback, wait for the run loop and flush the config.
    pub fn shutdown(&self) {
        self.stop();
        self.wait();
        self.shared.update(|_| ());
    }
}

impl PlaybackControl for Scheduler {
    fn toggle(&self) {
        if self.is_running() {
            self.stop();
        } else {
            self.start();
        }
    }
}

fn run_loop(shared: Arc<Shared>, config: MacroConfig) {
    let repeat_count = config.repeat_count as u64;
    let mut cycle: u64 = 0;

    while !shared.is_cancelled() && (repeat_count == 0 || cycle < repeat_count) {
        let mut aborted = false;
        for (index, step) in config.steps.iter().enumerate() {
            if shared.is_cancelled() {
                aborted = true;
                break;
            }
            if step.is_blank() {
                continue;
            }
            let Some(action) = step.action() else {
                debug!("Row {}: '{}' is not a known key, skipping", index + 1, step.token);
                continue;
            };

            let hold_ms = u64::try_from(step.hold_ms).unwrap_or(0);
            debug!("Row {}: {} for {}ms", index + 1, action, hold_ms);
            if perform(shared.driver.as_ref(), &action, hold_ms, shared.as_ref()) {
                aborted = true;
                break;
            }
        }
        if aborted {
            break;
        }

        cycle += 1;
        shared.completed_cycles.store(cycle, Ordering::SeqCst);
        if sliced_sleep(CYCLE_PAUSE_MS, shared.as_ref()) {
            break;
        }
    }

    shared.stop();
    shared.active.store(false, Ordering::SeqCst);
}
