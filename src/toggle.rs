//! Debounced hotkey toggle.
//!
//! Global hotkey backends tend to deliver auto-repeat and duplicate
//! presses. [`DebouncedToggle`] accepts at most one trigger per
//! [`DEBOUNCE_MS`] window and flips playback for each accepted one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Minimum time between two accepted triggers, in milliseconds.
pub const DEBOUNCE_MS: u64 = 250;

const NEVER_TRIGGERED: u64 = u64::MAX;

/// Something that can be flipped between running and stopped.
pub trait PlaybackControl: Send + Sync {
    fn toggle(&self);
}

impl<T: PlaybackControl + ?Sized> PlaybackControl for Arc<T> {
    fn toggle(&self) {
        (**self).toggle()
    }
}

/// Turns raw hotkey presses into at most one toggle per debounce window.
///
/// Safe to share between threads: the last-trigger timestamp is claimed
/// with a compare-and-swap, so concurrent deliveries of the same press
/// produce exactly one toggle.
pub struct DebouncedToggle<C> {
    control: C,
    window_ms: u64,
    epoch: Instant,
    last_trigger_ms: AtomicU64,
}

impl<C: PlaybackControl> DebouncedToggle<C> {
    pub fn new(control: C) -> Self {
        Self::with_window(control, DEBOUNCE_MS)
    }

    pub fn with_window(control: C, window_ms: u64) -> Self {
        Self {
            control,
            window_ms,
            epoch: Instant::now(),
            last_trigger_ms: AtomicU64::new(NEVER_TRIGGERED),
        }
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    /// Handle a hotkey press happening now. Returns whether it toggled.
    pub fn on_hotkey_event(&self) -> bool {
        let now_ms = self.epoch.elapsed().as_millis() as u64;
        self.on_hotkey_event_at(now_ms)
    }

    /// Handle a hotkey press at `now_ms` on this toggle's clock.
    pub fn on_hotkey_event_at(&self, now_ms: u64) -> bool {
        let mut last = self.last_trigger_ms.load(Ordering::SeqCst);
        loop {
            if last != NEVER_TRIGGERED && now_ms.saturating_sub(last) < self.window_ms {
                debug!("Hotkey ignored ({}ms since last trigger)", now_ms.saturating_sub(last));
                return false;
            }
            match self.last_trigger_ms.compare_exchange(
                last,
                now_ms,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(current) => last = current,
            }
        }

        self.control.toggle();
        true
    }
}
