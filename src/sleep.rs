//! Interruptible waiting.
//!
//! Holds and inter-cycle pauses are split into slices of at most
//! [`SLICE_MS`]; the cancellation signal is checked between slices, so a
//! stop request is observed within one slice no matter how long the hold.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Upper bound on a single uninterrupted wait, in milliseconds.
pub const SLICE_MS: u64 = 50;

/// Pause between two repeat cycles, in milliseconds.
pub const CYCLE_PAUSE_MS: u64 = 200;

/// Something a wait can be cancelled by.
pub trait Cancellation {
    fn is_cancelled(&self) -> bool;
}

impl Cancellation for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::SeqCst)
    }
}

impl<C: Cancellation + ?Sized> Cancellation for &C {
    fn is_cancelled(&self) -> bool {
        (**self).is_cancelled()
    }
}

impl<C: Cancellation + ?Sized> Cancellation for std::sync::Arc<C> {
    fn is_cancelled(&self) -> bool {
        (**self).is_cancelled()
    }
}

/// Sleep for `total_ms` milliseconds in slices, returning `true` if the
/// wait was cut short by `cancel`.
///
/// The signal is checked before every slice and once more after the last
/// one. An uncancelled call always waits at least `total_ms`.
pub fn sliced_sleep<C: Cancellation + ?Sized>(total_ms: u64, cancel: &C) -> bool {
    let deadline = Instant::now() + Duration::from_millis(total_ms);
    loop {
        if cancel.is_cancelled() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        let chunk = (deadline - now).min(Duration::from_millis(SLICE_MS));
        std::thread::sleep(chunk);
    }
}
