//! Status notifications for whatever front end is attached.

use std::fmt;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A playback state change or status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// Playback started. A `repeat_count` of 0 repeats until stopped.
    Running { repeat_count: u64 },
    Stopped,
    /// A start was ignored because the previous run is still releasing its
    /// last key.
    StillStopping,
    /// The macro could not be written to disk; playback is unaffected.
    SaveFailed(String),
}

impl StatusEvent {
    pub fn is_running(&self) -> bool {
        matches!(self, StatusEvent::Running { .. })
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::Running { repeat_count: 0 } => write!(f, "Running (repeat=infinite)"),
            StatusEvent::Running { repeat_count } => write!(f, "Running (repeat={})", repeat_count),
            StatusEvent::Stopped => write!(f, "Stopped"),
            StatusEvent::StillStopping => write!(f, "Still stopping, press again"),
            StatusEvent::SaveFailed(reason) => write!(f, "Save failed: {}", reason),
        }
    }
}

/// Receives status events. Called from the caller's thread and from the
/// playback thread, so implementations must not block.
pub trait StatusNotifier: Send + Sync {
    fn notify(&self, event: StatusEvent);
}

/// Forwards events over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl StatusNotifier for ChannelNotifier {
    fn notify(&self, event: StatusEvent) {
        if let Err(e) = self.sender.send(event) {
            warn!("Status receiver is gone, dropping {}", e.0);
        }
    }
}

/// Writes events to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl StatusNotifier for LogNotifier {
    fn notify(&self, event: StatusEvent) {
        info!("{}", event);
    }
}
