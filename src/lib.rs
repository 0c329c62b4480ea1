//! # Autokeypad
//!
//! Replays a fixed ten-row macro of timed key and mouse presses, toggled on
//! and off by a debounced global hotkey. The last configured macro is kept on
//! disk with a backup copy, so a corrupt or half-written file never loses it.
//!
//! ## Features
//!
//! - Ten rows of `token` + hold duration, played in order
//! - Repeat N times, or forever with a repeat count of 0
//! - Stops within 50ms of a request, however long the current hold
//! - Global toggle hotkey with a 250ms debounce
//! - Backup-then-write persistence with corruption fallback
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use autokeypad::{ConfigStore, LogDriver, LogNotifier, Scheduler};
//!
//! let store = ConfigStore::at_home().unwrap();
//! let scheduler = Scheduler::from_store(store, Arc::new(LogDriver), Arc::new(LogNotifier));
//!
//! scheduler.edit(|config| {
//!     config.repeat_count = 3;
//!     config.set_step(0, "a", 100);
//!     config.set_step(1, "mouse.left", 0);
//! });
//! scheduler.start();
//! scheduler.wait();
//! ```
//!
//! ## Tokens
//!
//! Tokens are case-insensitive: any single character, `f1`-`f24`,
//! `enter`/`return`, `space`, `tab`, `esc`/`escape`, `backspace`,
//! `delete`/`del`, `home`, `end`, `pageup`/`page_up`, `pagedown`/`page_down`,
//! the arrow keys `up`/`down`/`left`/`right`, and `mouse.left`,
//! `mouse.right`, `mouse.middle`. Anything else is skipped.

pub mod config;
pub mod driver;
pub mod error;
pub mod global_hotkey;
pub mod notifier;
pub mod scheduler;
pub mod sleep;
pub mod toggle;
pub mod token;

pub use config::{ConfigStore, MacroConfig, MacroStep};
pub use driver::{InputDriver, LogDriver};
pub use error::{MacroError, Result};
pub use crate::global_hotkey::HotkeyListener;
pub use notifier::{ChannelNotifier, LogNotifier, StatusEvent, StatusNotifier};
pub use scheduler::{PlaybackState, Scheduler};
pub use toggle::{DebouncedToggle, PlaybackControl};
pub use token::{parse_token, ParsedAction};
