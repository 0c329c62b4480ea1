use crate::error::{MacroError, Result};
use crate::toggle::{DebouncedToggle, PlaybackControl};
use global_hotkey::hotkey::HotKey;
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
#[cfg(not(windows))]
use tracing::info;

/// Shift+2, which types the `"` trigger on the layout this tool was built for.
pub const DEFAULT_TOGGLE_HOTKEY: &str = "shift+2";

/// Owns the toggle hotkey registration.
///
/// On Windows the hotkey is delivered as `WM_HOTKEY` to a hidden window that
/// belongs to the thread which created the [`GlobalHotKeyManager`], so the
/// manager is created on the listener thread and that thread pumps messages.
/// Elsewhere the manager is created by [`HotkeyListener::new`].
pub struct HotkeyListener {
    #[cfg(not(windows))]
    manager: GlobalHotKeyManager,
    hotkey: Option<HotKey>,
    shutdown: Arc<AtomicBool>,
}

impl HotkeyListener {
    pub fn new() -> Result<Self> {
        Ok(Self {
            #[cfg(not(windows))]
            manager: create_manager()?,
            hotkey: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Register `hotkey_str` as the toggle. On Windows this only validates
    /// the string; registration happens in [`HotkeyListener::spawn`].
    pub fn register(&mut self, hotkey_str: &str) -> Result<()> {
        let hotkey = parse_hotkey(hotkey_str)?;

        #[cfg(not(windows))]
        {
            self.manager.register(hotkey).map_err(|e| {
                MacroError::hotkey(format!("Failed to register hotkey '{}': {}", hotkey_str, e))
            })?;
            info!("Global toggle hotkey '{}' registered", hotkey_str);
        }

        self.hotkey = Some(hotkey);
        Ok(())
    }

    /// Forward presses of the registered hotkey to `toggle` from a blocking
    /// task until [`HotkeyListener::shutdown`] is called.
    pub fn spawn<C>(&self, toggle: Arc<DebouncedToggle<C>>) -> Result<tokio::task::JoinHandle<()>>
    where
        C: PlaybackControl + 'static,
    {
        let hotkey = self
            .hotkey
            .ok_or_else(|| MacroError::hotkey("no hotkey registered"))?;
        let shutdown = Arc::clone(&self.shutdown);

        #[cfg(windows)]
        {
            message_loop::spawn(hotkey, toggle, shutdown)
        }

        #[cfg(not(windows))]
        {
            Ok(tokio::task::spawn_blocking(move || {
                forward_events(hotkey.id(), &toggle, &shutdown, || {});
            }))
        }
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.shutdown();
        #[cfg(not(windows))]
        {
            if let Some(hotkey) = self.hotkey.take() {
                let _ = self.manager.unregister(hotkey);
            }
        }
    }
}

fn create_manager() -> Result<GlobalHotKeyManager> {
    GlobalHotKeyManager::new()
        .map_err(|e| MacroError::hotkey(format!("Failed to create GlobalHotKeyManager: {}", e)))
}

/// Poll hotkey events until `shutdown` is raised, calling `pump` before each
/// poll so the platform can deliver pending messages.
fn forward_events<C: PlaybackControl>(
    hotkey_id: u32,
    toggle: &DebouncedToggle<C>,
    shutdown: &AtomicBool,
    mut pump: impl FnMut(),
) {
    let receiver = GlobalHotKeyEvent::receiver();
    while !shutdown.load(Ordering::SeqCst) {
        pump();
        while let Ok(event) = receiver.try_recv() {
            if event.id == hotkey_id && event.state == HotKeyState::Pressed {
                debug!("Toggle hotkey pressed");
                toggle.on_hotkey_event();
            }
        }

        // Small sleep to prevent busy waiting
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
}

#[cfg(windows)]
mod message_loop {
    use super::{create_manager, forward_events};
    use crate::error::{MacroError, Result};
    use crate::toggle::{DebouncedToggle, PlaybackControl};
    use global_hotkey::hotkey::HotKey;
    use std::sync::atomic::AtomicBool;
    use std::sync::{mpsc, Arc};
    use tracing::{debug, info};
    use winapi::um::winuser::{DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE};

    /// Start the listener thread and block until it has registered `hotkey`.
    pub(super) fn spawn<C>(
        hotkey: HotKey,
        toggle: Arc<DebouncedToggle<C>>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<tokio::task::JoinHandle<()>>
    where
        C: PlaybackControl + 'static,
    {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);

        let task = tokio::task::spawn_blocking(move || {
            let registered = create_manager().and_then(|manager| {
                manager
                    .register(hotkey)
                    .map(|_| manager)
                    .map_err(|e| MacroError::hotkey(format!("Failed to register hotkey: {}", e)))
            });
            let manager = match registered {
                Ok(manager) => {
                    let _ = ready_tx.send(Ok(()));
                    manager
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            info!("Global toggle hotkey registered");

            forward_events(hotkey.id(), &toggle, &shutdown, pump_messages);

            if let Err(e) = manager.unregister(hotkey) {
                debug!("Unregistering the toggle hotkey failed: {}", e);
            }
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(task),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(MacroError::hotkey(
                "hotkey thread exited before registering the hotkey",
            )),
        }
    }

    fn pump_messages() {
        let mut msg: MSG = unsafe { std::mem::zeroed() };
        unsafe {
            while PeekMessageW(&mut msg, std::ptr::null_mut(), 0, 0, PM_REMOVE) != 0 {
                TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }
}

/// Parse a `modifier+key` string such as `shift+2` or `ctrl+alt+f8`.
pub fn parse_hotkey(hotkey_str: &str) -> Result<HotKey> {
    use global_hotkey::hotkey::Modifiers;

    let binding = hotkey_str.to_lowercase();
    let parts: Vec<&str> = binding.split('+').map(|s| s.trim()).collect();

    if parts.iter().all(|p| p.is_empty()) {
        return Err(MacroError::hotkey("Empty hotkey string"));
    }

    let mut modifiers = Modifiers::empty();
    let mut key_code = None;

    for part in &parts {
        match *part {
            "ctrl" | "control" => modifiers |= Modifiers::CONTROL,
            "alt" => modifiers |= Modifiers::ALT,
            "shift" => modifiers |= Modifiers::SHIFT,
            "meta" | "cmd" | "super" => modifiers |= Modifiers::SUPER,
            key => {
                if key_code.is_some() {
                    return Err(MacroError::hotkey(format!(
                        "Multiple keys specified in hotkey: {}",
                        hotkey_str
                    )));
                }
                key_code = Some(parse_key_code(key)?);
            }
        }
    }

    let code = key_code.ok_or_else(|| {
        MacroError::hotkey(format!("No key specified in hotkey: {}", hotkey_str))
    })?;

    let modifiers = if modifiers.is_empty() { None } else { Some(modifiers) };
    Ok(HotKey::new(modifiers, code))
}

fn parse_key_code(key: &str) -> Result<global_hotkey::hotkey::Code> {
    use global_hotkey::hotkey::Code;

    let code = match key {
        // Letters
        "a" => Code::KeyA,
        "b" => Code::KeyB,
        "c" => Code::KeyC,
        "d" => Code::KeyD,
        "e" => Code::KeyE,
        "f" => Code::KeyF,
        "g" => Code::KeyG,
        "h" => Code::KeyH,
        "i" => Code::KeyI,
        "j" => Code::KeyJ,
        "k" => Code::KeyK,
        "l" => Code::KeyL,
        "m" => Code::KeyM,
        "n" => Code::KeyN,
        "o" => Code::KeyO,
        "p" => Code::KeyP,
        "q" => Code::KeyQ,
        "r" => Code::KeyR,
        "s" => Code::KeyS,
        "t" => Code::KeyT,
        "u" => Code::KeyU,
        "v" => Code::KeyV,
        "w" => Code::KeyW,
        "x" => Code::KeyX,
        "y" => Code::KeyY,
        "z" => Code::KeyZ,

        // Numbers
        "0" => Code::Digit0,
        "1" => Code::Digit1,
        "2" => Code::Digit2,
        "3" => Code::Digit3,
        "4" => Code::Digit4,
        "5" => Code::Digit5,
        "6" => Code::Digit6,
        "7" => Code::Digit7,
        "8" => Code::Digit8,
        "9" => Code::Digit9,

        // Punctuation, including the US-layout home of '"'
        "'" | "quote" => Code::Quote,
        "`" | "backquote" => Code::Backquote,
        "-" | "minus" => Code::Minus,
        "=" | "equal" => Code::Equal,
        ";" | "semicolon" => Code::Semicolon,
        "," | "comma" => Code::Comma,
        "." | "period" => Code::Period,
        "/" | "slash" => Code::Slash,

        // Function keys
        "f1" => Code::F1,
        "f2" => Code::F2,
        "f3" => Code::F3,
        "f4" => Code::F4,
        "f5" => Code::F5,
        "f6" => Code::F6,
        "f7" => Code::F7,
        "f8" => Code::F8,
        "f9" => Code::F9,
        "f10" => Code::F10,
        "f11" => Code::F11,
        "f12" => Code::F12,

        // Special keys
        "space" => Code::Space,
        "enter" | "return" => Code::Enter,
        "tab" => Code::Tab,
        "escape" | "esc" => Code::Escape,
        "backspace" => Code::Backspace,
        "delete" => Code::Delete,
        "insert" => Code::Insert,
        "home" => Code::Home,
        "end" => Code::End,
        "pageup" => Code::PageUp,
        "pagedown" => Code::PageDown,
        "pause" => Code::Pause,

        // Arrow keys
        "up" | "arrowup" => Code::ArrowUp,
        "down" | "arrowdown" => Code::ArrowDown,
        "left" | "arrowleft" => Code::ArrowLeft,
        "right" | "arrowright" => Code::ArrowRight,

        _ => return Err(MacroError::hotkey(format!("Unsupported key: {}", key))),
    };

    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use global_hotkey::hotkey::{Code, Modifiers};
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_default_toggle_hotkey() {
        let hotkey = parse_hotkey(DEFAULT_TOGGLE_HOTKEY).unwrap();
        assert_eq!(hotkey, HotKey::new(Some(Modifiers::SHIFT), Code::Digit2));
    }

    #[test]
    fn test_modifier_combinations() {
        let hotkey = parse_hotkey("Ctrl + Alt + F8").unwrap();
        assert_eq!(
            hotkey,
            HotKey::new(Some(Modifiers::CONTROL | Modifiers::ALT), Code::F8)
        );

        let hotkey = parse_hotkey("shift+'").unwrap();
        assert_eq!(hotkey, HotKey::new(Some(Modifiers::SHIFT), Code::Quote));
    }

    #[test]
    fn test_bare_key() {
        let hotkey = parse_hotkey("pause").unwrap();
        assert_eq!(hotkey, HotKey::new(None, Code::Pause));
    }

    struct Counter(AtomicUsize);

    impl PlaybackControl for Counter {
        fn toggle(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_forward_events_pumps_until_shutdown() {
        let toggle = DebouncedToggle::new(Counter(AtomicUsize::new(0)));
        let shutdown = AtomicBool::new(false);
        let mut pumped = 0;

        forward_events(u32::MAX, &toggle, &shutdown, || {
            pumped += 1;
            if pumped == 3 {
                shutdown.store(true, Ordering::SeqCst);
            }
        });

        assert_eq!(pumped, 3);
        assert_eq!(toggle.control().0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_hotkeys() {
        assert!(parse_hotkey("").is_err());
        assert!(parse_hotkey("ctrl+shift").is_err());
        assert!(parse_hotkey("a+b").is_err());
        assert!(parse_hotkey("ctrl+hyper").is_err());
    }
}
