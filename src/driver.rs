//! Input drivers.
//!
//! The scheduler only ever talks to the [`InputDriver`] trait. [`LogDriver`]
//! is a dry-run backend; on Windows [`SendInputDriver`] injects real
//! keyboard and mouse events.

use crate::error::Result;
use crate::sleep::{sliced_sleep, Cancellation};
use crate::token::ParsedAction;
use tracing::{debug, info, warn};

/// Presses and releases resolved actions.
pub trait InputDriver: Send + Sync {
    fn press(&self, action: &ParsedAction) -> Result<()>;
    fn release(&self, action: &ParsedAction) -> Result<()>;
}

/// Press `action`, hold it for `hold_ms` (interruptibly) and release it.
///
/// Returns `true` if the hold was interrupted. Release is attempted on
/// every path, including after a failed press; a failed press skips the
/// hold and counts as no action.
pub fn perform<D, C>(driver: &D, action: &ParsedAction, hold_ms: u64, cancel: &C) -> bool
where
    D: InputDriver + ?Sized,
    C: Cancellation + ?Sized,
{
    let interrupted = match driver.press(action) {
        Ok(()) => sliced_sleep(hold_ms, cancel),
        Err(e) => {
            warn!("Press of {} failed: {}", action, e);
            false
        }
    };

    if let Err(e) = driver.release(action) {
        warn!("Release of {} failed: {}", action, e);
    }

    interrupted
}

/// Driver that only logs what it would do.
#[derive(Debug, Clone, Default)]
pub struct LogDriver;

impl InputDriver for LogDriver {
    fn press(&self, action: &ParsedAction) -> Result<()> {
        info!("press {}", action);
        Ok(())
    }

    fn release(&self, action: &ParsedAction) -> Result<()> {
        debug!("release {}", action);
        Ok(())
    }
}

/// The platform's real driver, or [`LogDriver`] where none exists.
pub fn platform_driver() -> Box<dyn InputDriver> {
    #[cfg(windows)]
    {
        Box::new(SendInputDriver::new())
    }

    #[cfg(not(windows))]
    {
        warn!("No input injection backend on this platform; falling back to dry-run");
        Box::new(LogDriver)
    }
}

/// A decoded `VkKeyScanW` result: the virtual key in the low byte and the
/// modifiers needed to type the character in the high byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyScan {
    pub vk: u16,
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl KeyScan {
    pub fn plain(vk: u16) -> Self {
        Self {
            vk,
            ..Default::default()
        }
    }

    /// `None` when no key on the active layout produces the character.
    pub fn decode(scan: i16) -> Option<Self> {
        if scan == -1 {
            return None;
        }
        let [vk, state] = (scan as u16).to_le_bytes();
        Some(Self {
            vk: u16::from(vk),
            shift: state & 0x01 != 0,
            ctrl: state & 0x02 != 0,
            alt: state & 0x04 != 0,
        })
    }
}

#[cfg(windows)]
pub use windows_impl::SendInputDriver;

#[cfg(windows)]
mod windows_impl {
    use super::{InputDriver, KeyScan};
    use crate::error::{MacroError, Result};
    use crate::token::{MouseButton, NamedKey, ParsedAction};
    use winapi::um::winuser::{
        SendInput, VkKeyScanW, INPUT, INPUT_KEYBOARD, INPUT_MOUSE, KEYEVENTF_KEYUP,
        MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP,
        MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP, VK_BACK, VK_DELETE, VK_DOWN, VK_END,
        VK_CONTROL, VK_ESCAPE, VK_F1, VK_HOME, VK_LEFT, VK_MENU, VK_NEXT, VK_PRIOR, VK_RETURN,
        VK_RIGHT, VK_SHIFT, VK_SPACE, VK_TAB, VK_UP,
    };

    /// Injects input through `SendInput`.
    #[derive(Debug, Clone, Default)]
    pub struct SendInputDriver;

    impl SendInputDriver {
        pub fn new() -> Self {
            Self
        }

        fn virtual_key(action: &ParsedAction) -> Result<KeyScan> {
            let vk = match action {
                ParsedAction::KeyAlias(key) => match key {
                    NamedKey::Enter => VK_RETURN,
                    NamedKey::Space => VK_SPACE,
                    NamedKey::Tab => VK_TAB,
                    NamedKey::Escape => VK_ESCAPE,
                    NamedKey::Backspace => VK_BACK,
                    NamedKey::Delete => VK_DELETE,
                    NamedKey::Home => VK_HOME,
                    NamedKey::End => VK_END,
                    NamedKey::PageUp => VK_PRIOR,
                    NamedKey::PageDown => VK_NEXT,
                    NamedKey::Up => VK_UP,
                    NamedKey::Down => VK_DOWN,
                    NamedKey::Left => VK_LEFT,
                    NamedKey::Right => VK_RIGHT,
                },
                // VK_F1..VK_F24 are contiguous
                ParsedAction::FunctionKey(n) => VK_F1 + i32::from(*n) - 1,
                ParsedAction::KeyChar(c) => {
                    let mut units = [0u16; 2];
                    let encoded = c.encode_utf16(&mut units);
                    if encoded.len() != 1 {
                        return Err(MacroError::driver(
                            action.to_string(),
                            "character is outside the basic multilingual plane",
                        ));
                    }
                    let scan = unsafe { VkKeyScanW(encoded[0]) };
                    return KeyScan::decode(scan).ok_or_else(|| {
                        MacroError::driver(
                            action.to_string(),
                            "no key produces this character on the active layout",
                        )
                    });
                }
                ParsedAction::MouseButton(_) => {
                    return Err(MacroError::driver(action.to_string(), "not a keyboard key"))
                }
            };
            Ok(KeyScan::plain(vk as u16))
        }

        fn key_input(vk: u16, key_up: bool) -> INPUT {
            let mut input: INPUT = unsafe { std::mem::zeroed() };
            input.type_ = INPUT_KEYBOARD;
            unsafe {
                let ki = input.u.ki_mut();
                ki.wVk = vk;
                ki.dwFlags = if key_up { KEYEVENTF_KEYUP } else { 0 };
            }
            input
        }

        /// Modifiers go down before the key and come up after it.
        fn send_key(action: &ParsedAction, key_up: bool) -> Result<()> {
            let scan = Self::virtual_key(action)?;
            let modifiers: Vec<u16> = [
                (scan.shift, VK_SHIFT),
                (scan.ctrl, VK_CONTROL),
                (scan.alt, VK_MENU),
            ]
            .into_iter()
            .filter(|(needed, _)| *needed)
            .map(|(_, vk)| vk as u16)
            .collect();

            let mut inputs = Vec::with_capacity(modifiers.len() + 1);
            if key_up {
                inputs.push(Self::key_input(scan.vk, true));
                inputs.extend(modifiers.iter().rev().map(|vk| Self::key_input(*vk, true)));
            } else {
                inputs.extend(modifiers.iter().map(|vk| Self::key_input(*vk, false)));
                inputs.push(Self::key_input(scan.vk, false));
            }
            Self::send(action, &mut inputs)
        }

        fn send_mouse(action: &ParsedAction, button: MouseButton, up: bool) -> Result<()> {
            let flags = match (button, up) {
                (MouseButton::Left, false) => MOUSEEVENTF_LEFTDOWN,
                (MouseButton::Left, true) => MOUSEEVENTF_LEFTUP,
                (MouseButton::Right, false) => MOUSEEVENTF_RIGHTDOWN,
                (MouseButton::Right, true) => MOUSEEVENTF_RIGHTUP,
                (MouseButton::Middle, false) => MOUSEEVENTF_MIDDLEDOWN,
                (MouseButton::Middle, true) => MOUSEEVENTF_MIDDLEUP,
            };
            let mut input: INPUT = unsafe { std::mem::zeroed() };
            input.type_ = INPUT_MOUSE;
            unsafe {
                input.u.mi_mut().dwFlags = flags;
            }
            Self::send(action, &mut [input])
        }

        fn send(action: &ParsedAction, inputs: &mut [INPUT]) -> Result<()> {
            let count = inputs.len() as u32;
            let sent = unsafe {
                SendInput(
                    count,
                    inputs.as_mut_ptr(),
                    std::mem::size_of::<INPUT>() as i32,
                )
            };
            if sent == count {
                Ok(())
            } else {
                Err(MacroError::driver(
                    action.to_string(),
                    "SendInput rejected the event (blocked by UIPI?)",
                ))
            }
        }

        fn dispatch(action: &ParsedAction, up: bool) -> Result<()> {
            match action {
                ParsedAction::MouseButton(button) => Self::send_mouse(action, *button, up),
                _ => Self::send_key(action, up),
            }
        }
    }

    impl InputDriver for SendInputDriver {
        fn press(&self, action: &ParsedAction) -> Result<()> {
            Self::dispatch(action, false)
        }

        fn release(&self, action: &ParsedAction) -> Result<()> {
            Self::dispatch(action, true)
        }
    }
}
