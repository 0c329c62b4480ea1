//! Step token grammar.
//!
//! A step token is a short, case-insensitive name such as `a`, `enter`,
//! `f5` or `mouse.left`. [`parse_token`] turns it into a [`ParsedAction`]
//! the input driver can dispatch on. Unknown tokens are not errors at
//! playback time, they simply produce no action.

use crate::error::{MacroError, Result};
use std::fmt;
use std::str::FromStr;

/// Highest function key number accepted (`f24`).
pub const MAX_FUNCTION_KEY: u8 = 24;

/// Named, non-character keys reachable through an alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedKey {
    Enter,
    Space,
    Tab,
    Escape,
    Backspace,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
}

impl NamedKey {
    /// Canonical lowercase name of the key.
    pub fn name(self) -> &'static str {
        match self {
            NamedKey::Enter => "enter",
            NamedKey::Space => "space",
            NamedKey::Tab => "tab",
            NamedKey::Escape => "esc",
            NamedKey::Backspace => "backspace",
            NamedKey::Delete => "delete",
            NamedKey::Home => "home",
            NamedKey::End => "end",
            NamedKey::PageUp => "page_up",
            NamedKey::PageDown => "page_down",
            NamedKey::Up => "up",
            NamedKey::Down => "down",
            NamedKey::Left => "left",
            NamedKey::Right => "right",
        }
    }

    fn from_alias(alias: &str) -> Option<Self> {
        let key = match alias {
            "enter" | "return" => NamedKey::Enter,
            "space" => NamedKey::Space,
            "tab" => NamedKey::Tab,
            "esc" | "escape" => NamedKey::Escape,
            "backspace" => NamedKey::Backspace,
            "delete" | "del" => NamedKey::Delete,
            "home" => NamedKey::Home,
            "end" => NamedKey::End,
            "pageup" | "page_up" => NamedKey::PageUp,
            "pagedown" | "page_down" => NamedKey::PageDown,
            "up" => NamedKey::Up,
            "down" => NamedKey::Down,
            "left" => NamedKey::Left,
            "right" => NamedKey::Right,
            _ => return None,
        };
        Some(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn name(self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

/// A resolved input action, ready for the input driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParsedAction {
    KeyAlias(NamedKey),
    KeyChar(char),
    /// Function key number, always within `1..=24`.
    FunctionKey(u8),
    MouseButton(MouseButton),
}

impl fmt::Display for ParsedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsedAction::KeyAlias(key) => write!(f, "{}", key.name()),
            ParsedAction::KeyChar(c) => write!(f, "'{}'", c),
            ParsedAction::FunctionKey(n) => write!(f, "f{}", n),
            ParsedAction::MouseButton(button) => write!(f, "mouse.{}", button.name()),
        }
    }
}

/// Trim and lowercase a raw token.
pub fn normalize(token: &str) -> String {
    token.trim().to_lowercase()
}

/// Resolve a step token. Returns `None` for blank or unrecognised tokens.
pub fn parse_token(token: &str) -> Option<ParsedAction> {
    let t = normalize(token);
    if t.is_empty() {
        return None;
    }

    if let Some(digits) = t.strip_prefix('f') {
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(n) = digits.parse::<u8>() {
                if (1..=MAX_FUNCTION_KEY).contains(&n) {
                    return Some(ParsedAction::FunctionKey(n));
                }
            }
        }
    }

    if let Some(key) = NamedKey::from_alias(&t) {
        return Some(ParsedAction::KeyAlias(key));
    }

    let mut chars = t.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Some(ParsedAction::KeyChar(c));
    }

    match t.as_str() {
        "mouse.left" => Some(ParsedAction::MouseButton(MouseButton::Left)),
        "mouse.right" => Some(ParsedAction::MouseButton(MouseButton::Right)),
        "mouse.middle" => Some(ParsedAction::MouseButton(MouseButton::Middle)),
        _ => None,
    }
}

impl FromStr for ParsedAction {
    type Err = MacroError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(MacroError::invalid_token(s, "token is blank"));
        }
        parse_token(s).ok_or_else(|| {
            MacroError::invalid_token(
                s,
                "expected a single character, f1-f24, a key alias or mouse.left/right/middle",
            )
        })
    }
}
