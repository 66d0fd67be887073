//! Desktop access for the UI-automation channel.
//!
//! The `Desktop` trait is the only place that touches the window manager or
//! produces input events. Without the `desktop` feature the headless
//! implementation is used, which sees no windows.

use anyhow::Result;
use std::time::Duration;

/// A top-level window as seen by the window manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub id: u32,
    pub title: String,
    pub app_name: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl WindowInfo {
    /// Horizontally centred, just inside the title bar.
    pub fn title_bar_point(&self) -> (i32, i32) {
        (self.x + (self.width / 2) as i32, self.y + 10)
    }

    pub fn title_matches(&self, needle: &str) -> bool {
        let needle = needle.trim().to_lowercase();
        !needle.is_empty() && self.title.to_lowercase().contains(&needle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyName {
    Control,
    Shift,
    Alt,
    Meta,
    Enter,
    Delete,
    Escape,
    Tab,
    Char(char),
}

impl KeyName {
    pub fn parse(name: &str) -> Option<Self> {
        let lower = name.trim().to_lowercase();
        let key = match lower.as_str() {
            "ctrl" | "control" => KeyName::Control,
            "shift" => KeyName::Shift,
            "alt" | "option" => KeyName::Alt,
            "meta" | "cmd" | "command" | "super" | "win" => KeyName::Meta,
            "enter" | "return" => KeyName::Enter,
            "delete" | "del" => KeyName::Delete,
            "escape" | "esc" => KeyName::Escape,
            "tab" => KeyName::Tab,
            _ => {
                let mut chars = lower.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => KeyName::Char(c),
                    _ => return None,
                }
            }
        };
        Some(key)
    }

    /// Parse a chord such as `ctrl+shift+l`.
    pub fn parse_chord(chord: &str) -> Option<Vec<Self>> {
        let keys: Option<Vec<_>> = chord.split('+').map(Self::parse).collect();
        keys.filter(|k| !k.is_empty())
    }
}

/// One step of an input script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputStep {
    /// Press all keys in order, release in reverse.
    Chord(Vec<KeyName>),
    Press(KeyName),
    Type(String),
    Click { x: i32, y: i32 },
    Wait(Duration),
}

/// Window lookup, focus, synthetic input and clipboard read-back.
///
/// Methods are blocking; callers run them on a blocking thread.
pub trait Desktop: Send + Sync {
    fn windows(&self) -> Result<Vec<WindowInfo>>;

    fn focus(&self, window: &WindowInfo) -> Result<()>;

    fn send(&self, step: &InputStep) -> Result<()>;

    fn read_clipboard(&self) -> Result<Option<String>>;
}

/// Desktop without a display: no windows, no input.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessDesktop;

impl Desktop for HeadlessDesktop {
    fn windows(&self) -> Result<Vec<WindowInfo>> {
        Ok(Vec::new())
    }

    fn focus(&self, _window: &WindowInfo) -> Result<()> {
        Err(anyhow::anyhow!("no display available"))
    }

    fn send(&self, _step: &InputStep) -> Result<()> {
        Err(anyhow::anyhow!("no display available"))
    }

    fn read_clipboard(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// The best desktop for this build.
pub fn default_desktop() -> std::sync::Arc<dyn Desktop> {
    #[cfg(feature = "desktop")]
    {
        match native::NativeDesktop::new() {
            Ok(desktop) => return std::sync::Arc::new(desktop),
            Err(e) => tracing::warn!("native desktop unavailable, using headless: {}", e),
        }
    }
    std::sync::Arc::new(HeadlessDesktop)
}

#[cfg(feature = "desktop")]
pub mod native {
    //! Real desktop: xcap for window enumeration, enigo for input, arboard for the clipboard.

    use super::{Desktop, InputStep, KeyName, WindowInfo};
    use anyhow::{anyhow, Result};
    use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
    use std::sync::Mutex;

    pub struct NativeDesktop {
        enigo: Mutex<Enigo>,
    }

    impl NativeDesktop {
        pub fn new() -> Result<Self> {
            let enigo = Enigo::new(&Settings::default())
                .map_err(|e| anyhow!("failed to initialize input backend: {:?}", e))?;
            Ok(Self {
                enigo: Mutex::new(enigo),
            })
        }

        fn map_key(key: KeyName) -> Key {
            match key {
                KeyName::Control => Key::Control,
                KeyName::Shift => Key::Shift,
                KeyName::Alt => Key::Alt,
                KeyName::Meta => Key::Meta,
                KeyName::Enter => Key::Return,
                KeyName::Delete => Key::Delete,
                KeyName::Escape => Key::Escape,
                KeyName::Tab => Key::Tab,
                KeyName::Char(c) => Key::Unicode(c),
            }
        }
    }

    impl Desktop for NativeDesktop {
        fn windows(&self) -> Result<Vec<WindowInfo>> {
            let windows = xcap::Window::all().map_err(|e| anyhow!("window enumeration failed: {}", e))?;
            Ok(windows
                .iter()
                .filter(|w| !w.is_minimized())
                .map(|w| WindowInfo {
                    id: w.id(),
                    title: w.title().to_string(),
                    app_name: w.app_name().to_string(),
                    x: w.x(),
                    y: w.y(),
                    width: w.width(),
                    height: w.height(),
                })
                .collect())
        }

        fn focus(&self, window: &WindowInfo) -> Result<()> {
            // Clicking the title bar area raises and focuses the window on all supported platforms.
            let (x, y) = window.title_bar_point();
            self.send(&InputStep::Click { x, y })
        }

        fn send(&self, step: &InputStep) -> Result<()> {
            let mut enigo = self.enigo.lock().map_err(|_| anyhow!("input backend lock poisoned"))?;
            match step {
                InputStep::Chord(keys) => {
                    for key in keys {
                        enigo
                            .key(Self::map_key(*key), Direction::Press)
                            .map_err(|e| anyhow!("key press failed: {:?}", e))?;
                    }
                    for key in keys.iter().rev() {
                        enigo
                            .key(Self::map_key(*key), Direction::Release)
                            .map_err(|e| anyhow!("key release failed: {:?}", e))?;
                    }
                }
                InputStep::Press(key) => {
                    enigo
                        .key(Self::map_key(*key), Direction::Click)
                        .map_err(|e| anyhow!("key press failed: {:?}", e))?;
                }
                InputStep::Type(text) => {
                    enigo.text(text).map_err(|e| anyhow!("typing failed: {:?}", e))?;
                }
                InputStep::Click { x, y } => {
                    enigo
                        .move_mouse(*x, *y, Coordinate::Abs)
                        .map_err(|e| anyhow!("mouse move failed: {:?}", e))?;
                    enigo
                        .button(Button::Left, Direction::Click)
                        .map_err(|e| anyhow!("click failed: {:?}", e))?;
                }
                InputStep::Wait(delay) => std::thread::sleep(*delay),
            }
            Ok(())
        }

        fn read_clipboard(&self) -> Result<Option<String>> {
            let mut clipboard =
                arboard::Clipboard::new().map_err(|e| anyhow!("clipboard init failed: {}", e))?;
            match clipboard.get_text() {
                Ok(text) if !text.trim().is_empty() => Ok(Some(text)),
                Ok(_) => Ok(None),
                Err(arboard::Error::ContentNotAvailable) => Ok(None),
                Err(e) => Err(anyhow!("clipboard read failed: {}", e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hotkey_chords() {
        assert_eq!(
            KeyName::parse_chord("ctrl+l"),
            Some(vec![KeyName::Control, KeyName::Char('l')])
        );
        assert_eq!(
            KeyName::parse_chord("Cmd+Shift+P"),
            Some(vec![KeyName::Meta, KeyName::Shift, KeyName::Char('p')])
        );
        assert_eq!(KeyName::parse_chord("ctrl+unknownkey"), None);
        assert_eq!(KeyName::parse_chord(""), None);
    }

    #[test]
    fn title_match_is_case_insensitive_substring() {
        let window = WindowInfo {
            id: 1,
            title: "app.py - project - Cursor".into(),
            app_name: "Cursor".into(),
            x: 0,
            y: 0,
            width: 800,
            height: 600,
        };
        assert!(window.title_matches("cursor"));
        assert!(!window.title_matches("vim"));
        assert!(!window.title_matches("   "));
        assert_eq!(window.title_bar_point(), (400, 10));
    }

    #[test]
    fn headless_desktop_has_no_windows() {
        let desktop = HeadlessDesktop;
        assert!(desktop.windows().unwrap().is_empty());
        assert!(desktop.send(&InputStep::Press(KeyName::Enter)).is_err());
    }
}
