//! Host input events and the callbacks they map to.

use crate::script::Arg;

/// Key names passed to `keydown`/`keyup`.
pub const KEY_NAMES: &[&str] = &[
    "escape", "enter", "up", "down", "left", "right", "f1", "f2", "space", "backspace", "tab",
];

/// Name reported for keys outside the known set.
pub const UNKNOWN_KEY: &str = "unknown";

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Quit,
    KeyDown(String),
    KeyUp(String),
    Text(String),
    /// Coordinates in cells (fractional)
    MouseMotion { x: f32, y: f32 },
    MouseDown { button: String, clicks: u32, x: f32, y: f32 },
    MouseWheel { delta: f32, x: f32, y: f32 },
    Resize { w: u32, h: u32 },
}

/// What the console does with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Quit,
    Callback(&'static str, Vec<Arg>),
}

impl InputEvent {
    pub fn action(&self) -> Action {
        match self {
            InputEvent::Quit => Action::Quit,
            InputEvent::KeyDown(k) => Action::Callback("keydown", vec![Arg::Str(k.clone())]),
            InputEvent::KeyUp(k) if k == "escape" => Action::Quit,
            InputEvent::KeyUp(k) => Action::Callback("keyup", vec![Arg::Str(k.clone())]),
            InputEvent::Text(s) => Action::Callback("text", vec![Arg::Str(s.clone())]),
            InputEvent::MouseMotion { x, y } => Action::Callback(
                "mouse",
                vec![Arg::from("motion"), Arg::Num(1.0), Arg::Num(*x), Arg::Num(*y)],
            ),
            InputEvent::MouseDown { button, clicks, x, y } => Action::Callback(
                "mouse",
                vec![Arg::Str(button.clone()), Arg::Num(*clicks as f32), Arg::Num(*x), Arg::Num(*y)],
            ),
            InputEvent::MouseWheel { delta, x, y } => Action::Callback(
                "mouse",
                vec![Arg::from("wheel"), Arg::Num(*delta), Arg::Num(*x), Arg::Num(*y)],
            ),
            InputEvent::Resize { w, h } => {
                Action::Callback("resize", vec![Arg::Num(*w as f32), Arg::Num(*h as f32)])
            }
        }
    }
}

/// Normalize a host key name: known names and `a`–`z`/`0`–`9` pass
/// through (lowercased), anything else becomes `"unknown"`.
pub fn key_name(raw: &str) -> &'static str {
    let lower = raw.to_ascii_lowercase();
    if let Some(&known) = KEY_NAMES.iter().find(|&&k| k == lower) {
        return known;
    }
    match lower.as_bytes() {
        [c @ b'a'..=b'z'] => ALPHA[(c - b'a') as usize],
        [c @ b'0'..=b'9'] => DIGITS[(c - b'0') as usize],
        _ => UNKNOWN_KEY,
    }
}

const ALPHA: [&str; 26] = [
    "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o", "p", "q", "r", "s",
    "t", "u", "v", "w", "x", "y", "z",
];

const DIGITS: [&str; 10] = ["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"];

/// Convert a window pixel position to cell coordinates for a `grid` of
/// cells stretched over a window of `window` pixels.
pub fn to_cells(px: f32, py: f32, window: (usize, usize), grid: (usize, usize)) -> (f32, f32) {
    let (ww, wh) = (window.0.max(1) as f32, window.1.max(1) as f32);
    (px * grid.0 as f32 / ww, py * grid.1 as f32 / wh)
}
