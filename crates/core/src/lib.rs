//! # cel7-core
//!
//! Core of the cel7 fantasy console: a small memory-mapped machine whose
//! character-cell display, palette and font are driven by Lua or Rhai
//! scripts through named callbacks.
//!
//! ## Architecture
//!
//! - [`Console`] - Top-level console wiring state, script engine and modes
//! - [`memory`] - Normal and Rom banks with the fixed region layout below
//! - [`display`] - Character-cell renderer (RGBA8888 output)
//! - [`api`] - Scripted I/O primitives shared by both front-ends
//! - [`script`] - `ScriptEngine` trait with Lua (`mlua`) and Rhai engines
//! - [`mode`] - Start / Setup / Normal / Error state machine
//! - [`loader`] - Script source from a file or an appended payload
//! - [`input`] - Host input events and their callbacks
//! - [`capture`] - Ring buffer of rendered frames
//! - [`png`] - Screenshot encoder
//!
//! ## Callbacks
//!
//! The host calls `init` once per mode entry, then `step` on every tick,
//! plus `keydown`, `keyup`, `text`, `mouse` and `resize` for input. Names are
//! prefixed with the active mode's namespace (`__start_`, `__setup_`,
//! `__error_`, none in Normal mode). Undefined callbacks are skipped; a
//! callback that raises moves the console to Error mode.

pub mod api;
pub mod capture;
pub mod config;
pub mod console;
pub mod display;
pub mod error;
pub mod font;
pub mod input;
pub mod loader;
pub mod memory;
pub mod mode;
pub mod png;
pub mod script;
pub mod state;

pub use config::Config;
pub use console::{CallOutcome, Console};
pub use error::Error;
pub use input::InputEvent;
pub use memory::{Bank, Memory};
pub use mode::Mode;
pub use script::{Arg, Frontend};

/// Size of each memory bank: 64 KB
pub const MEMORY_SIZE: usize = 0x10000;

/// Palette: 16 entries × 4 bytes
pub const PALETTE_START: usize = 0x4000;
pub const PALETTE_SIZE: usize = 16 * 4;

/// Glyph cell width in pixels
pub const FONT_WIDTH: usize = 8;
/// Glyph cell height in pixels
pub const FONT_HEIGHT: usize = 8;
/// First printable code with a glyph (space)
pub const FIRST_GLYPH: u8 = 32;
/// Last printable code with a glyph (`~`)
pub const LAST_GLYPH: u8 = 126;
pub const GLYPH_COUNT: usize = (LAST_GLYPH - FIRST_GLYPH) as usize + 1;
/// Drawn for codes outside FIRST_GLYPH..=LAST_GLYPH
pub const FONT_FALLBACK_GLYPH: u8 = b'?';

/// Font: one byte per pixel (0/1)
pub const FONT_START: usize = PALETTE_START + PALETTE_SIZE;
pub const FONT_SIZE: usize = GLYPH_COUNT * FONT_WIDTH * FONT_HEIGHT;

/// Largest grid width in cells
pub const MAX_WIDTH: usize = 128;
/// Largest grid height in cells
pub const MAX_HEIGHT: usize = 128;

/// Display: 2 bytes per cell (glyph, color)
pub const DISPLAY_START: usize = 0x5800;
pub const DISPLAY_SIZE: usize = MAX_WIDTH * MAX_HEIGHT * 2;

// Region table: ordered, non-overlapping, strictly inside a bank
const _: () = {
    assert!(PALETTE_START + PALETTE_SIZE <= FONT_START);
    assert!(FONT_START + FONT_SIZE <= DISPLAY_START);
    assert!(DISPLAY_START + DISPLAY_SIZE < MEMORY_SIZE);
    assert!(FONT_FALLBACK_GLYPH >= FIRST_GLYPH && FONT_FALLBACK_GLYPH <= LAST_GLYPH);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_layout() {
        assert_eq!(FONT_START, 0x4040);
        assert_eq!(FONT_SIZE, 6080);
        assert_eq!(FONT_START + FONT_SIZE, DISPLAY_START);
        assert_eq!(GLYPH_COUNT, 95);
        assert_eq!(DISPLAY_START + DISPLAY_SIZE, 0xD800);
    }
}
