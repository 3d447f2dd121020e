//! Console state shared by the host loop and every scripted primitive.
//!
//! One explicit struct holds what the scripts can touch: both memory banks,
//! the active bank selector, the current drawing color, the configuration,
//! the quit flag and the RNG. The [`crate::api`] table forwards script
//! arguments to the methods below.

use crate::api::ApiError;
use crate::config::Config;
use crate::memory::{Access, Bank, Memory};
use crate::DISPLAY_START;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Color byte used for the error banner (fg 2 on bg 9).
const BANNER_COLOR: u8 = 0x92;

pub struct ConsoleState {
    pub memory: Memory,
    /// Bank targeted by scripted reads and writes
    pub bank: Bank,
    /// Packed color byte written by `put`/`fill` (low nibble fg, high nibble bg)
    pub color: u8,
    pub config: Config,
    /// Set by the `quit` primitive or a host quit event
    pub quit: bool,
    rng: StdRng,
}

impl ConsoleState {
    pub fn new(config: Config) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic RNG for tests and replays.
    pub fn with_seed(config: Config, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: Config, rng: StdRng) -> Self {
        ConsoleState {
            memory: Memory::new(),
            bank: Bank::Normal,
            color: 1,
            config,
            quit: false,
            rng,
        }
    }

    // --- Arithmetic ---

    /// Integer division truncating toward zero.
    pub fn divide(a: i64, b: i64) -> Result<i64, ApiError> {
        if b == 0 {
            return Err(ApiError::DivideByZero { op: "idiv" });
        }
        a.checked_div(b).ok_or(ApiError::ValueOutOfRange { op: "idiv", value: a as f64 })
    }

    /// Remainder with the sign of the dividend.
    pub fn modulus(a: i64, b: i64) -> Result<i64, ApiError> {
        if b == 0 {
            return Err(ApiError::DivideByZero { op: "imod" });
        }
        a.checked_rem(b).ok_or(ApiError::ValueOutOfRange { op: "imod", value: a as f64 })
    }

    /// Uniform integer in `[0, n)`.
    pub fn random(&mut self, n: i64) -> Result<i64, ApiError> {
        if n <= 0 {
            return Err(ApiError::ValueOutOfRange { op: "rand", value: n as f64 });
        }
        Ok(self.rng.gen_range(0..n))
    }

    // --- Memory ---

    pub fn poke(&mut self, addr: usize, bytes: &[u8]) -> Result<(), ApiError> {
        self.memory.write(self.bank, addr, bytes)?;
        Ok(())
    }

    pub fn peek(&self, addr: usize, size: usize) -> Result<Vec<u8>, ApiError> {
        Ok(self.memory.read(self.bank, addr, size)?.to_vec())
    }

    pub fn select_bank(&mut self, n: i64) -> Result<(), ApiError> {
        self.bank = Bank::from_number(n)
            .ok_or(ApiError::ValueOutOfRange { op: "bank", value: n as f64 })?;
        Ok(())
    }

    // --- Display ---

    pub fn set_color(&mut self, c: i64) -> Result<(), ApiError> {
        self.color = u8::try_from(c).map_err(|_| ApiError::ValueOutOfRange { op: "color", value: c as f64 })?;
        Ok(())
    }

    #[inline(always)]
    fn cell_addr(&self, x: usize, y: usize) -> usize {
        DISPLAY_START + (y * self.config.width + x) * 2
    }

    fn check_row(&self, x: i64, y: i64) -> Result<usize, ApiError> {
        if y < 0 || y as usize >= self.config.height {
            return Err(ApiError::CellOutOfRange {
                x,
                y,
                width: self.config.width,
                height: self.config.height,
            });
        }
        Ok(y as usize)
    }

    /// Write `text` into successive cells of row `y` from column `x`,
    /// clipped at the grid width.
    pub fn put(&mut self, x: i64, y: i64, text: &[u8]) -> Result<(), ApiError> {
        let y = self.check_row(x, y)?;
        let width = self.config.width as i64;
        for (i, &ch) in text.iter().enumerate() {
            let cx = x + i as i64;
            if cx >= width {
                break;
            }
            if cx < 0 {
                continue;
            }
            let addr = self.cell_addr(cx as usize, y);
            self.memory.write(self.bank, addr, &[ch, self.color])?;
        }
        Ok(())
    }

    /// Glyph byte of cell (x, y).
    pub fn get(&self, x: i64, y: i64) -> Result<u8, ApiError> {
        let row = self.check_row(x, y)?;
        if x < 0 || x as usize >= self.config.width {
            return Err(ApiError::CellOutOfRange {
                x,
                y,
                width: self.config.width,
                height: self.config.height,
            });
        }
        let addr = self.cell_addr(x as usize, row);
        Ok(self.memory.read_byte(self.bank, addr)?)
    }

    /// Fill a rectangle (clipped to the grid) with one character in the
    /// current color.
    pub fn fill(&mut self, x: i64, y: i64, w: i64, h: i64, ch: &[u8]) -> Result<(), ApiError> {
        if ch.len() != 1 {
            return Err(ApiError::FillChar { len: ch.len() });
        }
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = x.saturating_add(w).min(self.config.width as i64);
        let y1 = y.saturating_add(h).min(self.config.height as i64);
        if x0 >= x1 || y0 >= y1 {
            return Ok(());
        }
        let first = self.cell_addr(x0 as usize, y0 as usize);
        let last = self.cell_addr(x1 as usize - 1, y1 as usize - 1);
        self.memory.check(self.bank, first, last + 2 - first, Access::Write)?;

        let cell = [ch[0], self.color];
        for dy in y0..y1 {
            for dx in x0..x1 {
                let addr = self.cell_addr(dx as usize, dy as usize);
                self.memory.write(self.bank, addr, &cell)?;
            }
        }
        Ok(())
    }

    /// Paint an error banner over the Normal bank display.
    ///
    /// Bypasses the active bank and current color; used when the console
    /// enters Error mode.
    pub fn paint_banner(&mut self, message: &str) {
        let (width, height) = (self.config.width, self.config.height);
        let mut lines: Vec<Vec<u8>> = vec![b"error:".to_vec()];
        for word_line in message.lines() {
            for chunk in word_line.as_bytes().chunks(width.max(1)) {
                lines.push(chunk.to_vec());
            }
        }
        for y in 0..height {
            let line = lines.get(y).map(|l| l.as_slice()).unwrap_or(&[]);
            for x in 0..width {
                let ch = line.get(x).copied().unwrap_or(b' ');
                let addr = self.cell_addr(x, y);
                // Grid is validated to fit the display region
                let _ = self.memory.write(Bank::Normal, addr, &[ch, BANNER_COLOR]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::AccessError;

    fn state() -> ConsoleState {
        ConsoleState::with_seed(Config::default(), 7)
    }

    #[test]
    fn test_divide_truncates() {
        assert_eq!(ConsoleState::divide(7, 2), Ok(3));
        assert_eq!(ConsoleState::divide(-7, 2), Ok(-3));
        assert_eq!(ConsoleState::modulus(7, 2), Ok(1));
        assert_eq!(ConsoleState::modulus(-7, 2), Ok(-1));
    }

    #[test]
    fn test_divide_guards() {
        assert_eq!(ConsoleState::divide(1, 0), Err(ApiError::DivideByZero { op: "idiv" }));
        assert_eq!(ConsoleState::modulus(1, 0), Err(ApiError::DivideByZero { op: "imod" }));
        assert!(matches!(
            ConsoleState::divide(i64::MIN, -1),
            Err(ApiError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn test_random_range() {
        let mut st = state();
        for _ in 0..200 {
            let v = st.random(6).unwrap();
            assert!((0..6).contains(&v));
        }
        assert!(st.random(0).is_err());
    }

    #[test]
    fn test_peek_poke() {
        let mut st = state();
        st.poke(0x100, &[0x42]).unwrap();
        assert_eq!(st.peek(0x100, 1).unwrap(), vec![0x42]);
        st.poke(0x200, b"hello world").unwrap();
        assert_eq!(st.peek(0x200, 11).unwrap(), b"hello world".to_vec());
    }

    #[test]
    fn test_rom_bank_rejects_poke() {
        let mut st = state();
        st.select_bank(1).unwrap();
        let err = st.poke(0x100, &[1]).unwrap_err();
        assert!(matches!(err, ApiError::Address(AccessError::WriteProtected { .. })));
        // Reads still work
        assert_eq!(st.peek(crate::PALETTE_START, 1).unwrap(), vec![0x0d]);
        assert!(st.select_bank(2).is_err());
    }

    #[test]
    fn test_put_clips_at_width() {
        let mut st = state();
        st.set_color(0x21).unwrap();
        st.put(23, 2, b"AB").unwrap();
        assert_eq!(st.get(23, 2).unwrap(), b'A');
        // Column 24 would be (0, 3); it must stay untouched
        assert_eq!(st.get(0, 3).unwrap(), 0);
        let addr = DISPLAY_START + (2 * 24 + 23) * 2;
        assert_eq!(st.memory.read(Bank::Normal, addr, 2).unwrap(), &[b'A', 0x21]);
    }

    #[test]
    fn test_put_rejects_rows_outside_grid() {
        let mut st = state();
        assert!(matches!(st.put(0, 16, b"x"), Err(ApiError::CellOutOfRange { .. })));
        assert!(st.put(0, -1, b"x").is_err());
        // Negative columns are clipped
        st.put(-1, 0, b"xy").unwrap();
        assert_eq!(st.get(0, 0).unwrap(), b'y');
    }

    #[test]
    fn test_fill_then_get() {
        let mut st = state();
        st.put(0, 0, b"zzzzzzzzzz").unwrap();
        st.fill(2, 1, 3, 2, b"#").unwrap();
        for y in 0..16 {
            for x in 0..24 {
                let inside = (2..5).contains(&x) && (1..3).contains(&y);
                let expected = if inside {
                    b'#'
                } else if y == 0 && x < 10 {
                    b'z'
                } else {
                    0
                };
                assert_eq!(st.get(x, y).unwrap(), expected, "cell ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_fill_requires_one_char() {
        let mut st = state();
        assert_eq!(st.fill(0, 0, 1, 1, b"ab"), Err(ApiError::FillChar { len: 2 }));
        assert_eq!(st.fill(0, 0, 1, 1, b""), Err(ApiError::FillChar { len: 0 }));
    }

    #[test]
    fn test_fill_clips_to_grid() {
        let mut st = state();
        st.fill(20, 14, 100, 100, b".").unwrap();
        assert_eq!(st.get(23, 15).unwrap(), b'.');
        assert_eq!(st.get(19, 15).unwrap(), 0);
    }

    #[test]
    fn test_color_range() {
        let mut st = state();
        st.set_color(255).unwrap();
        assert_eq!(st.color, 255);
        assert!(st.set_color(256).is_err());
        assert!(st.set_color(-1).is_err());
    }

    #[test]
    fn test_banner() {
        let mut st = state();
        st.bank = Bank::Rom;
        st.paint_banner("boom");
        assert_eq!(st.memory.read(Bank::Normal, DISPLAY_START, 2).unwrap(), &[b'e', BANNER_COLOR]);
        let second_row = DISPLAY_START + 24 * 2;
        assert_eq!(st.memory.read(Bank::Normal, second_row, 1).unwrap(), b"b");
    }
}
