//! Character-cell rendering pipeline.
//!
//! Translates the display region of a bank (glyph byte + packed fg/bg color
//! byte per cell) into an RGBA8888 pixel buffer. Palette and font are always
//! taken from the Rom bank. The whole buffer is rewritten on every pass, so
//! the output depends on memory contents only.

use crate::memory::{Bank, Memory};
use crate::{DISPLAY_START, FIRST_GLYPH, FONT_FALLBACK_GLYPH, FONT_HEIGHT, FONT_WIDTH, LAST_GLYPH};

/// Pixel buffer dimensions for a grid of `width × height` cells.
pub fn buffer_size(width: usize, height: usize) -> (usize, usize) {
    (width * FONT_WIDTH, height * FONT_HEIGHT)
}

/// Substitute the fallback glyph for unprintable codes.
#[inline(always)]
pub fn printable(code: u8) -> u8 {
    if (FIRST_GLYPH..=LAST_GLYPH).contains(&code) {
        code
    } else {
        FONT_FALLBACK_GLYPH
    }
}

/// Render the display region of `bank` into `pixels`.
///
/// `pixels` is resized to `width*FONT_WIDTH × height*FONT_HEIGHT` if needed.
/// The caller guarantees the grid fits the display region (see
/// [`crate::config::Config::from_globals`]).
pub fn render(mem: &Memory, bank: Bank, width: usize, height: usize, pixels: &mut Vec<u32>) {
    let (pw, ph) = buffer_size(width, height);
    pixels.resize(pw * ph, 0);

    let cells = mem.bank_bytes(bank);
    let rom = mem.bank_bytes(Bank::Rom);

    for dy in 0..height {
        for dx in 0..width {
            let addr = DISPLAY_START + (dy * width + dx) * 2;
            let ch = printable(cells[addr]);
            let fg_i = (cells[addr + 1] & 0xF) as usize;
            let bg_i = ((cells[addr + 1] >> 4) & 0xF) as usize;

            let fg = (mem.palette_color(Bank::Rom, fg_i) << 8) | 0xFF;
            let bg = (mem.palette_color(Bank::Rom, bg_i) << 8) | 0xFF;

            let glyph = Memory::glyph_addr(ch);
            for fy in 0..FONT_HEIGHT {
                let row = ((dy * FONT_HEIGHT) + fy) * pw;
                for fx in 0..FONT_WIDTH {
                    let on = rom[glyph + fy * FONT_WIDTH + fx] != 0;
                    pixels[row + dx * FONT_WIDTH + fx] = if on { fg } else { bg };
                }
            }
        }
    }
}

/// RGBA8888 → 0x00RRGGBB (minifb layout)
#[inline(always)]
pub fn rgba_to_rgb(px: u32) -> u32 {
    px >> 8
}

/// Flatten RGBA8888 pixels into `[r, g, b, a]` bytes.
pub fn pixels_to_rgba_bytes(pixels: &[u32]) -> Vec<u8> {
    pixels.iter().flat_map(|px| px.to_be_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::PALETTE;

    #[test]
    fn test_buffer_dimensions() {
        let mem = Memory::new();
        let mut px = Vec::new();
        render(&mem, Bank::Normal, 24, 16, &mut px);
        assert_eq!(px.len(), 24 * 8 * 16 * 8);
        render(&mem, Bank::Normal, 2, 1, &mut px);
        assert_eq!(px.len(), 16 * 8);
    }

    #[test]
    fn test_zeroed_bank_renders_background_zero() {
        // Glyph 0 falls back to '?', color byte 0 → fg and bg both palette[0]
        let mem = Memory::new();
        let mut px = Vec::new();
        render(&mem, Bank::Normal, 4, 4, &mut px);
        let c0 = (PALETTE[0] << 8) | 0xFF;
        assert!(px.iter().all(|&p| p == c0));
    }

    #[test]
    fn test_glyph_colors() {
        let mut mem = Memory::new();
        // 'I' with fg 2 on bg 5 at cell (1, 0)
        mem.write(Bank::Normal, DISPLAY_START + 2, &[b'I', 0x52]).unwrap();
        let mut px = Vec::new();
        render(&mem, Bank::Normal, 2, 1, &mut px);

        let fg = (PALETTE[2] << 8) | 0xFF;
        let bg = (PALETTE[5] << 8) | 0xFF;
        let pw = 16;
        // Top row of 'I' is 0x7E: pixel 0 off, pixels 1..=6 on
        assert_eq!(px[8], bg);
        assert_eq!(px[9], fg);
        assert_eq!(px[14], fg);
        assert_eq!(px[15], bg);
        // Last row of 'I' is blank
        assert_eq!(px[7 * pw + 11], bg);
    }

    #[test]
    fn test_unprintable_uses_fallback() {
        let mut mem = Memory::new();
        mem.write(Bank::Normal, DISPLAY_START, &[0x07, 0x01]).unwrap();
        mem.write(Bank::Normal, DISPLAY_START + 2, &[b'?', 0x01]).unwrap();
        let mut px = Vec::new();
        render(&mem, Bank::Normal, 2, 1, &mut px);
        for fy in 0..8 {
            let row = fy * 16;
            assert_eq!(px[row..row + 8], px[row + 8..row + 16]);
        }
    }

    #[test]
    fn test_render_is_deterministic() {
        let mut mem = Memory::new();
        mem.write(Bank::Normal, DISPLAY_START, b"h\x21i\x43!\x0F").unwrap();
        let mut a = Vec::new();
        let mut b = Vec::new();
        render(&mem, Bank::Normal, 24, 16, &mut a);
        render(&mem, Bank::Normal, 24, 16, &mut b);
        assert_eq!(a, b);

        // Garbage in the buffer is fully overwritten
        let mut c = vec![0xDEAD_BEEF; a.len()];
        render(&mem, Bank::Normal, 24, 16, &mut c);
        assert_eq!(a, c);
    }

    #[test]
    fn test_rom_watermark_renders() {
        let mem = Memory::new();
        let mut px = Vec::new();
        render(&mem, Bank::Rom, 24, 16, &mut px);
        let bg = (PALETTE[0] << 8) | 0xFF;
        assert!(px.iter().any(|&p| p != bg));
    }

    #[test]
    fn test_pixel_conversions() {
        assert_eq!(rgba_to_rgb(0xf7f7e6FF), 0xf7f7e6);
        assert_eq!(pixels_to_rgba_bytes(&[0x11223344]), vec![0x11, 0x22, 0x33, 0x44]);
    }
}
