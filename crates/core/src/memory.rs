//! cel7 memory subsystem.
//!
//! Two flat banks of [`MEMORY_SIZE`] bytes share one layout:
//!
//! | Address Range | Content                                   |
//! |---------------|-------------------------------------------|
//! | 0x0000–0x3FFF | Free scratch memory                       |
//! | 0x4000–0x403F | Palette (16 × 4 bytes, little-endian RGB) |
//! | 0x4040–0x57FF | Font (95 glyphs × 8 × 8 bytes, 0/1)       |
//! | 0x5800–0xD7FF | Display cells (2 bytes each)              |
//! | 0xD800–0xFFFF | Free scratch memory                       |
//!
//! The Normal bank starts zeroed and is writable by scripts. The Rom bank
//! holds the factory palette, font and watermark and rejects every write
//! coming from scripts.

use crate::font::FONT_8X8;
use crate::{
    DISPLAY_START, FIRST_GLYPH, FONT_HEIGHT, FONT_START, FONT_WIDTH, GLYPH_COUNT, MAX_HEIGHT,
    MAX_WIDTH, MEMORY_SIZE, PALETTE_START,
};
use std::fmt;
use thiserror::Error;

/// Factory palette, `0x00RRGGBB`.
pub const PALETTE: [u32; 16] = [
    0x0b0c0d, 0xf7f7e6, 0xf71467, 0xfd971f,
    0xe6d415, 0xa0e01f, 0x46bbff, 0xa98aff,
    0xf9aaaf, 0xab3347, 0x37946e, 0x2a4669,
    0x7c8d99, 0xc2beae, 0x75715e, 0x3e3d32,
];

/// Text repeated across the Rom display region.
const WATERMARK: &[u8] = b"cel7 ";

/// Addressable memory bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bank {
    /// Mutable scratch bank, zeroed at power-on
    #[default]
    Normal,
    /// Factory data, read-only from scripts
    Rom,
}

impl Bank {
    /// Bank number as seen by scripts (`bank` operation, error messages).
    pub fn number(self) -> u8 {
        match self {
            Bank::Normal => 0,
            Bank::Rom => 1,
        }
    }

    pub fn from_number(n: i64) -> Option<Bank> {
        match n {
            0 => Some(Bank::Normal),
            1 => Some(Bank::Rom),
            _ => None,
        }
    }
}

/// Kind of access being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => f.write_str("readable"),
            Access::Write => f.write_str("writeable"),
        }
    }
}

/// Rejected memory access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("Address {} not {access}.", span(.bank, .addr, .size))]
    OutOfBounds {
        bank: Bank,
        addr: usize,
        size: usize,
        access: Access,
    },
    #[error("Address {} not writeable.", span(.bank, .addr, .size))]
    WriteProtected { bank: Bank, addr: usize, size: usize },
}

fn span(bank: &Bank, addr: &usize, size: &usize) -> String {
    let (addr, size) = (*addr, *size);
    if size <= 1 {
        format!("[{}]0x{:04X}", bank.number(), addr)
    } else {
        format!("[{}]0x{:04X}...{:04X}", bank.number(), addr, addr + (size - 1))
    }
}

/// Both memory banks of the console.
pub struct Memory {
    normal: Vec<u8>,
    rom: Vec<u8>,
}

impl Memory {
    /// Allocate both banks and burn the factory data into Rom.
    pub fn new() -> Self {
        let mut mem = Memory {
            normal: vec![0u8; MEMORY_SIZE],
            rom: vec![0u8; MEMORY_SIZE],
        };
        mem.burn_rom();
        mem
    }

    fn burn_rom(&mut self) {
        let rom = &mut self.rom;

        for (i, color) in PALETTE.iter().enumerate() {
            let addr = PALETTE_START + i * 4;
            rom[addr..addr + 4].copy_from_slice(&color.to_le_bytes());
        }

        // One source byte per glyph row, MSB is the leftmost pixel
        for glyph in 0..GLYPH_COUNT {
            for fy in 0..FONT_HEIGHT {
                let row = FONT_8X8[glyph * FONT_HEIGHT + fy];
                for fx in 0..FONT_WIDTH {
                    let on = (row >> (7 - fx)) & 1;
                    rom[FONT_START + glyph * FONT_WIDTH * FONT_HEIGHT + fy * FONT_WIDTH + fx] = on;
                }
            }
        }

        for cell in 0..MAX_WIDTH * MAX_HEIGHT {
            let addr = DISPLAY_START + cell * 2;
            let fg = (cell % 15 + 1) as u8;
            rom[addr] = WATERMARK[cell % WATERMARK.len()];
            rom[addr + 1] = fg;
        }
    }

    /// Validate an access of `size` bytes at `addr` without performing it.
    ///
    /// Every byte must satisfy `addr + size < MEMORY_SIZE`; writes to Rom are
    /// rejected before the bounds check.
    pub fn check(&self, bank: Bank, addr: usize, size: usize, access: Access) -> Result<(), AccessError> {
        if access == Access::Write && bank == Bank::Rom {
            return Err(AccessError::WriteProtected { bank, addr, size });
        }
        match addr.checked_add(size) {
            Some(end) if end < MEMORY_SIZE => Ok(()),
            _ => Err(AccessError::OutOfBounds { bank, addr, size, access }),
        }
    }

    pub fn read(&self, bank: Bank, addr: usize, size: usize) -> Result<&[u8], AccessError> {
        self.check(bank, addr, size, Access::Read)?;
        Ok(&self.bank_bytes(bank)[addr..addr + size])
    }

    pub fn read_byte(&self, bank: Bank, addr: usize) -> Result<u8, AccessError> {
        Ok(self.read(bank, addr, 1)?[0])
    }

    pub fn write(&mut self, bank: Bank, addr: usize, bytes: &[u8]) -> Result<(), AccessError> {
        self.check(bank, addr, bytes.len(), Access::Write)?;
        self.normal[addr..addr + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn write_byte(&mut self, bank: Bank, addr: usize, v: u8) -> Result<(), AccessError> {
        self.write(bank, addr, &[v])
    }

    /// Whole bank as a slice (renderer access, no bounds check needed).
    #[inline(always)]
    pub fn bank_bytes(&self, bank: Bank) -> &[u8] {
        match bank {
            Bank::Normal => &self.normal,
            Bank::Rom => &self.rom,
        }
    }

    /// Decode a little-endian 32-bit value from the first four bytes.
    #[inline(always)]
    pub fn decode_u32(bytes: &[u8]) -> u32 {
        bytes[..4]
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, &b)| acc | (b as u32) << (8 * i))
    }

    /// Palette entry `index` (0–15) of the given bank as `0x00RRGGBB`.
    #[inline(always)]
    pub fn palette_color(&self, bank: Bank, index: usize) -> u32 {
        let addr = PALETTE_START + (index & 0xF) * 4;
        Self::decode_u32(&self.bank_bytes(bank)[addr..addr + 4])
    }

    /// Start of a glyph's bitmap inside the font region.
    #[inline(always)]
    pub fn glyph_addr(code: u8) -> usize {
        FONT_START + (code - FIRST_GLYPH) as usize * FONT_WIDTH * FONT_HEIGHT
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FONT_FALLBACK_GLYPH;

    #[test]
    fn test_normal_round_trip() {
        let mut mem = Memory::new();
        mem.write(Bank::Normal, 0x10, b"hello").unwrap();
        assert_eq!(mem.read(Bank::Normal, 0x10, 5).unwrap(), b"hello");

        let last = MEMORY_SIZE - 2;
        mem.write_byte(Bank::Normal, last, 0xAB).unwrap();
        assert_eq!(mem.read_byte(Bank::Normal, last).unwrap(), 0xAB);
    }

    #[test]
    fn test_normal_starts_zeroed() {
        let mem = Memory::new();
        assert!(mem.bank_bytes(Bank::Normal).iter().all(|&b| b == 0));
    }

    #[test]
    fn test_rom_write_always_rejected() {
        let mut mem = Memory::new();
        for addr in [0, 1, PALETTE_START, DISPLAY_START, MEMORY_SIZE - 1, MEMORY_SIZE + 10] {
            let err = mem.write_byte(Bank::Rom, addr, 1).unwrap_err();
            assert!(matches!(err, AccessError::WriteProtected { .. }), "addr 0x{:X}", addr);
        }
        assert_eq!(mem.palette_color(Bank::Rom, 0), PALETTE[0]);
    }

    #[test]
    fn test_bounds() {
        let mut mem = Memory::new();
        // addr + size must stay strictly below MEMORY_SIZE
        assert!(mem.read(Bank::Normal, MEMORY_SIZE - 1, 1).is_err());
        assert!(mem.read(Bank::Normal, MEMORY_SIZE - 4, 3).is_ok());
        assert!(mem.read(Bank::Normal, MEMORY_SIZE - 4, 4).is_err());
        assert!(mem.write(Bank::Normal, usize::MAX, b"x").is_err());
    }

    #[test]
    fn test_error_message() {
        let mut mem = Memory::new();
        let err = mem.write(Bank::Rom, 0x10, b"abcd").unwrap_err();
        assert_eq!(err.to_string(), "Address [1]0x0010...0013 not writeable.");
        let err = mem.read(Bank::Normal, MEMORY_SIZE, 1).unwrap_err();
        assert_eq!(err.to_string(), "Address [0]0x10000 not readable.");
    }

    #[test]
    fn test_rom_palette_layout() {
        let mem = Memory::new();
        let rom = mem.bank_bytes(Bank::Rom);
        // 0xf7f7e6 stored little-endian
        assert_eq!(&rom[PALETTE_START + 4..PALETTE_START + 8], &[0xe6, 0xf7, 0xf7, 0x00]);
        for (i, &c) in PALETTE.iter().enumerate() {
            assert_eq!(mem.palette_color(Bank::Rom, i), c);
        }
    }

    #[test]
    fn test_font_bits() {
        let mem = Memory::new();
        let rom = mem.bank_bytes(Bank::Rom);
        let space = Memory::glyph_addr(b' ');
        assert!(rom[space..space + 64].iter().all(|&b| b == 0));
        let fallback = Memory::glyph_addr(FONT_FALLBACK_GLYPH);
        assert!(rom[fallback..fallback + 64].iter().any(|&b| b == 1));
        assert!(rom[FONT_START..DISPLAY_START].iter().all(|&b| b <= 1));
    }

    #[test]
    fn test_watermark() {
        let mem = Memory::new();
        let rom = mem.bank_bytes(Bank::Rom);
        assert_eq!(&rom[DISPLAY_START..DISPLAY_START + 2], &[b'c', 1]);
        assert_eq!(rom[DISPLAY_START + 2], b'e');
    }

    #[test]
    fn test_decode_u32() {
        assert_eq!(Memory::decode_u32(&[0x0d, 0x0c, 0x0b, 0x00]), 0x0b0c0d);
        assert_eq!(Memory::decode_u32(&[0xFF, 0, 0, 0x80, 0x99]), 0x8000_00FF);
    }
}
