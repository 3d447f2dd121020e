//! Minimal PNG encoder for console screenshots.
//!
//! Writes 8-bit RGB images with a single IDAT chunk compressed by
//! `miniz_oxide`. Alpha is dropped; console pixels are always opaque.

use miniz_oxide::deflate::compress_to_vec_zlib;

const SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Encode an RGBA pixel buffer as a PNG file.
///
/// `width` and `height` are in pixels. `rgba` contains `width * height * 4` bytes
/// in row-major RGBA order.
pub fn encode_png(width: u32, height: u32, rgba: &[u8]) -> Vec<u8> {
    let mut png = Vec::with_capacity(rgba.len() / 2 + 1024);
    png.extend_from_slice(&SIGNATURE);

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.push(8); // bit depth
    ihdr.push(2); // color type: RGB
    ihdr.push(0); // compression
    ihdr.push(0); // filter
    ihdr.push(0); // interlace
    write_chunk(&mut png, b"IHDR", &ihdr);

    // Filter byte (0=None) + RGB pixels per row
    let w = width as usize;
    let mut raw = Vec::with_capacity((w * 3 + 1) * height as usize);
    for row in rgba.chunks_exact(w * 4).take(height as usize) {
        raw.push(0);
        for px in row.chunks_exact(4) {
            raw.extend_from_slice(&px[..3]);
        }
    }

    write_chunk(&mut png, b"IDAT", &compress_to_vec_zlib(&raw, 6));
    write_chunk(&mut png, b"IEND", &[]);
    png
}

fn write_chunk(out: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(chunk_type);
    out.extend_from_slice(data);
    out.extend_from_slice(&crc32(chunk_type, data).to_be_bytes());
}

// CRC-32 (PNG/zlib) over type + data
fn crc32(chunk_type: &[u8], data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &b in chunk_type.iter().chain(data.iter()) {
        crc ^= b as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
        }
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use miniz_oxide::inflate::decompress_to_vec_zlib;

    fn chunk_at(png: &[u8], offset: usize) -> (&[u8], &[u8], usize) {
        let len = u32::from_be_bytes(png[offset..offset + 4].try_into().unwrap()) as usize;
        let kind = &png[offset + 4..offset + 8];
        let data = &png[offset + 8..offset + 8 + len];
        (kind, data, offset + 12 + len)
    }

    #[test]
    fn test_crc32_known_value() {
        // CRC of an empty IEND chunk
        assert_eq!(crc32(b"IEND", &[]), 0xAE42_6082);
    }

    #[test]
    fn test_png_layout() {
        let rgba = [
            0xFF, 0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0xFF, //
            0x00, 0x00, 0xFF, 0xFF, 0x10, 0x20, 0x30, 0xFF,
        ];
        let png = encode_png(2, 2, &rgba);
        assert_eq!(&png[..8], &SIGNATURE);

        let (kind, ihdr, next) = chunk_at(&png, 8);
        assert_eq!(kind, b"IHDR");
        assert_eq!(&ihdr[..8], &[0, 0, 0, 2, 0, 0, 0, 2]);
        assert_eq!(ihdr[9], 2);

        let (kind, idat, next) = chunk_at(&png, next);
        assert_eq!(kind, b"IDAT");
        let raw = decompress_to_vec_zlib(idat).unwrap();
        assert_eq!(
            raw,
            vec![0, 0xFF, 0, 0, 0, 0xFF, 0, 0, 0, 0, 0xFF, 0x10, 0x20, 0x30]
        );

        let (kind, _, end) = chunk_at(&png, next);
        assert_eq!(kind, b"IEND");
        assert_eq!(end, png.len());
    }
}
