use flate2::read::{DeflateDecoder, ZlibDecoder};
use image::RgbaImage;
use std::io::Read;
use std::sync::Arc;
use thiserror::Error;

use crate::reader::{self, read_u16_at, Reader};
use crate::util::keystream::decrypt_in_place;
use crate::WzReader;

const ZLIB_HEADER: u16 = 0x9C78;

#[derive(Debug, Error)]
pub enum WzCanvasError {
    #[error("inflating pixel payload failed: {0}")]
    Decode(#[from] std::io::Error),

    #[error("encrypted block exceeds the declared payload size")]
    BlockExceedsPayload,

    #[error("pixel payload shorter than a zlib stream")]
    TruncatedPayload,

    #[error("unknown pixel form {0}")]
    UnknownForm(i32),

    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("binary reading error: {0}")]
    Reader(#[from] reader::Error),
}

/// A canvas leaf: width, height, pixel form, and a pointer to the
/// compressed (and possibly block-encrypted) pixel payload in the file.
///
/// Forms: 1 = ARGB4444, 2 = BGRA8888, 257 = ARGB1555, 513 = RGB565,
/// 1026 = DXT3, 2050 = DXT5, plus the 4x4 (3) and 16x16 (517) block
/// thumbnails. Decoded output is always RGBA8888.
#[derive(Debug, Clone)]
pub struct WzCanvas {
    pub reader: Arc<WzReader>,
    pub width: u32,
    pub height: u32,
    pub data_length: usize,
    pub form: i32,
    /// file-absolute start of the payload
    pub offset: usize,
}

impl WzCanvas {
    pub fn new(
        reader: &Arc<WzReader>,
        width: u32,
        height: u32,
        data_length: usize,
        form: i32,
        offset: usize,
    ) -> Self {
        Self {
            reader: Arc::clone(reader),
            width,
            height,
            data_length,
            form,
            offset,
        }
    }

    /// Bytes of raw pixel data one inflate away from pixels: how many the
    /// decoder consumes for this form, `None` to read whatever is there.
    fn expected_raw_len(&self) -> Option<usize> {
        let w = self.width as usize;
        let h = self.height as usize;
        match self.form {
            1 | 257 | 513 => Some(w * h * 2),
            2 => Some(w * h * 4),
            3 => Some(w.div_ceil(4) * 4 * h.div_ceil(4) * 4 / 2),
            517 => Some(w * h / 128),
            1026 | 2050 => Some(w * h),
            _ => None,
        }
    }

    /// Decompressed pixel payload. The byte at `offset` is a tag the
    /// decoder does not use; a standard zlib header right after it means a
    /// plain stream, anything else the block-encrypted layout.
    pub fn extract_raw(&self) -> Result<Vec<u8>, WzCanvasError> {
        let end = self.offset + self.data_length;

        let header = self.reader.read_u16_at(self.offset + 1)?;
        if header == ZLIB_HEADER {
            let payload = self.reader.get_slice(self.offset + 1..end)?;
            self.inflate(payload, true)
        } else {
            let payload = self.decrypt_blocks(end)?;
            if payload.len() < 2 {
                return Err(WzCanvasError::TruncatedPayload);
            }
            self.inflate(&payload[2..], false)
        }
    }

    /// Length-prefixed encrypted blocks covering the payload. Every block
    /// is XORed with the keystream starting at index 0; only the output
    /// position accumulates.
    fn decrypt_blocks(&self, end: usize) -> Result<Vec<u8>, WzCanvasError> {
        let reader = self.reader.slice_reader(self.offset + 1..end)?;
        let mut buffer = Vec::with_capacity(self.data_length);

        while reader.available() > 4 {
            let block_size = reader.read_u32()? as usize;
            if block_size > reader.available() {
                return Err(WzCanvasError::BlockExceedsPayload);
            }
            let mut block = reader.read_bytes(block_size)?;
            decrypt_in_place(&self.reader.keys, &mut block);
            buffer.extend_from_slice(&block);
        }

        Ok(buffer)
    }

    fn inflate(&self, data: &[u8], with_zlib_header: bool) -> Result<Vec<u8>, WzCanvasError> {
        match self.expected_raw_len() {
            Some(expected) => {
                let mut out = vec![0_u8; expected];
                if with_zlib_header {
                    ZlibDecoder::new(data).read_exact(&mut out)?;
                } else {
                    DeflateDecoder::new(data).read_exact(&mut out)?;
                }
                Ok(out)
            }
            None => {
                let mut out = Vec::new();
                if with_zlib_header {
                    ZlibDecoder::new(data).read_to_end(&mut out)?;
                } else {
                    DeflateDecoder::new(data).read_to_end(&mut out)?;
                }
                Ok(out)
            }
        }
    }

    /// Decode the payload to an RGBA8888 image of the declared size.
    pub fn extract_pixels(&self) -> Result<RgbaImage, WzCanvasError> {
        let raw = self.extract_raw()?;
        let (w, h) = (self.width, self.height);

        let pixels = match self.form {
            1 => pixels_from_argb4444(&raw),
            2 => pixels_from_bgra8888(&raw),
            3 => pixels_from_block4_thumbnail(&raw, w, h),
            257 => pixels_from_argb1555(&raw),
            513 => pixels_from_rgb565(&raw),
            517 => pixels_from_rgb565(&expand_block16_thumbnail(&raw, w, h)),
            1026 => pixels_from_dxt3(&raw, w, h)?,
            2050 => pixels_from_dxt5(&raw, w, h)?,
            other => return Err(WzCanvasError::UnknownForm(other)),
        };

        let expected = w as usize * h as usize * 4;
        if pixels.len() != expected {
            return Err(WzCanvasError::SizeMismatch {
                expected,
                actual: pixels.len(),
            });
        }

        RgbaImage::from_raw(w, h, pixels).ok_or(WzCanvasError::SizeMismatch {
            expected,
            actual: 0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Color(u8, u8, u8, u8);

impl Color {
    fn black() -> Color {
        Color(0, 0, 0, 255)
    }
    fn transparent() -> Color {
        Color(0, 0, 0, 0)
    }
    /// 5/6/5 channels widened to 8 bits with low-bit replication.
    fn from_rgb565(color: u16) -> Color {
        let r = ((color >> 11) & 0x1F) as u8;
        let g = ((color >> 5) & 0x3F) as u8;
        let b = (color & 0x1F) as u8;
        Color(r << 3 | r >> 2, g << 2 | g >> 4, b << 3 | b >> 2, 255)
    }
    fn from_argb1555(color: u16) -> Color {
        let a = if color & 0x8000 != 0 { 255 } else { 0 };
        let r = ((color >> 10) & 0x1F) as u8;
        let g = ((color >> 5) & 0x1F) as u8;
        let b = (color & 0x1F) as u8;
        Color(r << 3 | r >> 2, g << 3 | g >> 2, b << 3 | b >> 2, a)
    }
}

/// One ARGB4444 pair expanded to RGBA, each nibble widened by replication.
fn argb4444_pixel(lo: u8, hi: u8) -> [u8; 4] {
    let r = hi & 0x0F;
    let b = lo & 0x0F;
    [
        r << 4 | r,
        (lo & 0xF0) | (lo & 0xF0) >> 4,
        b << 4 | b,
        (hi & 0xF0) | (hi & 0xF0) >> 4,
    ]
}

fn pixels_from_argb4444(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() * 2);
    for pair in raw.chunks_exact(2) {
        out.extend_from_slice(&argb4444_pixel(pair[0], pair[1]));
    }
    out
}

fn pixels_from_bgra8888(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    for quad in raw.chunks_exact(4) {
        out.extend_from_slice(&[quad[2], quad[1], quad[0], quad[3]]);
    }
    out
}

fn pixels_from_rgb565(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() * 2);
    for pair in raw.chunks_exact(2) {
        let Color(r, g, b, a) = Color::from_rgb565(u16::from_le_bytes([pair[0], pair[1]]));
        out.extend_from_slice(&[r, g, b, a]);
    }
    out
}

fn pixels_from_argb1555(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() * 2);
    for pair in raw.chunks_exact(2) {
        let Color(r, g, b, a) = Color::from_argb1555(u16::from_le_bytes([pair[0], pair[1]]));
        out.extend_from_slice(&[r, g, b, a]);
    }
    out
}

/// Form 3: every 2 bytes are one ARGB4444 pixel covering a whole 4x4
/// block, rows replicated downward.
fn pixels_from_block4_thumbnail(raw: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let mut out = vec![0_u8; w * h * 4];

    let block_w = w.div_ceil(4);
    let block_h = h.div_ceil(4);

    for by in 0..block_h {
        for bx in 0..block_w {
            let idx = (bx + by * block_w) * 2;
            if idx + 1 >= raw.len() {
                break;
            }
            let pixel = argb4444_pixel(raw[idx], raw[idx + 1]);

            for dy in 0..4 {
                let y = by * 4 + dy;
                if y >= h {
                    break;
                }
                for dx in 0..4 {
                    let x = bx * 4 + dx;
                    if x >= w {
                        break;
                    }
                    let at = (y * w + x) * 4;
                    out[at..at + 4].copy_from_slice(&pixel);
                }
            }
        }
    }

    out
}

/// Form 517: every 2 bytes are one RGB565 pixel covering a whole 16x16
/// block. Expands to the plain RGB565 layout.
fn expand_block16_thumbnail(raw: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let mut pixels = vec![0_u8; w * h * 2];

    let mut line_index = 0;
    for j in 0..h / 16 {
        let mut dst = line_index;
        for i in 0..w / 16 {
            let idx = (i + j * (w / 16)) * 2;
            for _ in 0..16 {
                pixels[dst] = raw[idx];
                pixels[dst + 1] = raw[idx + 1];
                dst += 2;
            }
        }

        // replicate the finished line over the block's other 15 rows
        for _ in 1..16 {
            pixels.copy_within(line_index..line_index + w * 2, dst);
            dst += w * 2;
        }

        line_index += w * 32;
    }

    pixels
}

/// DXT3/DXT5 shared color palette: two RGB565 endpoints plus two
/// interpolated entries, thirds when `c0 > c1`, midpoint and black
/// otherwise. Palette alpha is always opaque.
fn expand_color_table(table: &mut [Color; 4], c0: u16, c1: u16) {
    table[0] = Color::from_rgb565(c0);
    table[1] = Color::from_rgb565(c1);

    let (r0, g0, b0) = (table[0].0 as i32, table[0].1 as i32, table[0].2 as i32);
    let (r1, g1, b1) = (table[1].0 as i32, table[1].1 as i32, table[1].2 as i32);

    if c0 > c1 {
        table[2] = Color(
            ((r0 * 2 + r1 + 1) / 3) as u8,
            ((g0 * 2 + g1 + 1) / 3) as u8,
            ((b0 * 2 + b1 + 1) / 3) as u8,
            255,
        );
        table[3] = Color(
            ((r0 + r1 * 2 + 1) / 3) as u8,
            ((g0 + g1 * 2 + 1) / 3) as u8,
            ((b0 + b1 * 2 + 1) / 3) as u8,
            255,
        );
    } else {
        table[2] = Color(
            ((r0 + r1) / 2) as u8,
            ((g0 + g1) / 2) as u8,
            ((b0 + b1) / 2) as u8,
            255,
        );
        table[3] = Color::black();
    }
}

fn expand_color_index_table(table: &mut [usize; 16], raw: &[u8], offset: usize) {
    for i in 0..4 {
        let bits = raw[offset + i];
        table[i * 4] = (bits & 0x03) as usize;
        table[i * 4 + 1] = ((bits >> 2) & 0x03) as usize;
        table[i * 4 + 2] = ((bits >> 4) & 0x03) as usize;
        table[i * 4 + 3] = ((bits >> 6) & 0x03) as usize;
    }
}

/// DXT3 alpha: 4-bit per pixel, widened by nibble replication.
fn expand_dxt3_alpha_table(table: &mut [u8; 16], raw: &[u8], offset: usize) {
    for i in 0..8 {
        let bits = raw[offset + i];
        table[i * 2] = bits & 0x0F;
        table[i * 2 + 1] = (bits & 0xF0) >> 4;
    }
    for alpha in table.iter_mut() {
        *alpha |= *alpha << 4;
    }
}

/// DXT5 alpha palette: 8 interpolated values when `a0 > a1`, 6 plus the
/// constant 0/255 pair otherwise.
fn expand_dxt5_alpha_table(table: &mut [u8; 8], a0: u8, a1: u8) {
    table[0] = a0;
    table[1] = a1;
    let (a0, a1) = (a0 as i32, a1 as i32);

    if a0 > a1 {
        for i in 2..8_i32 {
            table[i as usize] = (((8 - i) * a0 + (i - 1) * a1 + 3) / 7) as u8;
        }
    } else {
        for i in 2..6_i32 {
            table[i as usize] = (((6 - i) * a0 + (i - 1) * a1 + 2) / 5) as u8;
        }
        table[6] = 0;
        table[7] = 255;
    }
}

/// 48 bits of 3-bit alpha indices, packed little-endian as two 24-bit
/// groups of 8.
fn expand_dxt5_alpha_index_table(table: &mut [usize; 16], raw: &[u8], offset: usize) {
    for i in 0..2 {
        let at = offset + i * 3;
        let flags =
            raw[at] as u32 | (raw[at + 1] as u32) << 8 | (raw[at + 2] as u32) << 16;
        for j in 0..8 {
            table[i * 8 + j] = ((flags >> (3 * j)) & 0x07) as usize;
        }
    }
}

fn set_pixel(out: &mut [u8], x: usize, y: usize, width: usize, color: Color, alpha: u8) {
    let at = (y * width + x) * 4;
    out[at] = color.0;
    out[at + 1] = color.1;
    out[at + 2] = color.2;
    out[at + 3] = alpha;
}

fn pixels_from_dxt3(raw: &[u8], width: u32, height: u32) -> Result<Vec<u8>, WzCanvasError> {
    let w = width as usize;
    let h = height as usize;
    let mut out = vec![0_u8; w * h * 4];

    let mut color_table = [Color::transparent(); 4];
    let mut color_idx = [0_usize; 16];
    let mut alpha_table = [0_u8; 16];

    for y in (0..h).step_by(4) {
        for x in (0..w).step_by(4) {
            let offset = x * 4 + y * w;
            if offset + 16 > raw.len() {
                return Err(WzCanvasError::SizeMismatch {
                    expected: offset + 16,
                    actual: raw.len(),
                });
            }

            expand_dxt3_alpha_table(&mut alpha_table, raw, offset);
            let c0 = read_u16_at(raw, offset + 8)?;
            let c1 = read_u16_at(raw, offset + 10)?;
            expand_color_table(&mut color_table, c0, c1);
            expand_color_index_table(&mut color_idx, raw, offset + 12);

            for j in 0..4 {
                for i in 0..4 {
                    if x + i < w && y + j < h {
                        let entry = j * 4 + i;
                        set_pixel(
                            &mut out,
                            x + i,
                            y + j,
                            w,
                            color_table[color_idx[entry]],
                            alpha_table[entry],
                        );
                    }
                }
            }
        }
    }

    Ok(out)
}

fn pixels_from_dxt5(raw: &[u8], width: u32, height: u32) -> Result<Vec<u8>, WzCanvasError> {
    let w = width as usize;
    let h = height as usize;
    let mut out = vec![0_u8; w * h * 4];

    let mut color_table = [Color::transparent(); 4];
    let mut color_idx = [0_usize; 16];
    let mut alpha_table = [0_u8; 8];
    let mut alpha_idx = [0_usize; 16];

    for y in (0..h).step_by(4) {
        for x in (0..w).step_by(4) {
            let offset = x * 4 + y * w;
            if offset + 16 > raw.len() {
                return Err(WzCanvasError::SizeMismatch {
                    expected: offset + 16,
                    actual: raw.len(),
                });
            }

            expand_dxt5_alpha_table(&mut alpha_table, raw[offset], raw[offset + 1]);
            expand_dxt5_alpha_index_table(&mut alpha_idx, raw, offset + 2);
            let c0 = read_u16_at(raw, offset + 8)?;
            let c1 = read_u16_at(raw, offset + 10)?;
            expand_color_table(&mut color_table, c0, c1);
            expand_color_index_table(&mut color_idx, raw, offset + 12);

            for j in 0..4 {
                for i in 0..4 {
                    if x + i < w && y + j < h {
                        let entry = j * 4 + i;
                        set_pixel(
                            &mut out,
                            x + i,
                            y + j,
                            w,
                            color_table[color_idx[entry]],
                            alpha_table[alpha_idx[entry]],
                        );
                    }
                }
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::crypto::WZ_GMS_IV;
    use crate::util::keystream::WzKeystream;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    /// Payload layout at `offset`: one tag byte, then a raw zlib stream.
    fn canvas_over_zlib(raw: &[u8], width: u32, height: u32, form: i32) -> WzCanvas {
        let mut buf = vec![0_u8];
        buf.extend_from_slice(&deflate(raw));
        let data_length = buf.len();
        let reader = Arc::new(WzReader::from_buff(&buf));
        WzCanvas::new(&reader, width, height, data_length, form, 0)
    }

    #[test]
    fn bgra8888_swizzles_to_rgba() {
        let canvas = canvas_over_zlib(&[0x10, 0x20, 0x30, 0xFF], 1, 1, 2);
        let img = canvas.extract_pixels().unwrap();
        assert_eq!(img.as_raw(), &vec![0x30, 0x20, 0x10, 0xFF]);
    }

    #[test]
    fn argb4444_expands_nibbles() {
        // lo = G|B nibbles, hi = A|R nibbles
        let canvas = canvas_over_zlib(&[0xC5, 0x8F, 0x00, 0xF0], 2, 1, 1);
        let img = canvas.extract_pixels().unwrap();
        assert_eq!(
            img.as_raw(),
            &vec![0xFF, 0xCC, 0x55, 0x88, 0x00, 0x00, 0x00, 0xFF]
        );
    }

    #[test]
    fn rgb565_primaries() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&0xF800_u16.to_le_bytes());
        raw.extend_from_slice(&0x07E0_u16.to_le_bytes());
        raw.extend_from_slice(&0x001F_u16.to_le_bytes());
        let canvas = canvas_over_zlib(&raw, 3, 1, 513);
        let img = canvas.extract_pixels().unwrap();
        assert_eq!(
            img.as_raw(),
            &vec![255, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255]
        );
    }

    #[test]
    fn argb1555_alpha_bit() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&0xFFFF_u16.to_le_bytes());
        raw.extend_from_slice(&0x7FFF_u16.to_le_bytes());
        let canvas = canvas_over_zlib(&raw, 2, 1, 257);
        let img = canvas.extract_pixels().unwrap();
        assert_eq!(
            img.as_raw(),
            &vec![255, 255, 255, 255, 255, 255, 255, 0]
        );
    }

    #[test]
    fn equal_color_endpoints_collapse_the_palette() {
        let mut table = [Color::transparent(); 4];
        let c = 0xF800;
        expand_color_table(&mut table, c, c);

        let endpoint = Color::from_rgb565(c);
        assert_eq!(table[0], endpoint);
        assert_eq!(table[1], endpoint);
        assert_eq!(table[2], endpoint);
        assert_eq!(table[3], Color::black());
    }

    #[test]
    fn dxt5_single_red_block() {
        let mut block = vec![0xFF_u8, 0x00];
        block.extend_from_slice(&[0; 6]);
        block.extend_from_slice(&0xF800_u16.to_le_bytes());
        block.extend_from_slice(&0x001F_u16.to_le_bytes());
        block.extend_from_slice(&[0; 4]);

        let canvas = canvas_over_zlib(&block, 4, 4, 2050);
        let img = canvas.extract_pixels().unwrap();
        for pixel in img.as_raw().chunks_exact(4) {
            assert_eq!(pixel, &[255, 0, 0, 255]);
        }
    }

    #[test]
    fn dxt3_alpha_nibbles() {
        let mut block = vec![0xF0_u8; 8];
        block.extend_from_slice(&0xF800_u16.to_le_bytes());
        block.extend_from_slice(&0xF800_u16.to_le_bytes());
        block.extend_from_slice(&[0; 4]);

        let canvas = canvas_over_zlib(&block, 4, 4, 1026);
        let img = canvas.extract_pixels().unwrap();
        // alternating 0x00 / 0xFF alpha from the packed nibbles
        for pair in img.as_raw().chunks_exact(8) {
            assert_eq!(&pair[..4], &[255, 0, 0, 0x00]);
            assert_eq!(&pair[4..], &[255, 0, 0, 0xFF]);
        }
    }

    #[test]
    fn block4_thumbnail_fills_blocks() {
        // one block, opaque red-ish pixel: lo = G|B = 0x00, hi = A|R = 0xFF
        let canvas = canvas_over_zlib(&[0x00, 0xFF, 0, 0, 0, 0, 0, 0], 4, 4, 3);
        let img = canvas.extract_pixels().unwrap();
        for pixel in img.as_raw().chunks_exact(4) {
            assert_eq!(pixel, &[0xFF, 0x00, 0x00, 0xFF]);
        }
    }

    #[test]
    fn block16_thumbnail_fills_blocks() {
        let raw: Vec<u8> = 0xF800_u16.to_le_bytes().to_vec();
        let canvas = canvas_over_zlib(&raw, 16, 16, 517);
        let img = canvas.extract_pixels().unwrap();
        assert_eq!(img.as_raw().len(), 16 * 16 * 4);
        for pixel in img.as_raw().chunks_exact(4) {
            assert_eq!(pixel, &[255, 0, 0, 255]);
        }
    }

    #[test]
    fn output_size_is_always_w_h_4() {
        for (form, w, h, raw_len) in [
            (1, 4, 2, 4 * 2 * 2),
            (2, 3, 3, 3 * 3 * 4),
            (257, 2, 2, 2 * 2 * 2),
            (513, 5, 1, 5 * 2),
            (1026, 4, 4, 16),
            (2050, 4, 4, 16),
        ] {
            let raw = vec![0_u8; raw_len];
            let canvas = canvas_over_zlib(&raw, w, h, form);
            let img = canvas.extract_pixels().unwrap();
            assert_eq!(img.as_raw().len(), (w * h * 4) as usize, "form {form}");
        }
    }

    #[test]
    fn unknown_form_is_rejected() {
        let canvas = canvas_over_zlib(&[0, 0, 0, 0], 1, 1, 999);
        assert!(matches!(
            canvas.extract_pixels(),
            Err(WzCanvasError::UnknownForm(999))
        ));
    }

    #[test]
    fn block_encrypted_payload_roundtrips() {
        let raw = [0x10_u8, 0x20, 0x30, 0xFF];
        let compressed = deflate(&raw);

        // split the zlib stream into two encrypted length-prefixed blocks
        let keys = WzKeystream::new(WZ_GMS_IV).into_shared();
        let split = compressed.len() / 2;
        let mut payload = vec![0_u8];
        for chunk in [&compressed[..split], &compressed[split..]] {
            let mut block = chunk.to_vec();
            {
                let mut keys = keys.write().unwrap();
                keys.ensure_size(block.len());
                for (i, byte) in block.iter_mut().enumerate() {
                    *byte ^= keys.at(i);
                }
            }
            payload.extend_from_slice(&(chunk.len() as u32).to_le_bytes());
            payload.extend_from_slice(&block);
        }

        let data_length = payload.len();
        let reader = Arc::new(WzReader::from_buff(&payload).with_keys(WZ_GMS_IV, keys));
        let canvas = WzCanvas::new(&reader, 1, 1, data_length, 2, 0);

        let img = canvas.extract_pixels().unwrap();
        assert_eq!(img.as_raw(), &vec![0x30, 0x20, 0x10, 0xFF]);
    }
}
