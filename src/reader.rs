use memmap2::Mmap;
use scroll::{Pread, LE};
use std::cell::Cell;

use crate::util::keystream::{decrypt_in_place, SharedKeystream, WzKeystream};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("error reading binary: {0}")]
    Read(#[from] scroll::Error),
    #[error("position {pos} out of bounds, stream length is {len}")]
    OutOfBounds { pos: usize, len: usize },
    #[error("unexpected flag {0:#04x} when reading a string block")]
    UnexpectedFlag(u8),
}

type Result<T> = std::result::Result<T, Error>;

/// Positional little-endian reads over a byte source.
pub trait Reader {
    fn get_size(&self) -> usize;
    fn read_u8_at(&self, pos: usize) -> Result<u8>;
    fn read_u16_at(&self, pos: usize) -> Result<u16>;
    fn read_u32_at(&self, pos: usize) -> Result<u32>;
    fn read_u64_at(&self, pos: usize) -> Result<u64>;
    fn read_i8_at(&self, pos: usize) -> Result<i8>;
    fn read_i16_at(&self, pos: usize) -> Result<i16>;
    fn read_i32_at(&self, pos: usize) -> Result<i32>;
    fn read_i64_at(&self, pos: usize) -> Result<i64>;
    fn read_float_at(&self, pos: usize) -> Result<f32>;
    fn read_double_at(&self, pos: usize) -> Result<f64>;
}

/// Owner of the archive bytes. Holds the memory map and the keystream
/// shared by every bounded reader created from it.
#[derive(Debug)]
pub struct WzBaseReader<T: AsRef<[u8]>> {
    pub map: T,
    pub iv: [u8; 4],
    pub keys: SharedKeystream,
}

/// The mmap-backed reader used for real files.
pub type WzReader = WzBaseReader<Mmap>;

impl<T: AsRef<[u8]>> WzBaseReader<T> {
    pub fn new(map: T) -> Self {
        WzBaseReader {
            map,
            iv: [0; 4],
            keys: WzKeystream::new([0; 4]).into_shared(),
        }
    }

    pub fn with_iv(self, iv: [u8; 4]) -> Self {
        WzBaseReader {
            iv,
            keys: WzKeystream::new(iv).into_shared(),
            ..self
        }
    }

    /// Adopt an already-expanded keystream, e.g. the one the encryption
    /// detector grew while classifying the file.
    pub fn with_keys(self, iv: [u8; 4], keys: SharedKeystream) -> Self {
        WzBaseReader { iv, keys, ..self }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        self.map.as_ref()
    }

    #[inline]
    pub fn get_slice(&self, range: std::ops::Range<usize>) -> Result<&[u8]> {
        let len = self.get_size();
        self.map
            .as_ref()
            .get(range.clone())
            .ok_or(Error::OutOfBounds {
                pos: range.end,
                len,
            })
    }

    /// Bounded reader over `[range.start, range.end)` of the map. Each
    /// reader owns its position, so views never interfere with each other
    /// or with their parent.
    pub fn slice_reader(&self, range: std::ops::Range<usize>) -> Result<WzSliceReader> {
        Ok(WzSliceReader::new(self.get_slice(range)?, &self.keys))
    }

    /// Reader over the whole map; positions are file-absolute.
    pub fn slice_reader_all(&self) -> WzSliceReader {
        WzSliceReader::new(self.map.as_ref(), &self.keys)
    }
}

impl WzBaseReader<Mmap> {
    /// Back a reader by an anonymous map over `buff`, for in-memory archives.
    pub fn from_buff(buff: &[u8]) -> Self {
        let len = buff.len().max(1);
        let mut map = memmap2::MmapMut::map_anon(len).unwrap();
        if !buff.is_empty() {
            map[..buff.len()].copy_from_slice(buff);
        }
        WzBaseReader::new(map.make_read_only().unwrap())
    }
}

impl<T: AsRef<[u8]>> Reader for WzBaseReader<T> {
    #[inline]
    fn get_size(&self) -> usize {
        self.map.as_ref().len()
    }
    #[inline]
    fn read_u8_at(&self, pos: usize) -> Result<u8> {
        self.map.as_ref().pread_with(pos, LE).map_err(Error::from)
    }
    #[inline]
    fn read_u16_at(&self, pos: usize) -> Result<u16> {
        self.map.as_ref().pread_with(pos, LE).map_err(Error::from)
    }
    #[inline]
    fn read_u32_at(&self, pos: usize) -> Result<u32> {
        self.map.as_ref().pread_with(pos, LE).map_err(Error::from)
    }
    #[inline]
    fn read_u64_at(&self, pos: usize) -> Result<u64> {
        self.map.as_ref().pread_with(pos, LE).map_err(Error::from)
    }
    #[inline]
    fn read_i8_at(&self, pos: usize) -> Result<i8> {
        self.map.as_ref().pread_with(pos, LE).map_err(Error::from)
    }
    #[inline]
    fn read_i16_at(&self, pos: usize) -> Result<i16> {
        self.map.as_ref().pread_with(pos, LE).map_err(Error::from)
    }
    #[inline]
    fn read_i32_at(&self, pos: usize) -> Result<i32> {
        self.map.as_ref().pread_with(pos, LE).map_err(Error::from)
    }
    #[inline]
    fn read_i64_at(&self, pos: usize) -> Result<i64> {
        self.map.as_ref().pread_with(pos, LE).map_err(Error::from)
    }
    #[inline]
    fn read_float_at(&self, pos: usize) -> Result<f32> {
        self.map.as_ref().pread_with(pos, LE).map_err(Error::from)
    }
    #[inline]
    fn read_double_at(&self, pos: usize) -> Result<f64> {
        self.map.as_ref().pread_with(pos, LE).map_err(Error::from)
    }
}

/// A bounded view over part of the archive with its own cursor.
///
/// Position 0 is the start of the view, which gives every image sub-stream
/// its own coordinate space. Reads resolve against the underlying slice,
/// never a shared cursor, so independent views are safe to use in parallel.
#[derive(Debug, Clone)]
pub struct WzSliceReader<'a> {
    pub buf: &'a [u8],
    pub pos: Cell<usize>,
    saved_pos: Cell<usize>,
    pub keys: SharedKeystream,
}

impl<'a> WzSliceReader<'a> {
    pub fn new(buf: &'a [u8], keys: &SharedKeystream) -> Self {
        WzSliceReader {
            buf,
            pos: Cell::new(0),
            saved_pos: Cell::new(0),
            keys: SharedKeystream::clone(keys),
        }
    }

    #[inline]
    pub fn get_size(&self) -> usize {
        self.buf.len()
    }
    #[inline]
    pub fn available(&self) -> usize {
        self.buf.len().saturating_sub(self.pos.get())
    }
    #[inline]
    pub fn is_valid_pos(&self, pos: usize) -> bool {
        pos <= self.buf.len()
    }

    #[inline]
    pub fn seek(&self, pos: usize) -> Result<()> {
        if !self.is_valid_pos(pos) {
            return Err(Error::OutOfBounds {
                pos,
                len: self.buf.len(),
            });
        }
        self.pos.set(pos);
        Ok(())
    }
    #[inline]
    pub fn skip(&self, len: usize) -> Result<()> {
        self.seek(self.pos.get().saturating_add(len))
    }

    /// Remember the current position; a single slot, not a stack.
    #[inline]
    pub fn save_pos(&self) {
        self.saved_pos.set(self.pos.get());
    }
    #[inline]
    pub fn restore_pos(&self) {
        self.pos.set(self.saved_pos.get());
    }

    #[inline]
    pub fn read_u8(&self) -> Result<u8> {
        let res = self.read_u8_at(self.pos.get());
        self.pos.set(self.pos.get() + 1);
        res
    }
    #[inline]
    pub fn read_u16(&self) -> Result<u16> {
        let res = self.read_u16_at(self.pos.get());
        self.pos.set(self.pos.get() + 2);
        res
    }
    #[inline]
    pub fn read_u32(&self) -> Result<u32> {
        let res = self.read_u32_at(self.pos.get());
        self.pos.set(self.pos.get() + 4);
        res
    }
    #[inline]
    pub fn read_u64(&self) -> Result<u64> {
        let res = self.read_u64_at(self.pos.get());
        self.pos.set(self.pos.get() + 8);
        res
    }
    #[inline]
    pub fn read_i8(&self) -> Result<i8> {
        let res = self.read_i8_at(self.pos.get());
        self.pos.set(self.pos.get() + 1);
        res
    }
    #[inline]
    pub fn read_i16(&self) -> Result<i16> {
        let res = self.read_i16_at(self.pos.get());
        self.pos.set(self.pos.get() + 2);
        res
    }
    #[inline]
    pub fn read_i32(&self) -> Result<i32> {
        let res = self.read_i32_at(self.pos.get());
        self.pos.set(self.pos.get() + 4);
        res
    }
    #[inline]
    pub fn read_i64(&self) -> Result<i64> {
        let res = self.read_i64_at(self.pos.get());
        self.pos.set(self.pos.get() + 8);
        res
    }
    #[inline]
    pub fn read_float(&self) -> Result<f32> {
        let res = self.read_float_at(self.pos.get());
        self.pos.set(self.pos.get() + 4);
        res
    }
    #[inline]
    pub fn read_double(&self) -> Result<f64> {
        let res = self.read_double_at(self.pos.get());
        self.pos.set(self.pos.get() + 8);
        res
    }

    pub fn read_bytes(&self, len: usize) -> Result<Vec<u8>> {
        let pos = self.pos.get();
        let end = pos.checked_add(len).ok_or(Error::OutOfBounds {
            pos,
            len: self.buf.len(),
        })?;
        let bytes = self
            .buf
            .get(pos..end)
            .ok_or(Error::OutOfBounds {
                pos: end,
                len: self.buf.len(),
            })?
            .to_vec();
        self.pos.set(end);
        Ok(bytes)
    }

    /// Compressed i32: one byte, with `0x80` escaping to a full i32.
    #[inline]
    pub fn read_wz_int(&self) -> Result<i32> {
        let small = self.read_i8()?;
        if small == i8::MIN {
            return self.read_i32();
        }
        Ok(small as i32)
    }

    /// Compressed i64, same escape pattern as [`Self::read_wz_int`].
    #[inline]
    pub fn read_wz_int64(&self) -> Result<i64> {
        let small = self.read_i8()?;
        if small == i8::MIN {
            return self.read_i64();
        }
        Ok(small as i64)
    }

    /// Compressed f32: one signed byte, with `-128` escaping to a full f32.
    #[inline]
    pub fn read_wz_single(&self) -> Result<f32> {
        let small = self.read_i8()?;
        if small == i8::MIN {
            return self.read_float();
        }
        Ok(small as f32)
    }

    /// Length-prefixed string. A negative prefix selects the 8-bit path
    /// (`-128` escapes to an i32 length), a positive one the UTF-16LE path.
    /// Bodies are keystream-XORed from index 0, then unmasked with
    /// `0xAA + i` per byte or `0xAAAA + i` per code unit.
    pub fn read_wz_string(&self) -> Result<String> {
        let small = self.read_i8()?;

        if small == 0 {
            return Ok(String::new());
        }

        if small < 0 {
            let len = if small == i8::MIN {
                self.read_i32()?
            } else {
                -(small as i32)
            };
            if len <= 0 {
                return Ok(String::new());
            }

            let mut bytes = self.read_bytes(len as usize)?;
            decrypt_in_place(&self.keys, &mut bytes);
            for (i, byte) in bytes.iter_mut().enumerate() {
                *byte ^= 0xAA_u8.wrapping_add(i as u8);
            }

            // cp1252 node names decode as latin-1
            Ok(bytes.iter().map(|&b| b as char).collect())
        } else {
            let len = small as usize;
            let mut bytes = self.read_bytes(len * 2)?;
            decrypt_in_place(&self.keys, &mut bytes);

            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .enumerate()
                .map(|(i, pair)| {
                    u16::from_le_bytes([pair[0], pair[1]]) ^ 0xAAAA_u16.wrapping_add(i as u16)
                })
                .collect();

            Ok(String::from_utf16_lossy(&units))
        }
    }

    /// Read a string at `offset` without disturbing the cursor.
    pub fn read_wz_string_at(&self, offset: usize) -> Result<String> {
        self.save_pos();
        let result = self.seek(offset).and_then(|_| self.read_wz_string());
        self.restore_pos();
        result
    }

    /// Object-type tag of an image frame: `0x73` inline, `0x1B` by offset.
    pub fn read_object_type_name(&self) -> Result<String> {
        let flag = self.read_u8()?;
        match flag {
            0x73 => self.read_wz_string(),
            0x1B => {
                let offset = self.read_i32()?;
                self.read_wz_string_at(offset as usize)
            }
            _ => Err(Error::UnexpectedFlag(flag)),
        }
    }

    /// String inside an image frame: `0x00` inline, `0x01` by offset,
    /// `0x04` an 8-byte placeholder that decodes to the empty string.
    pub fn read_image_string(&self) -> Result<String> {
        let flag = self.read_u8()?;
        match flag {
            0x00 => self.read_wz_string(),
            0x01 => {
                let offset = self.read_i32()?;
                self.read_wz_string_at(offset as usize)
            }
            0x04 => {
                self.skip(8)?;
                Ok(String::new())
            }
            _ => Err(Error::UnexpectedFlag(flag)),
        }
    }
}

impl Reader for WzSliceReader<'_> {
    #[inline]
    fn get_size(&self) -> usize {
        self.buf.len()
    }
    #[inline]
    fn read_u8_at(&self, pos: usize) -> Result<u8> {
        self.buf.pread_with(pos, LE).map_err(Error::from)
    }
    #[inline]
    fn read_u16_at(&self, pos: usize) -> Result<u16> {
        self.buf.pread_with(pos, LE).map_err(Error::from)
    }
    #[inline]
    fn read_u32_at(&self, pos: usize) -> Result<u32> {
        self.buf.pread_with(pos, LE).map_err(Error::from)
    }
    #[inline]
    fn read_u64_at(&self, pos: usize) -> Result<u64> {
        self.buf.pread_with(pos, LE).map_err(Error::from)
    }
    #[inline]
    fn read_i8_at(&self, pos: usize) -> Result<i8> {
        self.buf.pread_with(pos, LE).map_err(Error::from)
    }
    #[inline]
    fn read_i16_at(&self, pos: usize) -> Result<i16> {
        self.buf.pread_with(pos, LE).map_err(Error::from)
    }
    #[inline]
    fn read_i32_at(&self, pos: usize) -> Result<i32> {
        self.buf.pread_with(pos, LE).map_err(Error::from)
    }
    #[inline]
    fn read_i64_at(&self, pos: usize) -> Result<i64> {
        self.buf.pread_with(pos, LE).map_err(Error::from)
    }
    #[inline]
    fn read_float_at(&self, pos: usize) -> Result<f32> {
        self.buf.pread_with(pos, LE).map_err(Error::from)
    }
    #[inline]
    fn read_double_at(&self, pos: usize) -> Result<f64> {
        self.buf.pread_with(pos, LE).map_err(Error::from)
    }
}

#[inline]
pub fn read_u16_at(buf: &[u8], pos: usize) -> Result<u16> {
    buf.pread_with(pos, LE).map_err(Error::from)
}
#[inline]
pub fn read_u32_at(buf: &[u8], pos: usize) -> Result<u32> {
    buf.pread_with(pos, LE).map_err(Error::from)
}
#[inline]
pub fn read_i32_at(buf: &[u8], pos: usize) -> Result<i32> {
    buf.pread_with(pos, LE).map_err(Error::from)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Encode `s` the way the 8-bit string path expects it: outer
    /// `0xAA + i` mask first, keystream XOR second.
    pub fn encode_ascii_string(s: &str, keys: &SharedKeystream) -> Vec<u8> {
        let mut keys = keys.write().unwrap();
        keys.ensure_size(s.len());
        s.bytes()
            .enumerate()
            .map(|(i, b)| b ^ 0xAA_u8.wrapping_add(i as u8) ^ keys.at(i))
            .collect()
    }

    /// Same for the UTF-16LE path, one `0xAAAA + i` mask per code unit.
    pub fn encode_unicode_string(s: &str, keys: &SharedKeystream) -> Vec<u8> {
        let units: Vec<u16> = s.encode_utf16().collect();
        let mut keys = keys.write().unwrap();
        keys.ensure_size(units.len() * 2);
        let mut out = Vec::with_capacity(units.len() * 2);
        for (i, unit) in units.iter().enumerate() {
            let masked = unit ^ 0xAAAA_u16.wrapping_add(i as u16);
            let [lo, hi] = masked.to_le_bytes();
            out.push(lo ^ keys.at(i * 2));
            out.push(hi ^ keys.at(i * 2 + 1));
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::test_support::*;
    use super::*;
    use crate::util::crypto::WZ_GMS_IV;

    type WzVecReader = WzBaseReader<Vec<u8>>;

    fn fixture() -> Vec<u8> {
        let mut buf = Vec::new();

        // i16(2), i32(3), i64(4)
        buf.extend_from_slice(&2_i16.to_le_bytes());
        buf.extend_from_slice(&3_i32.to_le_bytes());
        buf.extend_from_slice(&4_i64.to_le_bytes());
        // f32(1.5), f64(2.25)
        buf.extend_from_slice(&1.5_f32.to_le_bytes());
        buf.extend_from_slice(&2.25_f64.to_le_bytes());
        // wz_int 5 / wz_int 256 / wz_int64 -3 / wz_int64 1 << 40
        buf.push(0x05);
        buf.push(0x80);
        buf.extend_from_slice(&256_i32.to_le_bytes());
        buf.extend_from_slice(&(-3_i8).to_le_bytes());
        buf.push(0x80);
        buf.extend_from_slice(&(1_i64 << 40).to_le_bytes());
        // wz_single 7 / wz_single 0.5
        buf.push(0x07);
        buf.push(0x80);
        buf.extend_from_slice(&0.5_f32.to_le_bytes());

        buf
    }

    #[test]
    fn primitive_reads() {
        let reader = WzVecReader::new(fixture());
        let slice = reader.slice_reader_all();

        assert_eq!(slice.read_i16().unwrap(), 2);
        assert_eq!(slice.read_i32().unwrap(), 3);
        assert_eq!(slice.read_i64().unwrap(), 4);
        assert_eq!(slice.read_float().unwrap(), 1.5);
        assert_eq!(slice.read_double().unwrap(), 2.25);
    }

    #[test]
    fn compressed_int_widths() {
        let reader = WzVecReader::new(fixture());
        let slice = reader.slice_reader_all();
        slice.seek(26).unwrap();

        let before = slice.pos.get();
        assert_eq!(slice.read_wz_int().unwrap(), 5);
        assert_eq!(slice.pos.get() - before, 1);

        let before = slice.pos.get();
        assert_eq!(slice.read_wz_int().unwrap(), 256);
        assert_eq!(slice.pos.get() - before, 5);

        assert_eq!(slice.read_wz_int64().unwrap(), -3);
        assert_eq!(slice.read_wz_int64().unwrap(), 1 << 40);
        assert_eq!(slice.read_wz_single().unwrap(), 7.0);
        assert_eq!(slice.read_wz_single().unwrap(), 0.5);
    }

    #[test]
    fn compressed_int_roundtrip_single_byte_range() {
        for v in -127..=127_i32 {
            let buf = vec![v as i8 as u8];
            let reader = WzVecReader::new(buf);
            let slice = reader.slice_reader_all();
            assert_eq!(slice.read_wz_int().unwrap(), v);
            assert_eq!(slice.pos.get(), 1);
        }
    }

    #[test]
    fn known_masked_bytes_decode() {
        // `FE E9 EB`: length 2, bytes e9^0xaa = 'C', eb^0xab = '@'
        let reader = WzVecReader::new(vec![0xFE, 0xE9, 0xEB]);
        let slice = reader.slice_reader_all();
        assert_eq!(slice.read_wz_string().unwrap(), "C@");
    }

    #[test]
    fn ascii_string_roundtrip_plain() {
        let keys = WzKeystream::new([0; 4]).into_shared();
        let mut buf = vec![-11_i8 as u8];
        buf.extend_from_slice(&encode_ascii_string("hello.world", &keys));

        let reader = WzVecReader::new(buf);
        let slice = reader.slice_reader_all();
        assert_eq!(slice.read_wz_string().unwrap(), "hello.world");
    }

    #[test]
    fn ascii_string_roundtrip_encrypted() {
        let keys = WzKeystream::new(WZ_GMS_IV).into_shared();
        let long_name = "a".repeat(200);
        let mut buf = vec![i8::MIN as u8];
        buf.extend_from_slice(&200_i32.to_le_bytes());
        buf.extend_from_slice(&encode_ascii_string(&long_name, &keys));

        let reader = WzVecReader::new(buf).with_keys(WZ_GMS_IV, keys);
        let slice = reader.slice_reader_all();
        assert_eq!(slice.read_wz_string().unwrap(), long_name);
    }

    #[test]
    fn unicode_string_roundtrip_encrypted() {
        let keys = WzKeystream::new(WZ_GMS_IV).into_shared();
        let text = "골드리치의 비밀금고";
        let units = text.encode_utf16().count() as i8;
        let mut buf = vec![units as u8];
        buf.extend_from_slice(&encode_unicode_string(text, &keys));

        let reader = WzVecReader::new(buf).with_keys(WZ_GMS_IV, keys);
        let slice = reader.slice_reader_all();
        assert_eq!(slice.read_wz_string().unwrap(), text);
    }

    #[test]
    fn empty_string() {
        let reader = WzVecReader::new(vec![0x00]);
        let slice = reader.slice_reader_all();
        assert_eq!(slice.read_wz_string().unwrap(), "");
    }

    #[test]
    fn string_block_tags() {
        let keys = WzKeystream::new([0; 4]).into_shared();

        // inline object type name at 0, then one read through the 0x1B tag
        let mut buf = vec![0x73, -4_i8 as u8];
        buf.extend_from_slice(&encode_ascii_string("name", &keys));
        let string_offset = buf.len();
        buf.push(-2_i8 as u8);
        buf.extend_from_slice(&encode_ascii_string("hi", &keys));
        let by_offset = buf.len();
        buf.push(0x1B);
        buf.extend_from_slice(&(string_offset as i32).to_le_bytes());

        let reader = WzVecReader::new(buf);
        let slice = reader.slice_reader_all();

        assert_eq!(slice.read_object_type_name().unwrap(), "name");
        slice.seek(by_offset).unwrap();
        assert_eq!(slice.read_object_type_name().unwrap(), "hi");

        slice.seek(0).unwrap();
        assert!(matches!(
            slice.read_image_string(),
            Err(Error::UnexpectedFlag(0x73))
        ));
    }

    #[test]
    fn image_string_skip_tag() {
        let buf = vec![0x04, 0, 0, 0, 0, 0, 0, 0, 0, 0xFF];
        let reader = WzVecReader::new(buf);
        let slice = reader.slice_reader_all();

        assert_eq!(slice.read_image_string().unwrap(), "");
        assert_eq!(slice.pos.get(), 9);
    }

    #[test]
    fn bounded_views_are_independent() {
        let data: Vec<u8> = (0..32).collect();
        let reader = WzVecReader::new(data);

        let a = reader.slice_reader(4..12).unwrap();
        let b = reader.slice_reader(8..16).unwrap();

        assert_eq!(a.read_u8().unwrap(), 4);
        assert_eq!(b.read_u8().unwrap(), 8);
        assert_eq!(a.read_u8().unwrap(), 5);
        assert_eq!(b.read_u8().unwrap(), 9);
        assert_eq!(a.get_size(), 8);
    }

    #[test]
    fn seek_past_end_fails() {
        let reader = WzVecReader::new(vec![0; 8]);
        let slice = reader.slice_reader_all();

        assert!(slice.seek(8).is_ok());
        assert!(matches!(
            slice.seek(9),
            Err(Error::OutOfBounds { pos: 9, len: 8 })
        ));
        assert!(reader.get_slice(4..10).is_err());
    }
}
