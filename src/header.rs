use crate::reader::{self, Reader, WzSliceReader};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid file signature, expected PKG1")]
    InvalidSignature,
    #[error(transparent)]
    Reader(#[from] reader::Error),
}

/// Parsed `PKG1` file header.
///
/// `data_start` is where the root directory begins: right after the header,
/// plus the two encrypted-version bytes when that field is present.
#[derive(Debug, Clone, Default)]
pub struct WzHeader {
    pub ident: String,
    pub data_size: i64,
    pub header_size: i32,
    pub copyright: String,
    /// The u16 after the header block. 64-bit clients dropped it; `None`
    /// marks that capability.
    pub encver: Option<u16>,
    pub data_start: usize,
}

impl WzHeader {
    pub const MAGIC: [u8; 4] = *b"PKG1";

    pub fn encver_missing(&self) -> bool {
        self.encver.is_none()
    }

    pub fn from_reader(reader: &WzSliceReader) -> Result<Self, Error> {
        reader.seek(0)?;

        let ident = reader.read_bytes(4)?;
        if ident != Self::MAGIC {
            return Err(Error::InvalidSignature);
        }

        let data_size = reader.read_i64()?;
        let header_size = reader.read_i32()?;

        let copyright_len = (header_size.max(0) as usize).saturating_sub(reader.pos.get());
        let copyright = reader
            .read_bytes(copyright_len)?
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect();

        let encver = Self::read_encver(reader, data_size, header_size as usize)?;

        let data_start = header_size as usize + if encver.is_some() { 2 } else { 0 };

        Ok(WzHeader {
            ident: String::from_utf8_lossy(&ident).to_string(),
            data_size,
            header_size,
            copyright,
            encver,
            data_start,
        })
    }

    /// The encrypted version is absent when the stored u16 cannot be one:
    /// a value above 0xFF, or the `0x80` pattern that decodes as a
    /// plausible compressed property count. The count condition is kept
    /// exactly as the client family checks it.
    fn read_encver(
        reader: &WzSliceReader,
        data_size: i64,
        header_size: usize,
    ) -> Result<Option<u16>, Error> {
        if data_size < 2 {
            return Ok(None);
        }

        let encver = reader.read_u16_at(header_size)?;
        if encver > 0xFF {
            return Ok(None);
        }
        if encver == 0x80 && data_size >= 5 {
            reader.seek(header_size)?;
            let prop_count = reader.read_wz_int()?;
            if prop_count > 0 && (prop_count & 0xFF) == 0 && prop_count <= 0xFFFF {
                return Ok(None);
            }
        }

        Ok(Some(encver))
    }
}
