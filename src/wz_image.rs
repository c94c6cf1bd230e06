use std::path::Path;
use std::sync::Arc;

use crate::property::{WzSubProperty, WzValue};
use crate::util::parse_image::{self, extract_object};
use crate::{reader, WzNode, WzNodeArc, WzNodeArcVec, WzNodeName, WzObjectType, WzReader};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch, stored {stored}, computed {computed}")]
    ChecksumMismatch { stored: i32, computed: u32 },

    #[error("image root is not a property list")]
    UnexpectedRoot,

    #[error(transparent)]
    Frame(#[from] parse_image::Error),

    #[error("binary reading error: {0}")]
    Reader(#[from] reader::Error),
}

/// An image: a sub-stream of the archive holding a typed property tree.
///
/// The tree is not decoded when the directory entry is read; it
/// materializes on the first [`crate::WzNode::parse`] of the image's node,
/// optionally after a byte-checksum verification of the sub-stream.
#[derive(Debug, Clone)]
pub struct WzImage {
    pub reader: Arc<WzReader>,
    pub name: WzNodeName,
    /// file-absolute start of the sub-stream
    pub offset: usize,
    pub block_size: usize,
    pub checksum: i32,
    pub hashed_offset: u32,
    pub hashed_offset_pos: u32,
    pub verify_checksum: bool,
    pub checksum_checked: bool,
    pub is_parsed: bool,
}

impl WzImage {
    pub fn new(
        name: &WzNodeName,
        offset: usize,
        block_size: usize,
        checksum: i32,
        reader: &Arc<WzReader>,
    ) -> Self {
        Self {
            reader: Arc::clone(reader),
            name: name.clone(),
            offset,
            block_size,
            checksum,
            hashed_offset: 0,
            hashed_offset_pos: 0,
            verify_checksum: false,
            checksum_checked: false,
            is_parsed: false,
        }
    }

    pub fn with_hashed_offset(mut self, hashed_offset: u32, offset_pos: u32) -> Self {
        self.hashed_offset = hashed_offset;
        self.hashed_offset_pos = offset_pos;
        self
    }

    pub fn with_checksum_verification(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }

    /// Open a standalone `.img` file, e.g. one dumped out of an archive.
    pub fn from_file<P>(path: P, iv: [u8; 4]) -> Result<Self, Error>
    where
        P: AsRef<Path>,
    {
        let name = path
            .as_ref()
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default()
            .to_string();

        let file = std::fs::File::open(&path)?;
        let map = unsafe { memmap2::Mmap::map(&file)? };
        let block_size = map.len();
        let reader = WzReader::new(map).with_iv(iv);

        Ok(WzImage {
            reader: Arc::new(reader),
            name: name.into(),
            offset: 0,
            block_size,
            checksum: 0,
            hashed_offset: 0,
            hashed_offset_pos: 0,
            verify_checksum: false,
            checksum_checked: false,
            is_parsed: false,
        })
    }

    /// Sum of the sub-stream's raw bytes as a wrapping unsigned 32-bit
    /// accumulator.
    pub fn calc_checksum(&self) -> Result<u32, Error> {
        let bytes = self
            .reader
            .get_slice(self.offset..self.offset + self.block_size)?;
        Ok(bytes
            .iter()
            .fold(0_u32, |acc, &b| acc.wrapping_add(b as u32)))
    }

    /// Decode the property tree. Children are returned rather than
    /// attached, so the caller can hold the image node's lock; the caller
    /// flips `is_parsed` once they are in place.
    pub fn resolve_children(&mut self, parent: &WzNodeArc) -> Result<WzNodeArcVec, Error> {
        if self.verify_checksum && !self.checksum_checked {
            let computed = self.calc_checksum()?;
            if computed != self.checksum as u32 {
                return Err(Error::ChecksumMismatch {
                    stored: self.checksum,
                    computed,
                });
            }
            self.checksum_checked = true;
        }

        let reader = self
            .reader
            .slice_reader(self.offset..self.offset + self.block_size)?;

        let scratch = WzNode::from_str("", WzValue::Null, Some(parent)).into_lock();
        extract_object(
            &self.reader,
            &reader,
            self.offset,
            self.block_size,
            &scratch,
        )?;

        let mut scratch_write = scratch.write().unwrap();
        if !matches!(
            scratch_write.object_type,
            WzObjectType::Property(WzSubProperty::Property)
        ) {
            return Err(Error::UnexpectedRoot);
        }

        // the decoded children belong to the image node itself
        let children: WzNodeArcVec = scratch_write
            .children
            .drain()
            .map(|(name, child)| {
                child.write().unwrap().parent = Arc::downgrade(parent);
                (name, child)
            })
            .collect();

        Ok(children)
    }
}
