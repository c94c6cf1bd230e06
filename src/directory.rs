use std::sync::Arc;

use crate::{
    reader, Reader, WzImage, WzNode, WzNodeArc, WzNodeArcVec, WzNodeName, WzReader, WzSliceReader,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown directory entry tag {0:#04x} at position {1}")]
    UnknownEntryTag(u8, usize),

    #[error("implausible entry count {0}, likely a wrong version hash or key")]
    InvalidEntryCount(i32),

    #[error("entry {0} points outside the file")]
    InvalidEntryOffset(String),

    #[error("binary reading error: {0}")]
    Reader(#[from] reader::Error),
}

/// File position the offset scrambler anchors on. Retail headers place the
/// data section at 0x3C, and the constants are baked into the clients.
const OFFSET_ANCHOR: u32 = 0x3C;
const OFFSET_MAGIC: u32 = 0x581C3F6D;
const OFFSET_TAIL: u32 = 0x78;

/// Recover a file-absolute offset from the scrambled `u32` stored in a
/// directory entry. `offset_pos` is the file position the scrambled field
/// was read from. All arithmetic wraps mod 2^32.
pub fn resolve_entry_offset(offset_pos: u32, hashed_offset: u32, hash_version: u32) -> u32 {
    let t = offset_pos.wrapping_sub(OFFSET_ANCHOR) ^ 0xFFFF_FFFF;
    let t = t.wrapping_mul(hash_version);
    let t = t.wrapping_sub(OFFSET_MAGIC);
    let t = t.rotate_left(t & 0x1F);
    let t = t ^ hashed_offset;
    t.wrapping_add(OFFSET_TAIL)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WzEntryKind {
    /// An image whose name lives at an earlier position in the file.
    NameAtOffset,
    Directory,
    Image,
}

#[derive(Debug)]
struct WzDirEntry {
    kind: WzEntryKind,
    name: WzNodeName,
    size: usize,
    checksum: i32,
    hashed_offset: u32,
    offset_pos: u32,
    offset: usize,
}

/// A directory record of the archive.
///
/// The root directory starts at the header's data-start position;
/// sub-directory records follow their parent's entry list back to back, so
/// the whole tree is decoded in one forward pass over the same reader.
#[derive(Debug, Clone)]
pub struct WzDirectory {
    pub reader: Arc<WzReader>,
    pub offset: usize,
    pub block_size: usize,
    pub checksum: i32,
    pub hash: u32,
    pub encver_missing: bool,
    pub verify_checksums: bool,
    pub is_parsed: bool,
}

impl WzDirectory {
    pub fn new(offset: usize, block_size: usize, reader: &Arc<WzReader>) -> Self {
        Self {
            reader: Arc::clone(reader),
            offset,
            block_size,
            checksum: 0,
            hash: 0,
            encver_missing: false,
            verify_checksums: false,
            is_parsed: false,
        }
    }

    pub fn with_hash(mut self, hash: u32) -> Self {
        self.hash = hash;
        self
    }

    pub fn with_encver_missing(mut self, missing: bool) -> Self {
        self.encver_missing = missing;
        self
    }

    pub fn with_checksum_verification(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Decode this directory's entries and everything below them.
    pub fn resolve_children(&self, parent: &WzNodeArc) -> Result<WzNodeArcVec, Error> {
        let reader = self.reader.slice_reader_all();
        reader.seek(self.offset)?;
        self.read_children(&reader, parent)
    }

    /// Scan this directory's own entry list, checking that every resolved
    /// offset lands inside the file. Cheap validity probe for version
    /// candidates; builds no nodes.
    pub fn verify_offsets(&self) -> Result<(), Error> {
        let reader = self.reader.slice_reader_all();
        reader.seek(self.offset)?;

        let entry_count = reader.read_wz_int()?;
        if !(0..=1_000_000).contains(&entry_count) {
            return Err(Error::InvalidEntryCount(entry_count));
        }

        for _ in 0..entry_count {
            let entry = self.read_entry(&reader)?;
            self.check_entry_bounds(&entry)?;
        }

        Ok(())
    }

    fn read_children(
        &self,
        reader: &WzSliceReader,
        parent: &WzNodeArc,
    ) -> Result<WzNodeArcVec, Error> {
        let entry_count = reader.read_wz_int()?;
        if !(0..=1_000_000).contains(&entry_count) {
            return Err(Error::InvalidEntryCount(entry_count));
        }

        let mut nodes: WzNodeArcVec = Vec::with_capacity(entry_count as usize);
        let mut pending_dirs: Vec<WzDirEntry> = Vec::new();

        for _ in 0..entry_count {
            let entry = self.read_entry(reader)?;
            self.check_entry_bounds(&entry)?;

            match entry.kind {
                WzEntryKind::Directory => pending_dirs.push(entry),
                WzEntryKind::Image | WzEntryKind::NameAtOffset => {
                    let image =
                        WzImage::new(&entry.name, entry.offset, entry.size, entry.checksum, &self.reader)
                            .with_hashed_offset(entry.hashed_offset, entry.offset_pos)
                            .with_checksum_verification(self.verify_checksums);
                    let node = WzNode::new(&entry.name, image, Some(parent)).into_lock();
                    nodes.push((entry.name, node));
                }
            }
        }

        // sub-directory records continue right here, in listing order
        for entry in pending_dirs {
            let sub_dir = WzDirectory {
                reader: Arc::clone(&self.reader),
                offset: entry.offset,
                block_size: entry.size,
                checksum: entry.checksum,
                hash: self.hash,
                encver_missing: self.encver_missing,
                verify_checksums: self.verify_checksums,
                is_parsed: true,
            };
            let node = WzNode::new(&entry.name, sub_dir, Some(parent)).into_lock();

            let children = self.read_children(reader, &node)?;
            {
                let mut write = node.write().unwrap();
                write.children.reserve(children.len());
                for (name, child) in children {
                    write.children.insert(name, child);
                }
            }

            nodes.push((entry.name, node));
        }

        Ok(nodes)
    }

    fn read_entry(&self, reader: &WzSliceReader) -> Result<WzDirEntry, Error> {
        let tag = reader.read_u8()?;
        let kind = match tag {
            0x02 => WzEntryKind::NameAtOffset,
            0x03 => WzEntryKind::Directory,
            0x04 => WzEntryKind::Image,
            _ => return Err(Error::UnknownEntryTag(tag, reader.pos.get())),
        };

        let name: WzNodeName = match kind {
            WzEntryKind::NameAtOffset => {
                let string_offset = reader.read_i32()?;
                let correction: i64 = if self.encver_missing { 2 } else { -1 };
                let name_at = usize::try_from(string_offset as i64 + correction).map_err(|_| {
                    reader::Error::OutOfBounds {
                        pos: 0,
                        len: reader.get_size(),
                    }
                })?;
                reader.read_wz_string_at(name_at)?.into()
            }
            _ => reader.read_wz_string()?.into(),
        };

        let size = reader.read_wz_int()?.max(0) as usize;
        let checksum = reader.read_wz_int()?;
        let offset_pos = reader.pos.get() as u32;
        let hashed_offset = reader.read_u32()?;
        let offset = resolve_entry_offset(offset_pos, hashed_offset, self.hash) as usize;

        Ok(WzDirEntry {
            kind,
            name,
            size,
            checksum,
            hashed_offset,
            offset_pos,
            offset,
        })
    }

    fn check_entry_bounds(&self, entry: &WzDirEntry) -> Result<(), Error> {
        let end = entry.offset.checked_add(entry.size);
        match end {
            Some(end) if end <= self.reader.get_size() => Ok(()),
            _ => Err(Error::InvalidEntryOffset(entry.name.to_string())),
        }
    }
}
