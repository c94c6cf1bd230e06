use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use crate::util::crypto::{detect_encryption, WzCrypto, WzCryptoKind};
use crate::version::{calc_version_hash, WzVersionDetector};
use crate::{
    directory, header, reader, Reader, WzDirectory, WzHeader, WzNodeArc, WzNodeArcVec,
    WzObjectType, WzReader,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Header(#[from] header::Error),

    #[error("could not classify the file's encryption")]
    EncryptionUnknown,

    #[error("no version candidate produced a consistent directory tree")]
    NoMatchingVersion,

    #[error(transparent)]
    Directory(#[from] directory::Error),

    #[error("binary reading error: {0}")]
    Reader(#[from] reader::Error),
}

/// Resolved facts about an opened archive.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct WzFileMeta {
    pub path: String,
    pub wz_version: i32,
    pub hash_version: u32,
    pub encver_missing: bool,
}

/// An opened archive: header, crypto state, version detector, and the
/// entry point for decoding the root directory tree.
#[derive(Debug, Clone)]
pub struct WzFile {
    pub reader: Arc<WzReader>,
    pub header: WzHeader,
    pub crypto: WzCrypto,
    pub detector: WzVersionDetector,
    pub verify_checksums: bool,
    pub is_parsed: bool,
    pub meta: WzFileMeta,
    /// paths of sibling files merged into this one's tree
    pub merged: Vec<String>,
}

impl WzFile {
    pub fn from_file<P>(path: P) -> Result<WzFile, Error>
    where
        P: AsRef<Path>,
    {
        let file = File::open(&path)?;
        let map = unsafe { Mmap::map(&file)? };
        Self::from_wz_reader(
            WzReader::new(map),
            path.as_ref().to_str().unwrap_or_default(),
        )
    }

    /// Parse the header, classify the encryption, and seed the version
    /// detector. With an encrypted version present the detector advances
    /// once so its first candidate is ready.
    pub fn from_wz_reader(reader: WzReader, path: &str) -> Result<WzFile, Error> {
        let header = WzHeader::from_reader(&reader.slice_reader_all())?;
        let crypto = detect_encryption(&reader.slice_reader_all(), header.data_start)?;
        let reader = reader.with_keys(crypto.kind.iv(), Arc::clone(&crypto.keys));

        let detector = match header.encver {
            Some(encver) => {
                let mut detector = WzVersionDetector::ordinal(encver);
                detector.try_next();
                detector
            }
            // placeholder until the probing pass settles a version
            None => WzVersionDetector::Fixed {
                wz_version: 0,
                hash_version: 0,
            },
        };

        let meta = WzFileMeta {
            path: path.to_string(),
            wz_version: 0,
            hash_version: 0,
            encver_missing: header.encver_missing(),
        };

        Ok(WzFile {
            reader: Arc::new(reader),
            header,
            crypto,
            detector,
            verify_checksums: true,
            is_parsed: false,
            meta,
            merged: Vec::new(),
        })
    }

    /// Fix the version instead of detecting it, e.g. when the caller knows
    /// the client patch level.
    pub fn with_version(mut self, wz_version: i32) -> Self {
        self.detector = WzVersionDetector::fixed(wz_version);
        self
    }

    pub fn with_checksum_verification(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Decode the root directory tree, resolving the version on the way.
    /// Children are returned for the caller to attach under `parent`.
    pub fn parse(&mut self, parent: &WzNodeArc) -> Result<WzNodeArcVec, Error> {
        if self.crypto.kind == WzCryptoKind::Unknown {
            return Err(Error::EncryptionUnknown);
        }

        if self.header.encver_missing() && self.detector.hash_version() == 0 {
            return self.parse_probing_versions(parent);
        }

        let hash = self.detector.hash_version();
        if hash == 0 {
            return Err(Error::NoMatchingVersion);
        }

        let children = self.root_directory(hash).resolve_children(parent)?;
        self.accept_version(self.detector.wz_version(), hash);
        Ok(children)
    }

    /// Without the encrypted-version byte there is nothing to enumerate
    /// from: probe the 64-bit client range first, then the full range,
    /// accepting the first version whose directory tree holds together.
    fn parse_probing_versions(&mut self, parent: &WzNodeArc) -> Result<WzNodeArcVec, Error> {
        for version in (770..780).chain(1..2000) {
            let hash = calc_version_hash(version);
            let dir = self.root_directory(hash);

            if dir.verify_offsets().is_err() {
                continue;
            }

            match dir.resolve_children(parent) {
                Ok(children) if self.first_image_header_is_plausible(&children) => {
                    self.detector = WzVersionDetector::fixed(version);
                    self.accept_version(version, hash);
                    return Ok(children);
                }
                Ok(_) => {
                    tracing::debug!("version {version} decodes but images look wrong");
                }
                Err(err) => {
                    tracing::debug!("version {version} rejected: {err}");
                }
            }
        }

        Err(Error::NoMatchingVersion)
    }

    fn root_directory(&self, hash: u32) -> WzDirectory {
        let data_start = self.header.data_start;
        let block_size = self.reader.get_size().saturating_sub(data_start);
        WzDirectory::new(data_start, block_size, &self.reader)
            .with_hash(hash)
            .with_encver_missing(self.header.encver_missing())
            .with_checksum_verification(self.verify_checksums)
    }

    fn accept_version(&mut self, wz_version: i32, hash_version: u32) {
        self.meta.wz_version = wz_version;
        self.meta.hash_version = hash_version;
        self.is_parsed = true;
    }

    /// A correctly descrambled image starts with a known frame byte; a
    /// wrong hash lands the offset on arbitrary data.
    fn first_image_header_is_plausible(&self, children: &WzNodeArcVec) -> bool {
        let Some(image_offset) = find_first_image_offset(children) else {
            return true;
        };
        matches!(
            self.reader.read_u8_at(image_offset),
            Ok(0x73) | Ok(0x1B) | Ok(0x01)
        )
    }
}

fn find_first_image_offset(children: &WzNodeArcVec) -> Option<usize> {
    for (_, node) in children {
        let read = node.read().unwrap();
        if let WzObjectType::Image(image) = &read.object_type {
            return Some(image.offset);
        }
        let nested: WzNodeArcVec = read
            .children
            .iter()
            .map(|(name, child)| (name.clone(), Arc::clone(child)))
            .collect();
        if let Some(offset) = find_first_image_offset(&nested) {
            return Some(offset);
        }
    }
    None
}

/// Move `other`'s root children under `base` and record the merged
/// sibling, the layout used by multi-part archives (`Map_000.wz`, ...).
pub fn merge_wz_file(base: &WzNodeArc, other: &WzNodeArc) {
    {
        let mut other_write = other.write().unwrap();
        let mut moved = std::mem::take(&mut other_write.children);
        drop(other_write);

        let mut base_write = base.write().unwrap();
        for (name, child) in moved.drain() {
            child.write().unwrap().parent = Arc::downgrade(base);
            base_write.children.insert(name, child);
        }
    }

    let merged_path = {
        let other_read = other.read().unwrap();
        match &other_read.object_type {
            WzObjectType::File(file) => Some(file.meta.path.clone()),
            _ => None,
        }
    };

    if let Some(path) = merged_path {
        let mut base_write = base.write().unwrap();
        if let WzObjectType::File(file) = &mut base_write.object_type {
            file.merged.push(path);
        }
    }
}
