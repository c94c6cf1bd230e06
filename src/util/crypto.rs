use crate::reader::{self, WzSliceReader};
use crate::util::keystream::{SharedKeystream, WzKeystream};
use regex::Regex;
use std::sync::LazyLock;

/// BMS and other unencrypted variants.
pub const WZ_BMS_IV: [u8; 4] = [0, 0, 0, 0];
/// KMS / 메이플스토리.
pub const WZ_KMS_IV: [u8; 4] = [0xB9, 0x7D, 0x63, 0xE9];
/// Old global MapleStory.
pub const WZ_GMS_IV: [u8; 4] = [0x4D, 0x23, 0xC7, 0x2B];

static NODE_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_,]+$").unwrap());

/// Client variant the archive was encrypted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WzCryptoKind {
    #[default]
    Unknown,
    Bms,
    Kms,
    Gms,
}

impl WzCryptoKind {
    pub fn iv(&self) -> [u8; 4] {
        match self {
            WzCryptoKind::Kms => WZ_KMS_IV,
            WzCryptoKind::Gms => WZ_GMS_IV,
            _ => WZ_BMS_IV,
        }
    }
}

/// Detected variant plus the keystream shared by every reader of the file.
#[derive(Debug, Clone)]
pub struct WzCrypto {
    pub kind: WzCryptoKind,
    pub keys: SharedKeystream,
}

impl WzCrypto {
    pub fn unknown() -> Self {
        Self::with_kind(WzCryptoKind::Unknown)
    }

    pub fn with_kind(kind: WzCryptoKind) -> Self {
        Self {
            kind,
            keys: WzKeystream::new(kind.iv()).into_shared(),
        }
    }
}

/// A node name a real client would produce. MSEA 225 ships a node named
/// `Base,Character,Effect,...`, hence the comma.
pub fn is_legal_node_name(name: &str) -> bool {
    if name.ends_with(".img") || name.ends_with(".lua") {
        return true;
    }
    NODE_NAME_PATTERN.is_match(name)
}

/// Classify the archive's encryption by sampling the first directory-entry
/// name at `data_start` and testing it against each candidate keystream in
/// BMS, KMS, GMS order.
///
/// The returned crypto stays [`WzCryptoKind::Unknown`] when no candidate
/// yields a legal name; callers treat that as fatal before any directory
/// read.
pub fn detect_encryption(
    reader: &WzSliceReader,
    data_start: usize,
) -> Result<WzCrypto, reader::Error> {
    reader.save_pos();
    let sample = sample_first_entry_name(reader, data_start);
    reader.restore_pos();

    let sample = match sample? {
        Some(sample) => sample,
        None => {
            tracing::debug!("file holds no readable entry name to sample");
            return Ok(WzCrypto::unknown());
        }
    };

    for kind in [WzCryptoKind::Bms, WzCryptoKind::Kms, WzCryptoKind::Gms] {
        let mut keys = WzKeystream::new(kind.iv());
        keys.ensure_size(sample.len());

        let mut decrypted = sample.clone();
        keys.decrypt_slice(&mut decrypted);

        let name: String = decrypted.iter().map(|&b| b as char).collect();
        if is_legal_node_name(&name) {
            return Ok(WzCrypto {
                kind,
                keys: keys.into_shared(),
            });
        }
        tracing::debug!("rejected {kind:?} candidate, sample decodes to {name:?}");
    }

    Ok(WzCrypto::unknown())
}

/// Raw bytes of the first entry name with only the outer `0xAA + i` mask
/// removed; the keystream layer is left for the caller to probe.
fn sample_first_entry_name(
    reader: &WzSliceReader,
    data_start: usize,
) -> Result<Option<Vec<u8>>, reader::Error> {
    reader.seek(data_start)?;

    let entry_count = reader.read_wz_int()?;
    if entry_count <= 0 {
        return Ok(None);
    }

    // entry tag byte
    reader.skip(1)?;

    let len = -(reader.read_i8()? as i32);
    if len <= 0 {
        return Ok(None);
    }

    let mut bytes = reader.read_bytes(len as usize)?;
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte ^= 0xAA_u8.wrapping_add(i as u8);
    }

    Ok(Some(bytes))
}
