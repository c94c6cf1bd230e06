//! Version resolution for the obfuscated entry offsets.
//!
//! Directory offsets are scrambled with a "hash version" derived from the
//! client patch version by folding its decimal digits. The header only
//! stores a one-byte reduction of that hash, so the concrete version is
//! recovered by enumerating candidates whose reduction matches.

/// Fold the decimal digits of `wz_version` into the hash used by the
/// offset scrambler: `hash = hash * 32 + digit_char + 1` per digit.
pub fn calc_version_hash(wz_version: i32) -> u32 {
    let mut hash: u32 = 0;
    for c in wz_version.to_string().bytes() {
        hash = (hash << 5).wrapping_add(c as u32 + 1);
    }
    hash
}

/// Reduce a hash version to the byte stored in the file header.
pub fn reduce_version_hash(hash: u32) -> u8 {
    let fold = (hash >> 24) ^ (hash >> 16) ^ (hash >> 8) ^ hash;
    0xFF ^ fold as u8
}

/// Enumerates `(wz_version, hash_version)` candidates whose reduced hash
/// equals the encrypted-version byte, in ascending version order. Each
/// [`Self::try_next`] call resumes after the last accepted version.
#[derive(Debug, Clone)]
pub struct OrdinalVersionScan {
    pub encrypted_version: u16,
    next_version: i32,
    current: Option<(i32, u32)>,
}

impl OrdinalVersionScan {
    pub fn new(encrypted_version: u16) -> Self {
        Self {
            encrypted_version,
            next_version: 0,
            current: None,
        }
    }

    pub fn try_next(&mut self) -> bool {
        for version in self.next_version..i16::MAX as i32 {
            let hash = calc_version_hash(version);
            if reduce_version_hash(hash) as u16 == self.encrypted_version {
                self.current = Some((version, hash));
                self.next_version = version + 1;
                return true;
            }
        }
        false
    }

    pub fn wz_version(&self) -> i32 {
        self.current.map(|(v, _)| v).unwrap_or(0)
    }

    pub fn hash_version(&self) -> u32 {
        self.current.map(|(_, h)| h).unwrap_or(0)
    }
}

/// Either a version fixed up front (caller-supplied or probed) or an
/// enumeration driven by the encrypted-version byte.
#[derive(Debug, Clone)]
pub enum WzVersionDetector {
    Fixed { wz_version: i32, hash_version: u32 },
    Ordinal(OrdinalVersionScan),
}

impl WzVersionDetector {
    pub fn fixed(wz_version: i32) -> Self {
        WzVersionDetector::Fixed {
            wz_version,
            hash_version: calc_version_hash(wz_version),
        }
    }

    pub fn ordinal(encrypted_version: u16) -> Self {
        WzVersionDetector::Ordinal(OrdinalVersionScan::new(encrypted_version))
    }

    pub fn wz_version(&self) -> i32 {
        match self {
            WzVersionDetector::Fixed { wz_version, .. } => *wz_version,
            WzVersionDetector::Ordinal(scan) => scan.wz_version(),
        }
    }

    pub fn hash_version(&self) -> u32 {
        match self {
            WzVersionDetector::Fixed { hash_version, .. } => *hash_version,
            WzVersionDetector::Ordinal(scan) => scan.hash_version(),
        }
    }

    /// Advance to the next candidate; a fixed version has none.
    pub fn try_next(&mut self) -> bool {
        match self {
            WzVersionDetector::Fixed { .. } => false,
            WzVersionDetector::Ordinal(scan) => scan.try_next(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn digit_folding() {
        // "113": ((0*32 + 50)*32 + 50)*32 + 52
        assert_eq!(calc_version_hash(113), 52852);
        assert_eq!(calc_version_hash(83), 1876);
        assert_eq!(calc_version_hash(0), 49);
    }

    #[test]
    fn known_reductions() {
        assert_eq!(reduce_version_hash(calc_version_hash(83)), 0xAC);
        assert_eq!(reduce_version_hash(calc_version_hash(33)), 0x4D);
    }

    #[test]
    fn scan_yields_first_matching_version() {
        let mut scan = OrdinalVersionScan::new(0x4D);
        assert!(scan.try_next());
        assert_eq!(scan.wz_version(), 33);
        assert_eq!(scan.hash_version(), 1716);

        let mut scan = OrdinalVersionScan::new(0xAC);
        assert!(scan.try_next());
        assert_eq!(scan.wz_version(), 83);
        assert_eq!(scan.hash_version(), 1876);
    }

    #[test]
    fn every_yield_reduces_back_to_the_stored_byte() {
        let mut scan = OrdinalVersionScan::new(0x4D);
        for _ in 0..5 {
            assert!(scan.try_next());
            assert_eq!(reduce_version_hash(scan.hash_version()), 0x4D);
            assert_eq!(
                calc_version_hash(scan.wz_version()),
                scan.hash_version()
            );
        }
    }

    #[test]
    fn scan_resumes_after_last_accepted() {
        let mut scan = OrdinalVersionScan::new(0x4D);
        assert!(scan.try_next());
        let first = scan.wz_version();
        assert!(scan.try_next());
        assert!(scan.wz_version() > first);
    }

    #[test]
    fn fixed_detector_never_advances() {
        let mut detector = WzVersionDetector::fixed(83);
        assert_eq!(detector.wz_version(), 83);
        assert_eq!(detector.hash_version(), 1876);
        assert!(!detector.try_next());
    }
}
