use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes256;
use std::sync::{Arc, RwLock};

/// Keystream grows in multiples of this many bytes.
const KEY_CHUNK: usize = 64;

const AES_BLOCK: usize = 16;

/// AES-256 user key shared by every client variant.
const WZ_AES_USER_KEY: [u8; 32] = [
    0x13, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, //
    0x06, 0x00, 0x00, 0x00, 0xB4, 0x00, 0x00, 0x00, //
    0x1B, 0x00, 0x00, 0x00, 0x0F, 0x00, 0x00, 0x00, //
    0x33, 0x00, 0x00, 0x00, 0x52, 0x00, 0x00, 0x00, //
];

pub type SharedKeystream = Arc<RwLock<WzKeystream>>;

/// Deterministic XOR keystream derived from a 4-byte IV.
///
/// The stream is produced by AES-256-ECB: block 0 encrypts the IV repeated
/// to block size, every following block encrypts the previous output block.
/// An all-zero IV short-circuits to the identity, matching the unencrypted
/// BMS variant.
#[derive(Debug)]
pub struct WzKeystream {
    pub iv: [u8; 4],
    keys: Vec<u8>,
    /// iv == 0, decryption is a no-op
    pub empty_iv: bool,
}

impl WzKeystream {
    pub fn new(iv: [u8; 4]) -> Self {
        Self {
            iv,
            keys: Vec::new(),
            empty_iv: iv == [0; 4],
        }
    }

    pub fn into_shared(self) -> SharedKeystream {
        Arc::new(RwLock::new(self))
    }

    pub fn is_enough(&self, size: usize) -> bool {
        self.keys.len() >= size
    }

    /// Grow the stream to cover at least `size` bytes, rounded up to a
    /// multiple of 64.
    pub fn ensure_size(&mut self, size: usize) {
        if self.empty_iv || self.is_enough(size) {
            return;
        }

        let size = size.div_ceil(KEY_CHUNK) * KEY_CHUNK;
        let start = self.keys.len();
        self.keys.resize(size, 0);

        let cipher = Aes256::new(&WZ_AES_USER_KEY.into());

        for i in (start..size).step_by(AES_BLOCK) {
            let mut block: aes::Block = if i == 0 {
                let mut seed = [0_u8; AES_BLOCK];
                for (j, byte) in seed.iter_mut().enumerate() {
                    *byte = self.iv[j % 4];
                }
                seed.into()
            } else {
                aes::Block::clone_from_slice(&self.keys[i - AES_BLOCK..i])
            };
            cipher.encrypt_block(&mut block);
            self.keys[i..i + AES_BLOCK].copy_from_slice(&block);
        }
    }

    /// Keystream byte at `index`, expanding the stream when needed.
    pub fn at(&mut self, index: usize) -> u8 {
        if self.empty_iv {
            return 0;
        }
        if self.keys.len() <= index {
            self.ensure_size(index + 1);
        }
        self.keys[index]
    }

    pub fn try_at(&self, index: usize) -> Option<u8> {
        if self.empty_iv {
            return Some(0);
        }
        self.keys.get(index).copied()
    }

    /// XOR `data` in place with the stream starting at index 0. The stream
    /// must already cover `data.len()` bytes.
    pub fn decrypt_slice(&self, data: &mut [u8]) {
        if self.empty_iv {
            return;
        }
        data.iter_mut()
            .zip(&self.keys)
            .for_each(|(byte, key)| *byte ^= key);
    }
}

/// XOR `data` in place with the keystream, growing it first when needed.
pub fn decrypt_in_place(keys: &SharedKeystream, data: &mut [u8]) {
    let needs_growth = {
        let read = keys.read().unwrap();
        !read.empty_iv && !read.is_enough(data.len())
    };

    if needs_growth {
        keys.write().unwrap().ensure_size(data.len());
    }

    keys.read().unwrap().decrypt_slice(data);
}
