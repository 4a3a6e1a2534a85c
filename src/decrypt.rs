//! Track decryption for Deezer's protected media content.
//!
//! Deezer uses a striped encryption pattern:
//! * Content is divided into 2KB blocks
//! * Every third block is encrypted, starting with the first
//! * Encryption uses Blowfish in CBC mode with a fixed IV
//! * Trailing partial blocks are never encrypted
//!
//! The decryptor here operates on the write side of a download: blocks are
//! decrypted in order as they are streamed to disk.
//!
//! # Security
//!
//! To comply with Deezer's Terms of Service, no decryption keys are included
//! in this code. The master key must be provided externally (configuration),
//! or extracted from the web player at runtime.

use std::{ops::Deref, str::FromStr};

use blowfish::{cipher::BlockDecryptMut, cipher::KeyIvInit, Blowfish};
use cbc::cipher::block_padding::NoPadding;
use md5::{Digest, Md5};

use crate::error::{Error, Result};

/// Length of decryption keys in bytes.
pub const KEY_LENGTH: usize = 16;

/// Size of each stripe block in bytes (2KB).
pub const BLOCK_SIZE: usize = 2 * 1024;

/// Number of blocks in a stripe; every stripe's first block is encrypted.
const STRIPE_COUNT: u64 = 3;

/// Fixed IV for CBC decryption.
const CBC_BF_IV: &[u8; 8] = b"\x00\x01\x02\x03\x04\x05\x06\x07";

/// Raw key bytes.
pub type RawKey = [u8; KEY_LENGTH];

/// Validated decryption key.
///
/// Ensures keys are the correct length for use with Blowfish.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Key(RawKey);

/// Parses a string into a decryption key.
///
/// # Errors
///
/// Returns `ErrorKind::Config` if the string length isn't exactly 16 bytes.
impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let len = s.len();
        if len != KEY_LENGTH {
            return Err(Error::config(format!(
                "key length is {len} but should be {KEY_LENGTH}",
            )));
        }

        let bytes = s.as_bytes();
        let mut key = [0; KEY_LENGTH];
        key.copy_from_slice(bytes);

        Ok(Self(key))
    }
}

/// Provides read-only access to the raw key bytes.
impl Deref for Key {
    type Target = RawKey;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Sequential block decryptor for a single track.
///
/// Holds the track-specific key and decrypts stripe blocks in place as the
/// byte transfer hands them over.
pub struct Decryptor {
    key: Key,
}

impl Decryptor {
    /// Creates a decryptor for a track.
    ///
    /// # Arguments
    ///
    /// * `track_id` - provider identifier of the track
    /// * `salt` - master decryption key
    #[must_use]
    pub fn new(track_id: &str, salt: &Key) -> Self {
        Self {
            key: Self::key_for_track_id(track_id, salt),
        }
    }

    /// Derives a track-specific decryption key.
    ///
    /// The key is generated by XOR-ing the two halves of the MD5 hash of
    /// the track ID with the master key.
    #[must_use]
    pub fn key_for_track_id(track_id: &str, salt: &Key) -> Key {
        let track_hash = format!("{:x}", Md5::digest(track_id));
        let track_hash = track_hash.as_bytes();

        let mut key = RawKey::default();
        for i in 0..KEY_LENGTH {
            key[i] = track_hash[i] ^ track_hash[i + KEY_LENGTH] ^ salt[i];
        }
        Key(key)
    }

    /// Whether the block at `index` is on an encrypted stripe position.
    #[must_use]
    pub fn is_encrypted_block(index: u64) -> bool {
        index % STRIPE_COUNT == 0
    }

    /// Decrypts the block at `index` in place.
    ///
    /// Blocks that are off-stripe or shorter than a full block pass through
    /// unchanged, matching the wire format.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Parse` if the cipher rejects the block.
    pub fn decrypt_block(&self, index: u64, block: &mut [u8]) -> Result<()> {
        if !Self::is_encrypted_block(index) || block.len() != BLOCK_SIZE {
            return Ok(());
        }

        let cipher = cbc::Decryptor::<Blowfish>::new_from_slices(&*self.key, CBC_BF_IV)
            .map_err(|e| Error::parse(e.to_string()))?;
        cipher
            .decrypt_padded_mut::<NoPadding>(block)
            .map_err(|e| Error::parse(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_requires_exact_length() {
        assert!("1234567890123456".parse::<Key>().is_ok());
        assert!("12345".parse::<Key>().is_err());
        assert!("12345678901234567".parse::<Key>().is_err());
    }

    #[test]
    fn track_key_is_deterministic() {
        let salt: Key = "0123456789abcdef".parse().unwrap();
        let a = Decryptor::key_for_track_id("3135556", &salt);
        let b = Decryptor::key_for_track_id("3135556", &salt);
        assert_eq!(a, b);
        assert_ne!(a, Decryptor::key_for_track_id("3135557", &salt));
    }

    #[test]
    fn stripe_pattern_marks_every_third_block() {
        assert!(Decryptor::is_encrypted_block(0));
        assert!(!Decryptor::is_encrypted_block(1));
        assert!(!Decryptor::is_encrypted_block(2));
        assert!(Decryptor::is_encrypted_block(3));
    }

    #[test]
    fn partial_blocks_pass_through() {
        let salt: Key = "0123456789abcdef".parse().unwrap();
        let decryptor = Decryptor::new("1", &salt);
        let mut partial = vec![0xAAu8; 100];
        let before = partial.clone();
        decryptor.decrypt_block(0, &mut partial).unwrap();
        assert_eq!(partial, before);
    }
}
