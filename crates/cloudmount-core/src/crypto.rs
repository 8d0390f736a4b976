//! Display-name cipher for discovery payloads
//!
//! Discovery beacons travel unauthenticated on the local network. The
//! node's display name inside them is obscured with the cloud's master key
//! so only members of the same cloud can read it.
//!
//! # Wire Format
//!
//! ```text
//! plaintext  = [random prefix (4 bytes)] [version (1 byte) = 1] [name as UTF-16LE]
//! blob       = AES-256-CBC(plaintext, iv = 0^16, PKCS7)
//! ```
//!
//! The IV is fixed; the random prefix is the only per-call variance. This is
//! obfuscation against casual eavesdropping, not authenticated encryption.

use std::fmt;

use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use crate::error::{CloudError, CloudResult};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Master key size (AES-256)
pub const KEY_SIZE: usize = 32;

/// Random bytes prepended to every encoded name
pub const PREFIX_SIZE: usize = 4;

/// Current name format version
pub const NAME_FORMAT_VERSION: u8 = 1;

const ZERO_IV: [u8; 16] = [0u8; 16];

/// Encodes and decodes node display names with the cloud master key.
///
/// # Example
///
/// ```
/// use cloudmount_core::crypto::NameCipher;
///
/// let key = NameCipher::generate_key();
/// let cipher = NameCipher::new(&key);
///
/// let blob = cipher.encode("Living Room NAS");
/// assert_eq!(cipher.decode(&blob).unwrap(), "Living Room NAS");
/// ```
#[derive(Clone)]
pub struct NameCipher {
    key: [u8; KEY_SIZE],
}

impl NameCipher {
    /// Create a cipher for the given 32-byte master key.
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self { key: *key }
    }

    /// Generate a new random master key.
    pub fn generate_key() -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        rand::rng().fill_bytes(&mut key);
        key
    }

    /// Encode a display name into an opaque blob.
    ///
    /// The blob must be carried as a unit; appending bytes breaks the padding.
    pub fn encode(&self, name: &str) -> Vec<u8> {
        self.encode_with_version(name, NAME_FORMAT_VERSION)
    }

    fn encode_with_version(&self, name: &str, version: u8) -> Vec<u8> {
        let mut plaintext = Vec::with_capacity(PREFIX_SIZE + 1 + name.len() * 2);

        let mut prefix = [0u8; PREFIX_SIZE];
        rand::rng().fill_bytes(&mut prefix);
        plaintext.extend_from_slice(&prefix);
        plaintext.push(version);
        plaintext.extend(name.encode_utf16().flat_map(u16::to_le_bytes));

        Aes256CbcEnc::new(&self.key.into(), &ZERO_IV.into())
            .encrypt_padded_vec_mut::<Pkcs7>(&plaintext)
    }

    /// Decode a blob produced by [`NameCipher::encode`].
    ///
    /// Returns an error for anything that is not a version-1 name under this
    /// key. Callers treat an error as "ignore this peer", never as fatal.
    pub fn decode(&self, blob: &[u8]) -> CloudResult<String> {
        let plaintext = Aes256CbcDec::new(&self.key.into(), &ZERO_IV.into())
            .decrypt_padded_vec_mut::<Pkcs7>(blob)
            .map_err(|e| CloudError::DecryptionFailed(e.to_string()))?;

        if plaintext.len() <= PREFIX_SIZE {
            return Err(CloudError::MalformedName(
                "payload too short to contain a version byte".to_string(),
            ));
        }

        let version = plaintext[PREFIX_SIZE];
        if version != NAME_FORMAT_VERSION {
            return Err(CloudError::NameVersionUnsupported(version));
        }

        let text = &plaintext[PREFIX_SIZE + 1..];
        if text.len() % 2 != 0 {
            return Err(CloudError::MalformedName(
                "odd number of UTF-16 bytes".to_string(),
            ));
        }

        let units: Vec<u16> = text
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        String::from_utf16(&units).map_err(|e| CloudError::MalformedName(e.to_string()))
    }
}

impl fmt::Debug for NameCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameCipher").finish_non_exhaustive()
    }
}

/// Convenience functions for one-off encode/decode.
///
/// For repeated operations with the same key, prefer [`NameCipher`].
pub mod stateless {
    use super::*;

    /// Encode a display name with the given master key.
    pub fn encode(key: &[u8; KEY_SIZE], name: &str) -> Vec<u8> {
        NameCipher::new(key).encode(name)
    }

    /// Decode a name blob with the given master key.
    pub fn decode(key: &[u8; KEY_SIZE], blob: &[u8]) -> CloudResult<String> {
        NameCipher::new(key).decode(blob)
    }
}
