//! Value encryption module
//!
//! Provides AES-256-CBC (PKCS7) encryption for sensitive configuration values.
//!
//! The stored format is:
//! - the 2-character marker [`CIPHER_MARKER`]
//! - base64 of the CBC ciphertext
//!
//! The plaintext may be gzip-compressed before encryption; decryption detects
//! the gzip magic and inflates transparently. Values without the marker are
//! plaintext and pass through decryption unchanged, so tables holding a mix of
//! legacy plaintext and encrypted rows can be read with one code path.

use std::io::{Read, Write};

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Prefix that marks a value as encrypted.
pub const CIPHER_MARKER: &str = "**";

/// Key length for AES-256.
pub const KEY_LEN: usize = 32;

const IV_LEN: usize = 16;
const KEY_PAD_BYTE: u8 = b'0';
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Error types for encryption operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Base64 decode error: {0}")]
    Base64Error(String),

    #[error("Compression error: {0}")]
    CompressionError(String),
}

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Derive the 32-byte AES key for a node.
///
/// The key material is `prefix + level_value`, right-padded with ASCII `'0'`
/// or truncated to exactly 32 bytes. Existing encrypted rows depend on this
/// exact byte layout.
pub fn derive_key(prefix: &str, level_value: &str) -> [u8; KEY_LEN] {
    let mut key = [KEY_PAD_BYTE; KEY_LEN];
    let material = prefix.bytes().chain(level_value.bytes());
    for (slot, byte) in key.iter_mut().zip(material) {
        *slot = byte;
    }
    key
}

/// Check whether a stored value carries the cipher marker
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(CIPHER_MARKER)
}

/// Encrypt a plaintext value with the given key.
///
/// Values that already carry the marker are returned unchanged.
pub fn encrypt_value(plaintext: &str, key: &[u8; KEY_LEN], gzip: bool) -> CryptoResult<String> {
    if is_encrypted(plaintext) {
        return Ok(plaintext.to_string());
    }

    let payload = if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(plaintext.as_bytes())
            .map_err(|e| CryptoError::CompressionError(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| CryptoError::CompressionError(e.to_string()))?
    } else {
        plaintext.as_bytes().to_vec()
    };

    let cipher = Aes256CbcEnc::new_from_slices(key, &key[..IV_LEN])
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(&payload);

    Ok(format!("{}{}", CIPHER_MARKER, BASE64.encode(ciphertext)))
}

/// Decrypt a stored value with the given key.
///
/// A value without the marker is returned as-is.
pub fn decrypt_value(stored: &str, key: &[u8; KEY_LEN]) -> CryptoResult<String> {
    let Some(encoded) = stored.strip_prefix(CIPHER_MARKER) else {
        return Ok(stored.to_string());
    };

    let ciphertext = BASE64
        .decode(encoded)
        .map_err(|e| CryptoError::Base64Error(e.to_string()))?;

    let cipher = Aes256CbcDec::new_from_slices(key, &key[..IV_LEN])
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
    let payload = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

    let plain = if payload.starts_with(&GZIP_MAGIC) {
        let mut inflated = Vec::new();
        GzDecoder::new(payload.as_slice())
            .read_to_end(&mut inflated)
            .map_err(|e| CryptoError::DecryptionFailed(format!("gunzip: {}", e)))?;
        inflated
    } else {
        payload
    };

    String::from_utf8(plain)
        .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
}

/// Per-node value codec.
///
/// Holds the configured key prefix; each call derives the node key from the
/// node's own `level_value`.
#[derive(Clone, Debug)]
pub struct ValueCodec {
    key_prefix: String,
    gzip: bool,
}

impl ValueCodec {
    pub fn new(key_prefix: impl Into<String>, gzip: bool) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            gzip,
        }
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn gzip(&self) -> bool {
        self.gzip
    }

    pub fn encrypt(&self, plaintext: &str, level_value: &str) -> CryptoResult<String> {
        encrypt_value(
            plaintext,
            &derive_key(&self.key_prefix, level_value),
            self.gzip,
        )
    }

    pub fn decrypt(&self, stored: &str, level_value: &str) -> CryptoResult<String> {
        decrypt_value(stored, &derive_key(&self.key_prefix, level_value))
    }
}
