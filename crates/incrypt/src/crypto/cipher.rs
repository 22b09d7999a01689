//! AES-256-GCM sealing and opening of the built-in ciphertext layout.
//!
//! The binary layout shared by tags `1` and `2` is:
//!
//! ```text
//! salt (64) | iv (12) | ciphertext (n) | auth tag (16)
//! ```
//!
//! AES-GCM appends the tag to the ciphertext, so `ciphertext` below always
//! carries the trailing 16 tag bytes.

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use common::CryptError;
use thiserror::Error;

use super::kdf::KeyBytes;
use super::{IV_LEN, KEY_LEN, SALT_LEN, TAG_LEN};

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// Key material has the wrong length.
    #[error("invalid key length: expected {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    /// AES-GCM authentication failed (wrong key or tampered data).
    #[error("bad auth tag")]
    AeadFailure,

    /// The payload is shorter than salt + iv + tag.
    #[error("ciphertext too short: {0} bytes")]
    Truncated(usize),

    /// The payload is not valid hex/base64, or the plaintext is not UTF-8.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// The blocking key-derivation task did not complete.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

impl From<CipherError> for CryptError {
    fn from(e: CipherError) -> Self {
        CryptError::Crypto(e.to_string())
    }
}

/// A parsed built-in payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPayload {
    /// PBKDF2 salt (also present, unused, for raw-key secrets).
    pub salt: [u8; SALT_LEN],
    /// AES-GCM nonce.
    pub iv: [u8; IV_LEN],
    /// Ciphertext followed by the authentication tag.
    pub ciphertext: Vec<u8>,
}

impl SealedPayload {
    /// Concatenate `salt || iv || ciphertext || tag`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SALT_LEN + IV_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Split a decoded payload back into its parts.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Truncated`] if `bytes` cannot hold a salt, an IV
    /// and a tag.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        if bytes.len() < SALT_LEN + IV_LEN + TAG_LEN {
            return Err(CipherError::Truncated(bytes.len()));
        }
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[..SALT_LEN]);
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&bytes[SALT_LEN..SALT_LEN + IV_LEN]);
        Ok(Self {
            salt,
            iv,
            ciphertext: bytes[SALT_LEN + IV_LEN..].to_vec(),
        })
    }
}

/// Fresh 512-bit salt from the OS CSPRNG.
pub fn random_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Fresh 96-bit IV from the OS CSPRNG.
pub fn random_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Encrypt `plaintext` under `key` with the given salt and IV.
///
/// # Errors
///
/// Returns [`CipherError::AeadFailure`] on an internal AEAD error (unreachable
/// with a valid key and nonce).
pub fn seal(
    plaintext: &[u8],
    key: &KeyBytes,
    salt: [u8; SALT_LEN],
    iv: [u8; IV_LEN],
) -> Result<SealedPayload, CipherError> {
    let cipher = build_cipher(key.as_slice())?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CipherError::AeadFailure)?;
    Ok(SealedPayload {
        salt,
        iv,
        ciphertext,
    })
}

/// Decrypt and authenticate a [`SealedPayload`].
///
/// # Errors
///
/// Returns [`CipherError::AeadFailure`] if authentication fails.
pub fn open(payload: &SealedPayload, key: &KeyBytes) -> Result<Vec<u8>, CipherError> {
    let cipher = build_cipher(key.as_slice())?;
    cipher
        .decrypt(Nonce::from_slice(&payload.iv), payload.ciphertext.as_ref())
        .map_err(|_| CipherError::AeadFailure)
}

fn build_cipher(key: &[u8]) -> Result<Aes256Gcm, CipherError> {
    if key.len() != KEY_LEN {
        return Err(CipherError::InvalidKeyLength(key.len()));
    }
    Aes256Gcm::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength(key.len()))
}
