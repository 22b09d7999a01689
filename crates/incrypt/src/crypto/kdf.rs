//! Key derivation for the built-in ciphertext tags.
//!
//! Generic secrets are stretched with PBKDF2-HMAC-SHA512 over the per-message
//! salt. Raw-key secrets are base64 text whose decoded bytes are the AES key.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::protocol::{SecretRecord, SecretRole};
use hmac::Hmac;
use sha2::Sha512;

use super::cipher::CipherError;
use super::{KEY_LEN, PBKDF2_ITERATIONS, SALT_LEN};

/// Fixed-size key buffer that holds exactly [`KEY_LEN`] bytes.
///
/// When this type is dropped, the memory is overwritten with zeroes to
/// minimise the window during which key material lives in RAM.
pub struct KeyBytes(Box<[u8; KEY_LEN]>);

impl KeyBytes {
    /// Copy `bytes` into a new key buffer.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKeyLength`] unless `bytes` is exactly
    /// [`KEY_LEN`] long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CipherError> {
        if bytes.len() != KEY_LEN {
            return Err(CipherError::InvalidKeyLength(bytes.len()));
        }
        let mut buf = Box::new([0u8; KEY_LEN]);
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Borrow the key bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.0[..]
    }
}

impl Drop for KeyBytes {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for KeyBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.write_str("KeyBytes([REDACTED])")
    }
}

/// PBKDF2-HMAC-SHA512, [`PBKDF2_ITERATIONS`] rounds, 32-byte output.
pub fn pbkdf2_sha512(password: &[u8], salt: &[u8]) -> Result<KeyBytes, CipherError> {
    let mut buf = Box::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2::<Hmac<Sha512>>(password, salt, PBKDF2_ITERATIONS, &mut buf[..])
        .map_err(|e| CipherError::KeyDerivation(e.to_string()))?;
    Ok(KeyBytes(buf))
}

/// Decode a base64 raw-key secret.
///
/// # Errors
///
/// Returns [`CipherError::InvalidEncoding`] for non-base64 text and
/// [`CipherError::InvalidKeyLength`] unless it decodes to [`KEY_LEN`] bytes.
pub fn raw_key(encoded: &str) -> Result<KeyBytes, CipherError> {
    let mut decoded = STANDARD
        .decode(encoded)
        .map_err(|e| CipherError::InvalidEncoding(e.to_string()))?;
    let key = KeyBytes::from_slice(&decoded);
    decoded.iter_mut().for_each(|b| *b = 0);
    key
}

/// Resolve the AES key for `secret` and `salt`.
///
/// PBKDF2 is CPU-bound, so it runs on the blocking pool.
pub async fn derive_key(
    secret: &SecretRecord,
    salt: &[u8; SALT_LEN],
) -> Result<KeyBytes, CipherError> {
    if secret.role == SecretRole::RawKey {
        return raw_key(&secret.secret);
    }
    let password = secret.secret.clone().into_bytes();
    let salt = *salt;
    tokio::task::spawn_blocking(move || {
        let mut password = password;
        let key = pbkdf2_sha512(&password, &salt);
        password.iter_mut().for_each(|b| *b = 0);
        key
    })
    .await
    .map_err(|e| CipherError::KeyDerivation(e.to_string()))?
}
