//! Integrator-supplied ("custom") encryption.
//!
//! A custom cipher bypasses the built-in AEAD scheme. Its ciphertext is tagged
//! `c<base64(version)>` so arbitrary version names fit the colon-delimited
//! message format.
//!
//! Every call into integrator code goes through [`CustomEncryptionConfig`]'s
//! guarded helpers, which turn errors, panics, and non-UTF-8 output into
//! [`CryptError::Crypto`].

pub mod registry;

pub use registry::CustomEncryptionRegistry;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::error::Result;
use common::protocol::{SecretRecord, SecretRole};
use common::{BoxError, CryptError};
use futures::FutureExt;

use crate::engine::tag::SEPARATOR;

/// Prefix of every custom encryption version tag.
pub const CUSTOM_TAG_PREFIX: &str = "c";

/// An integrator-supplied encrypt/decrypt pair.
///
/// Both directions must return UTF-8 text; any other output is rejected.
#[async_trait]
pub trait CustomCipher: Send + Sync {
    /// Encrypt `plaintext` with `secret`.
    async fn encrypt(
        &self,
        plaintext: &str,
        secret: &str,
        secret_version: u32,
    ) -> std::result::Result<Vec<u8>, BoxError>;

    /// Reverse [`CustomCipher::encrypt`].
    async fn decrypt(
        &self,
        ciphertext: &str,
        secret: &str,
        secret_version: u32,
    ) -> std::result::Result<Vec<u8>, BoxError>;
}

/// Pack a version name into its ciphertext tag.
pub fn pack_tag(version: &str) -> String {
    format!("{CUSTOM_TAG_PREFIX}{}", STANDARD.encode(version))
}

/// One registered custom cipher.
#[derive(Clone)]
pub struct CustomEncryptionConfig {
    /// Version name, unique within a registry.
    pub version: String,
    /// The integrator's implementation.
    pub cipher: Arc<dyn CustomCipher>,
    /// Whether new writes use this cipher. At most one per registry.
    pub is_current: bool,
}

impl std::fmt::Debug for CustomEncryptionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomEncryptionConfig")
            .field("version", &self.version)
            .field("is_current", &self.is_current)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Encrypt,
    Decrypt,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Encrypt => "encrypt",
            Direction::Decrypt => "decrypt",
        }
    }
}

impl CustomEncryptionConfig {
    /// Construct a config.
    pub fn new(
        version: impl Into<String>,
        cipher: impl CustomCipher + 'static,
        is_current: bool,
    ) -> Self {
        Self {
            version: version.into(),
            cipher: Arc::new(cipher),
            is_current,
        }
    }

    /// The ciphertext tag for this config.
    pub fn tag(&self) -> String {
        pack_tag(&self.version)
    }

    /// Run the integrator's encrypt behind the error boundary.
    pub(crate) async fn guarded_encrypt(
        &self,
        plaintext: &str,
        secret: &SecretRecord,
    ) -> Result<String> {
        self.guarded(Direction::Encrypt, plaintext, secret).await
    }

    /// Run the integrator's decrypt behind the error boundary.
    pub(crate) async fn guarded_decrypt(
        &self,
        ciphertext: &str,
        secret: &SecretRecord,
    ) -> Result<String> {
        self.guarded(Direction::Decrypt, ciphertext, secret).await
    }

    async fn guarded(
        &self,
        direction: Direction,
        input: &str,
        secret: &SecretRecord,
    ) -> Result<String> {
        if secret.role != SecretRole::CustomEncryptionKey {
            return Err(CryptError::Crypto(format!(
                "Secret with version {} is not marked for custom encryption",
                secret.version
            )));
        }

        let call = async {
            match direction {
                Direction::Encrypt => {
                    self.cipher
                        .encrypt(input, &secret.secret, secret.version)
                        .await
                }
                Direction::Decrypt => {
                    self.cipher
                        .decrypt(input, &secret.secret, secret.version)
                        .await
                }
            }
        };

        let output = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                return Err(CryptError::Crypto(format!(
                    "Custom encryption '{}' failed to {}: {e}",
                    self.version,
                    direction.as_str()
                )))
            }
            Err(_) => {
                return Err(CryptError::Crypto(format!(
                    "Custom encryption '{}' panicked during {}",
                    self.version,
                    direction.as_str()
                )))
            }
        };

        let output = String::from_utf8(output).map_err(|_| {
            CryptError::Crypto(format!(
                "Custom encryption '{}': custom encryption '{}' must return a string",
                self.version,
                direction.as_str()
            ))
        })?;

        // The payload is the second of exactly two message parts.
        if matches!(direction, Direction::Encrypt) && output.contains(SEPARATOR) {
            return Err(CryptError::Crypto(format!(
                "Custom encryption '{}': encrypted output must not contain '{SEPARATOR}'",
                self.version
            )));
        }
        Ok(output)
    }
}
