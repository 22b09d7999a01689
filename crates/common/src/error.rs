//! Common error types shared across crates.

use thiserror::Error;

/// Boxed error produced by integrator-supplied code (secret callbacks,
/// custom ciphers, record stores).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for every engine operation.
///
/// Variants map to stable error kinds returned by [`CryptError::code`]:
/// - [`CryptError::SecretsValidation`] → `secrets_validation`
/// - [`CryptError::SecretsProvider`] → `secrets_provider`
/// - [`CryptError::Crypto`] → `crypto`
/// - [`CryptError::ConfigValidation`] → `config_validation`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptError {
    /// The secret collection or a single secret record violates an invariant
    /// (bad version, unknown current version, wrong key length, role conflict).
    #[error("secrets validation error: {0}")]
    SecretsValidation(String),

    /// The user-supplied secret callback failed.
    #[error("secrets provider error: {0}")]
    SecretsProvider(String),

    /// Malformed ciphertext, authentication failure, unknown version tag, or a
    /// custom encryption contract violation.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// The custom encryption config list is malformed.
    #[error("config validation error: {0}")]
    ConfigValidation(String),
}

impl CryptError {
    /// Returns the machine-readable kind of this error.
    pub fn code(&self) -> &'static str {
        match self {
            CryptError::SecretsValidation(_) => "secrets_validation",
            CryptError::SecretsProvider(_) => "secrets_provider",
            CryptError::Crypto(_) => "crypto",
            CryptError::ConfigValidation(_) => "config_validation",
        }
    }

    /// Returns the detail message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            CryptError::SecretsValidation(m)
            | CryptError::SecretsProvider(m)
            | CryptError::Crypto(m)
            | CryptError::ConfigValidation(m) => m,
        }
    }
}

/// Convenience result alias for engine operations.
pub type Result<T> = std::result::Result<T, CryptError>;
