//! Data types exchanged between the engine, its integrators, and record stores.
//!
//! The record and envelope types are serialised as JSON by the migration tool.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Secret material
// ---------------------------------------------------------------------------

/// What a secret may be used for.
///
/// `RawKey` and `CustomEncryptionKey` are mutually exclusive by construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretRole {
    /// A password fed through PBKDF2 before use.
    #[default]
    Generic,
    /// Base64 text of exactly 32 bytes, used directly as the AES key.
    RawKey,
    /// Material handed to an integrator-supplied custom cipher.
    CustomEncryptionKey,
}

/// A single version of secret material.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    /// Version number, unique within a [`SecretCollection`].
    pub version: u32,
    /// Secret text. Interpreted according to `role`.
    pub secret: String,
    /// Intended use of `secret`.
    #[serde(default)]
    pub role: SecretRole,
}

impl SecretRecord {
    /// Construct a record.
    pub fn new(version: u32, secret: impl Into<String>, role: SecretRole) -> Self {
        Self {
            version,
            secret: secret.into(),
            role,
        }
    }
}

impl std::fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretRecord")
            .field("version", &self.version)
            .field("secret", &"[REDACTED]")
            .field("role", &self.role)
            .finish()
    }
}

/// Every version of secret material known to the caller plus the pointer used
/// for new writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretCollection {
    /// All secret versions. Must be non-empty with unique versions.
    pub secrets: Vec<SecretRecord>,
    /// Version used by `encrypt`. Must match one of `secrets`.
    pub current_version: u32,
}

impl SecretCollection {
    /// Construct a collection.
    pub fn new(secrets: Vec<SecretRecord>, current_version: u32) -> Self {
        Self {
            secrets,
            current_version,
        }
    }

    /// Look up a record by version.
    pub fn get(&self, version: u32) -> Option<&SecretRecord> {
        self.secrets.iter().find(|s| s.version == version)
    }
}

// ---------------------------------------------------------------------------
// Ciphertext envelope
// ---------------------------------------------------------------------------

/// Output of `encrypt`: the versioned message and the secret version that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Encrypted {
    /// `<versionTag>:<payload>`.
    pub message: String,
    /// Version of the secret used; `0` when no secret provider is configured.
    pub secret_version: u32,
}

// ---------------------------------------------------------------------------
// Stored records
// ---------------------------------------------------------------------------

/// An encrypted record as persisted by a record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Record identifier within the store.
    pub key: String,
    /// Encrypted body (`<versionTag>:<payload>`).
    pub body: String,
    /// Secret version `body` was encrypted under.
    pub version: u32,
}
