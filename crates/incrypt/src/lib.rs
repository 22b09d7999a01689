//! Client-side field encryption.
//!
//! A [`CryptoEngine`] encrypts strings into self-describing messages of the
//! form `<tag>:<payload>`, where the tag says how the payload was produced:
//! plaintext passthrough (`pt`), AES-256-GCM (`1`, `2`), or an
//! integrator-supplied [`CustomCipher`]. Secrets come from a
//! [`SecretProvider`] and are versioned, so old ciphertext stays readable
//! after rotation and can be moved forward with [`migration::Migrator`].

pub mod crypto;
pub mod custom;
pub mod engine;
pub mod migration;
pub mod secrets;

pub use common::protocol::{Encrypted, SecretCollection, SecretRecord, SecretRole, StoredRecord};
pub use common::{BoxError, CryptError};
pub use custom::{CustomCipher, CustomEncryptionConfig, CustomEncryptionRegistry};
pub use engine::{CryptoEngine, CryptoEngineBuilder};
pub use migration::{MigrationSummary, Migrator, RecordStore};
pub use secrets::{SecretProvider, SecretSource, SecretsData};
