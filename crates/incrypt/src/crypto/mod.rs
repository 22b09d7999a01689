//! AES-256-GCM primitives for the built-in ciphertext tags.
//!
//! This module is intentionally free of secret-provider and registry logic.
//! It provides the low-level seal/open, key derivation, and payload encodings
//! used by the engine.
//!
//! # Format constants
//!
//! Every value below must match bit-for-bit to read previously written
//! ciphertext.

pub mod cipher;
pub mod encoding;
pub mod kdf;

pub use cipher::{CipherError, SealedPayload};
pub use kdf::KeyBytes;

/// Byte length of an AES-256 key.
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM IV (96 bits).
pub const IV_LEN: usize = 12;

/// Byte length of the per-message PBKDF2 salt (512 bits).
pub const SALT_LEN: usize = 64;

/// Byte length of the AES-GCM authentication tag.
pub const TAG_LEN: usize = 16;

/// PBKDF2-HMAC-SHA512 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 10_000;
