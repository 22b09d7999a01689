//! Common types, secret data model, and errors shared across `incrypt` crates.

pub mod error;
pub mod protocol;

pub use error::{BoxError, CryptError};
