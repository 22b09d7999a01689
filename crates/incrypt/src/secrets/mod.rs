//! Secret material: integrator callbacks, validation, and version resolution.
//!
//! # Lifecycle
//!
//! 1. The integrator supplies a [`SecretSource`] (or an async closure via
//!    [`SecretProvider::from_fn`]).
//! 2. Every [`SecretProvider::get_secrets`] call invokes the source, normalises a
//!    bare secret into a single-record collection, and validates the result.
//! 3. [`SecretProvider::get_secret`] picks a record by version, or the
//!    collection's `currentVersion`.
//!
//! # Invariants
//!
//! - Secret text is never logged; only versions and counts are.
//! - A collection is an immutable snapshot of one callback invocation.

pub mod provider;
pub mod source;

pub use provider::SecretProvider;
pub use source::{FnSecretSource, SecretSource, SecretsData, StaticSecretSource};

/// Version assigned to a bare-string secret.
pub const DEFAULT_VERSION: u32 = 0;
