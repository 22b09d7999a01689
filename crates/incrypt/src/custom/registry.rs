//! [`CustomEncryptionRegistry`]: validated, atomically replaceable set of custom ciphers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;
use common::error::Result;
use common::protocol::SecretRole;
use common::CryptError;
use tracing::{debug, info};

use super::CustomEncryptionConfig;
use crate::secrets::SecretProvider;

/// Text pushed through every cipher by [`CustomEncryptionRegistry::validate_round_trip`].
const ROUND_TRIP_SAMPLE: &str = "InCountry";

#[derive(Default)]
struct RegistryState {
    /// Keyed by packed tag.
    entries: HashMap<String, CustomEncryptionConfig>,
    /// Packed tag of the current config, if any.
    current: Option<String>,
}

/// Custom ciphers keyed by their packed ciphertext tag.
///
/// Backed by [`ArcSwap`]: lookups never block, and [`register`](Self::register)
/// swaps in a whole new set. Configs are never merged.
#[derive(Clone)]
pub struct CustomEncryptionRegistry {
    inner: Arc<ArcSwap<RegistryState>>,
}

impl std::fmt::Debug for CustomEncryptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.load();
        f.debug_struct("CustomEncryptionRegistry")
            .field("len", &state.entries.len())
            .field("current", &state.current)
            .finish()
    }
}

impl CustomEncryptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(RegistryState::default())),
        }
    }

    /// Build a registry from `configs`.
    ///
    /// # Errors
    ///
    /// See [`CustomEncryptionRegistry::register`].
    pub fn from_configs(configs: Vec<CustomEncryptionConfig>) -> Result<Self> {
        let registry = Self::new();
        registry.register(configs)?;
        Ok(registry)
    }

    /// Validate `configs` and replace the whole registry with them.
    ///
    /// A set with no current config is valid: it still decrypts old custom
    /// ciphertext while new writes fall back to the built-in scheme.
    ///
    /// # Errors
    ///
    /// Returns [`CryptError::ConfigValidation`] if the list is empty, a version
    /// name is empty or repeated, or more than one config is current. The
    /// previous contents are kept on error.
    pub fn register(&self, configs: Vec<CustomEncryptionConfig>) -> Result<()> {
        let state = build_state(configs)?;
        info!(
            count = state.entries.len(),
            current = state.current.as_deref().unwrap_or("none"),
            "custom encryption registry replaced"
        );
        self.inner.store(Arc::new(state));
        Ok(())
    }

    /// Find the config for a packed tag.
    pub fn lookup(&self, tag: &str) -> Option<CustomEncryptionConfig> {
        self.inner.load().entries.get(tag).cloned()
    }

    /// The config used for new writes, if any.
    pub fn current_config(&self) -> Option<CustomEncryptionConfig> {
        let state = self.inner.load();
        state
            .current
            .as_ref()
            .and_then(|tag| state.entries.get(tag))
            .cloned()
    }

    /// Number of registered configs.
    pub fn len(&self) -> usize {
        self.inner.load().entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.load().entries.is_empty()
    }

    /// Prove every registered cipher reproduces a sample string.
    ///
    /// Uses the first secret marked for custom encryption. Failures from
    /// integrator code are reported as [`CryptError::Crypto`] naming the
    /// version; nothing else escapes.
    pub async fn validate_round_trip(&self, provider: &SecretProvider) -> Result<()> {
        let collection = provider.get_secrets().await?;
        let secret = collection
            .secrets
            .iter()
            .find(|s| s.role == SecretRole::CustomEncryptionKey)
            .ok_or_else(|| CryptError::Crypto("No secret for Custom Encryption".into()))?;

        let configs: Vec<CustomEncryptionConfig> =
            self.inner.load().entries.values().cloned().collect();
        for config in configs {
            let encrypted = config.guarded_encrypt(ROUND_TRIP_SAMPLE, secret).await?;
            let decrypted = config.guarded_decrypt(&encrypted, secret).await?;
            if decrypted != ROUND_TRIP_SAMPLE {
                return Err(CryptError::Crypto(format!(
                    "Custom encryption '{}': decrypted data doesn't match the original input",
                    config.version
                )));
            }
            debug!(version = %config.version, "custom encryption round trip ok");
        }
        Ok(())
    }
}

impl Default for CustomEncryptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn build_state(configs: Vec<CustomEncryptionConfig>) -> Result<RegistryState> {
    if configs.is_empty() {
        return Err(CryptError::ConfigValidation(
            "custom encryption configs must not be empty".into(),
        ));
    }

    let mut names = HashSet::with_capacity(configs.len());
    for (i, config) in configs.iter().enumerate() {
        if config.version.is_empty() {
            return Err(CryptError::ConfigValidation(format!(
                "configs[{i}].version must be a non-empty string"
            )));
        }
        if !names.insert(config.version.as_str()) {
            return Err(CryptError::ConfigValidation(format!(
                "duplicate custom encryption version '{}'",
                config.version
            )));
        }
    }

    let current: Vec<&CustomEncryptionConfig> = configs.iter().filter(|c| c.is_current).collect();
    if current.len() > 1 {
        return Err(CryptError::ConfigValidation(format!(
            "only one custom encryption config can be current, found {}",
            current.len()
        )));
    }
    let current = current.first().map(|c| c.tag());

    let entries = configs.into_iter().map(|c| (c.tag(), c)).collect();
    Ok(RegistryState { entries, current })
}
