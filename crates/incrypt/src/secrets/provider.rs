//! [`SecretProvider`]: normalises, validates, and resolves secret material.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use common::error::Result;
use common::protocol::{SecretCollection, SecretRecord, SecretRole};
use common::{BoxError, CryptError};
use serde_json::Value;
use tracing::debug;

use super::source::{FnSecretSource, SecretSource, SecretsData, StaticSecretSource};
use super::DEFAULT_VERSION;
use crate::crypto::kdf::raw_key;
use crate::crypto::CipherError;

/// Resolves secrets from an integrator-supplied [`SecretSource`].
///
/// Nothing is cached: every call re-invokes the source, so rotated material is
/// picked up immediately. Use [`SecretProvider::snapshot`] to pin one fetch.
#[derive(Clone)]
pub struct SecretProvider {
    source: Arc<dyn SecretSource>,
}

impl std::fmt::Debug for SecretProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretProvider")
    }
}

impl SecretProvider {
    /// Wrap a [`SecretSource`].
    pub fn new(source: impl SecretSource + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    /// Wrap a shared [`SecretSource`].
    pub fn from_arc(source: Arc<dyn SecretSource>) -> Self {
        Self { source }
    }

    /// Wrap an async closure.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<SecretsData, BoxError>> + Send + 'static,
    {
        Self::new(FnSecretSource(f))
    }

    /// Serve a fixed payload.
    pub fn from_static(data: impl Into<SecretsData>) -> Self {
        Self::new(StaticSecretSource(data.into()))
    }

    /// Invoke the source and return a validated collection.
    ///
    /// # Errors
    ///
    /// [`CryptError::SecretsProvider`] if the source fails,
    /// [`CryptError::SecretsValidation`] if the payload breaks an invariant.
    pub async fn get_secrets(&self) -> Result<SecretCollection> {
        let data = self
            .source
            .fetch()
            .await
            .map_err(|e| CryptError::SecretsProvider(format!("failed to fetch secrets: {e}")))?;
        let collection = normalize(data)?;
        validate_collection(&collection)?;
        debug!(
            count = collection.secrets.len(),
            current_version = collection.current_version,
            "secrets resolved"
        );
        Ok(collection)
    }

    /// Resolve one secret by version, or the current one when `version` is `None`.
    ///
    /// # Errors
    ///
    /// Everything [`SecretProvider::get_secrets`] returns, plus
    /// [`CryptError::SecretsValidation`] when no record has the version.
    pub async fn get_secret(&self, version: Option<u32>) -> Result<SecretRecord> {
        let collection = self.get_secrets().await?;
        let wanted = version.unwrap_or(collection.current_version);
        collection
            .secrets
            .into_iter()
            .find(|s| s.version == wanted)
            .ok_or_else(|| {
                CryptError::SecretsValidation(format!("Secret not found for version {wanted}"))
            })
    }

    /// Resolve the current secret once, surfacing any configuration problem.
    pub async fn validate(&self) -> Result<()> {
        self.get_secret(None).await.map(|_| ())
    }

    /// Fetch once and return a provider that serves that collection forever.
    pub async fn snapshot(&self) -> Result<SecretProvider> {
        let collection = self.get_secrets().await?;
        Ok(SecretProvider::from_static(collection))
    }
}

/// Turn any callback output into a collection.
fn normalize(data: SecretsData) -> Result<SecretCollection> {
    match data {
        SecretsData::Plain(secret) => Ok(wrap_plain(secret)),
        SecretsData::Collection(collection) => Ok(collection),
        SecretsData::Json(Value::String(secret)) => Ok(wrap_plain(secret)),
        SecretsData::Json(value) => parse_json(&value),
    }
}

fn wrap_plain(secret: String) -> SecretCollection {
    SecretCollection::new(
        vec![SecretRecord::new(DEFAULT_VERSION, secret, SecretRole::Generic)],
        DEFAULT_VERSION,
    )
}

fn invalid(msg: impl Into<String>) -> CryptError {
    CryptError::SecretsValidation(msg.into())
}

/// Structural parse of `{"secrets":[...],"currentVersion":N}`.
fn parse_json(value: &Value) -> Result<SecretCollection> {
    let obj = value
        .as_object()
        .ok_or_else(|| invalid(format!("secrets data: expected string or object, got {value}")))?;

    let secrets = match obj.get("secrets") {
        Some(Value::Array(items)) => items,
        Some(other) => return Err(invalid(format!("secrets: expected array, got {other}"))),
        None => return Err(invalid("secrets: missing")),
    };

    let records = secrets
        .iter()
        .enumerate()
        .map(|(i, item)| parse_record(i, item))
        .collect::<Result<Vec<_>>>()?;

    let current_version = match obj.get("currentVersion") {
        Some(v) => parse_version("currentVersion", v)?,
        None => return Err(invalid("currentVersion: missing")),
    };

    Ok(SecretCollection::new(records, current_version))
}

fn parse_record(index: usize, item: &Value) -> Result<SecretRecord> {
    let obj = item
        .as_object()
        .ok_or_else(|| invalid(format!("secrets[{index}]: expected object, got {item}")))?;

    let version = match obj.get("version") {
        Some(v) => parse_version(&format!("secrets[{index}].version"), v)?,
        None => return Err(invalid(format!("secrets[{index}].version: missing"))),
    };

    let secret = match obj.get("secret") {
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            return Err(invalid(format!(
                "secrets[{index}].secret: expected string for version {version}"
            )))
        }
        None => return Err(invalid(format!("secrets[{index}].secret: missing"))),
    };

    let is_key = parse_flag(index, obj.get("isKey"), "isKey")?;
    let is_custom = parse_flag(
        index,
        obj.get("isForCustomEncryption"),
        "isForCustomEncryption",
    )?;

    let role = match (is_key, is_custom) {
        (true, true) => {
            return Err(invalid(format!(
                "secrets[{index}]: isKey and isForCustomEncryption cannot both be true (version {version})"
            )))
        }
        (true, false) => SecretRole::RawKey,
        (false, true) => SecretRole::CustomEncryptionKey,
        (false, false) => SecretRole::Generic,
    };

    Ok(SecretRecord::new(version, secret, role))
}

fn parse_version(field: &str, value: &Value) -> Result<u32> {
    value
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| invalid(format!("{field}: expected non-negative integer, got {value}")))
}

fn parse_flag(index: usize, value: Option<&Value>, name: &str) -> Result<bool> {
    match value {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(invalid(format!(
            "secrets[{index}].{name}: expected boolean, got {other}"
        ))),
    }
}

/// Semantic invariants that hold for every collection regardless of origin.
fn validate_collection(collection: &SecretCollection) -> Result<()> {
    if collection.secrets.is_empty() {
        return Err(invalid("secrets: must contain at least one secret"));
    }

    let mut seen = HashSet::with_capacity(collection.secrets.len());
    for (i, record) in collection.secrets.iter().enumerate() {
        if !seen.insert(record.version) {
            return Err(invalid(format!(
                "secrets[{i}].version: duplicate version {}",
                record.version
            )));
        }
        if record.role == SecretRole::RawKey {
            match raw_key(&record.secret) {
                Ok(_) => {}
                Err(CipherError::InvalidKeyLength(len)) => {
                    return Err(invalid(format!(
                        "secrets[{i}].secret: key of version {} must be 32 bytes long, got {len}",
                        record.version
                    )))
                }
                Err(e) => {
                    return Err(invalid(format!(
                        "secrets[{i}].secret: key of version {} is not valid base64: {e}",
                        record.version
                    )))
                }
            }
        }
    }

    if collection.get(collection.current_version).is_none() {
        return Err(invalid(format!(
            "currentVersion: no secret with version {}",
            collection.current_version
        )));
    }
    Ok(())
}
