//! [`SecretSource`]: the integrator-supplied secret callback.

use std::future::Future;

use async_trait::async_trait;
use common::protocol::SecretCollection;
use common::BoxError;

/// What a secret callback may return.
#[derive(Clone, PartialEq)]
pub enum SecretsData {
    /// A single bare secret; wrapped as version [`super::DEFAULT_VERSION`].
    Plain(String),
    /// An already typed collection.
    Collection(SecretCollection),
    /// An untyped payload, e.g. straight from a secret manager.
    Json(serde_json::Value),
}

impl std::fmt::Debug for SecretsData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretsData::Plain(_) => f.write_str("Plain([REDACTED])"),
            SecretsData::Collection(c) => f.debug_tuple("Collection").field(c).finish(),
            SecretsData::Json(_) => f.write_str("Json([REDACTED])"),
        }
    }
}

impl From<String> for SecretsData {
    fn from(secret: String) -> Self {
        SecretsData::Plain(secret)
    }
}

impl From<&str> for SecretsData {
    fn from(secret: &str) -> Self {
        SecretsData::Plain(secret.to_owned())
    }
}

impl From<SecretCollection> for SecretsData {
    fn from(collection: SecretCollection) -> Self {
        SecretsData::Collection(collection)
    }
}

impl From<serde_json::Value> for SecretsData {
    fn from(value: serde_json::Value) -> Self {
        SecretsData::Json(value)
    }
}

/// Produces secret material on demand.
///
/// Called on every engine operation; implementations that talk to a remote
/// secret manager should cache on their side if needed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Fetch the current secret material.
    async fn fetch(&self) -> Result<SecretsData, BoxError>;
}

/// Adapts an async closure into a [`SecretSource`].
pub struct FnSecretSource<F>(pub F);

#[async_trait]
impl<F, Fut> SecretSource for FnSecretSource<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<SecretsData, BoxError>> + Send + 'static,
{
    async fn fetch(&self) -> Result<SecretsData, BoxError> {
        (self.0)().await
    }
}

/// Serves the same payload on every call.
#[derive(Debug, Clone)]
pub struct StaticSecretSource(pub SecretsData);

#[async_trait]
impl SecretSource for StaticSecretSource {
    async fn fetch(&self) -> Result<SecretsData, BoxError> {
        Ok(self.0.clone())
    }
}
