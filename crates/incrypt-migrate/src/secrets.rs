//! [`FileSecretSource`]: secrets read from a JSON document on disk.

use std::path::PathBuf;

use async_trait::async_trait;
use common::BoxError;
use incrypt::{SecretSource, SecretsData};

/// Reads the secrets file on every fetch, so an operator can rotate by
/// rewriting it.
#[derive(Debug, Clone)]
pub struct FileSecretSource {
    path: PathBuf,
}

impl FileSecretSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SecretSource for FileSecretSource {
    async fn fetch(&self) -> Result<SecretsData, BoxError> {
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|e| format!("reading {}: {e}", self.path.display()))?;
        let value: serde_json::Value = serde_json::from_slice(&raw)
            .map_err(|e| format!("parsing {}: {e}", self.path.display()))?;
        Ok(SecretsData::Json(value))
    }
}
