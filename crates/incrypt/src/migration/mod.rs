//! Re-encryption of records written under an older secret version.
//!
//! [`migrate_batch`] is pure: it takes records in and hands re-encrypted
//! records back. [`Migrator`] adds the storage round trip through a
//! [`RecordStore`].

use async_trait::async_trait;
use common::error::Result;
use common::protocol::StoredRecord;
use common::{BoxError, CryptError};
use futures::future::join_all;
use tracing::{info, warn};

use crate::engine::CryptoEngine;

/// A page of stale records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationBatch {
    /// Records fetched for this run.
    pub records: Vec<StoredRecord>,
    /// Stale records in the store, including the ones fetched.
    pub total: usize,
}

/// A record that could not be migrated, with the untouched original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFailure {
    pub error: CryptError,
    pub record: StoredRecord,
}

/// Outcome of [`migrate_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationOutcome {
    /// Re-encrypted records, ready to persist.
    pub records: Vec<StoredRecord>,
    /// Stale records the page did not include.
    pub total_left: usize,
    pub errors: Vec<MigrationFailure>,
}

/// Counts reported after a [`Migrator::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationSummary {
    pub migrated: usize,
    pub total_left: usize,
    pub errors: Vec<MigrationFailure>,
}

/// Storage collaborator for [`Migrator`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Up to `limit` records whose version is not `current_version`.
    async fn find_stale(
        &self,
        current_version: u32,
        limit: usize,
    ) -> std::result::Result<MigrationBatch, BoxError>;

    /// Persist re-encrypted records, replacing the originals by key.
    async fn write_batch(&self, records: Vec<StoredRecord>) -> std::result::Result<(), BoxError>;
}

/// Decrypt each record with `source` and re-encrypt it with `target`.
///
/// Per-record failures are collected in [`MigrationOutcome::errors`]; the
/// rest of the batch proceeds.
///
/// # Errors
///
/// Fails as a whole if the batch is empty or either engine has encryption
/// disabled.
pub async fn migrate_batch(
    source: &CryptoEngine,
    target: &CryptoEngine,
    batch: MigrationBatch,
) -> Result<MigrationOutcome> {
    if !source.encryption_enabled() || !target.encryption_enabled() {
        return Err(CryptError::Crypto(
            "Migration not supported when encryption is off".into(),
        ));
    }
    if batch.records.is_empty() {
        return Err(CryptError::Crypto("No records to migrate".into()));
    }

    let total_left = batch.total.saturating_sub(batch.records.len());
    let results = join_all(
        batch
            .records
            .into_iter()
            .map(|record| migrate_one(source, target, record)),
    )
    .await;

    let mut outcome = MigrationOutcome {
        total_left,
        ..Default::default()
    };
    for result in results {
        match result {
            Ok(record) => outcome.records.push(record),
            Err(failure) => {
                warn!(
                    key = %failure.record.key,
                    version = failure.record.version,
                    error = %failure.error,
                    "record not migrated"
                );
                outcome.errors.push(failure);
            }
        }
    }
    Ok(outcome)
}

async fn migrate_one(
    source: &CryptoEngine,
    target: &CryptoEngine,
    record: StoredRecord,
) -> std::result::Result<StoredRecord, MigrationFailure> {
    let reencrypted = async {
        let plaintext = source.decrypt(&record.body, Some(record.version)).await?;
        target.encrypt(&plaintext).await
    }
    .await;

    match reencrypted {
        Ok(encrypted) => Ok(StoredRecord {
            key: record.key,
            body: encrypted.message,
            version: encrypted.secret_version,
        }),
        Err(error) => Err(MigrationFailure { error, record }),
    }
}

/// Runs one migration pass against a [`RecordStore`].
#[derive(Debug, Clone)]
pub struct Migrator {
    engine: CryptoEngine,
}

impl Migrator {
    pub fn new(engine: CryptoEngine) -> Self {
        Self { engine }
    }

    /// Migrate up to `limit` stale records.
    ///
    /// The secrets are fetched once and pinned for the whole run, so the
    /// current version cannot move between selecting and re-encrypting.
    ///
    /// # Errors
    ///
    /// Encryption disabled, secret resolution, an empty candidate set, or a
    /// store failure. Per-record crypto failures land in
    /// [`MigrationSummary::errors`] instead.
    pub async fn run(&self, store: &dyn RecordStore, limit: usize) -> Result<MigrationSummary> {
        if !self.engine.encryption_enabled() {
            return Err(CryptError::Crypto(
                "Migration not supported when encryption is off".into(),
            ));
        }

        let engine = self.engine.pinned().await?;
        let current_version = engine.get_current_secret_version().await?;

        let batch = store
            .find_stale(current_version, limit)
            .await
            .map_err(|e| CryptError::Crypto(format!("failed to fetch records: {e}")))?;
        info!(
            current_version,
            fetched = batch.records.len(),
            total = batch.total,
            "stale records fetched"
        );

        let outcome = migrate_batch(&engine, &engine, batch).await?;
        let migrated = outcome.records.len();
        if migrated > 0 {
            store
                .write_batch(outcome.records)
                .await
                .map_err(|e| CryptError::Crypto(format!("failed to write records: {e}")))?;
        }

        info!(
            migrated,
            total_left = outcome.total_left,
            errors = outcome.errors.len(),
            "migration pass finished"
        );
        Ok(MigrationSummary {
            migrated,
            total_left: outcome.total_left,
            errors: outcome.errors,
        })
    }
}
