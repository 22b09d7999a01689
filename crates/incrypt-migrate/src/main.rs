//! `incrypt-migrate`: re-encrypts stale records under the current secret.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`](config::Config) from environment variables.
//! 2. Initialise structured JSON logging.
//! 3. Build the engine over the secrets file and validate it.
//! 4. Run one migration pass from `RECORDS_FILE` into `OUTPUT_FILE`.
//!
//! `RECORDS_FILE` is only read. A pass migrates the first `MIGRATION_LIMIT`
//! stale records and writes the whole set to `OUTPUT_FILE`; running again
//! against the same input repeats that page. To continue, promote
//! `OUTPUT_FILE` to `RECORDS_FILE` between passes until `total_left` is 0.
//! When every record in the page fails, `OUTPUT_FILE` is not written.

mod config;
mod secrets;
mod store;
mod telemetry;

use anyhow::{Context, Result};
use incrypt::{CryptoEngine, Migrator, SecretProvider};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = config::Config::from_env().map_err(|e| {
        eprintln!("ERROR: incrypt-migrate configuration invalid: {e}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&cfg.log_level)?;
    info!(
        records_file = %cfg.records_file.display(),
        output_file = %cfg.output_file.display(),
        limit = cfg.migration_limit,
        "incrypt-migrate starting"
    );

    // -----------------------------------------------------------------------
    // 3. Engine
    // -----------------------------------------------------------------------
    let provider = SecretProvider::new(secrets::FileSecretSource::new(&cfg.secrets_file));
    let engine = CryptoEngine::new(Some(provider));
    engine
        .validate()
        .await
        .context("secrets file failed validation")?;

    // -----------------------------------------------------------------------
    // 4. Migration
    // -----------------------------------------------------------------------
    let store = store::FileRecordStore::new(&cfg.records_file, &cfg.output_file);
    let summary = Migrator::new(engine)
        .run(&store, cfg.migration_limit)
        .await
        .context("migration pass failed")?;

    info!(
        migrated = summary.migrated,
        total_left = summary.total_left,
        errors = summary.errors.len(),
        "migration complete"
    );
    if !summary.errors.is_empty() {
        for failure in &summary.errors {
            warn!(key = %failure.record.key, error = %failure.error, "unmigrated record");
        }
        anyhow::bail!("{} records could not be migrated", summary.errors.len());
    }
    Ok(())
}
