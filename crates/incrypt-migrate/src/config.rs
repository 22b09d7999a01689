//! Configuration loading and validation for the migration tool.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Validated incrypt-migrate configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// JSON secrets document (`{"secrets":[...],"currentVersion":N}` or a
    /// bare JSON string). Re-read on every fetch. **Required.**
    pub secrets_file: PathBuf,

    /// JSON-lines file of `{"key","body","version"}` records. **Required.**
    pub records_file: PathBuf,

    /// Where the migrated record set is written. **Required.**
    pub output_file: PathBuf,

    /// Maximum records migrated in one pass.
    #[serde(default = "default_migration_limit")]
    pub migration_limit: usize,

    /// Tracing log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_migration_limit() -> usize {
    100
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build incrypt-migrate configuration")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise incrypt-migrate configuration")?;

        c.validate()?;
        Ok(c)
    }

    fn validate(&self) -> Result<()> {
        if self.migration_limit == 0 {
            anyhow::bail!("MIGRATION_LIMIT must be greater than zero");
        }
        for (name, path) in [
            ("SECRETS_FILE", &self.secrets_file),
            ("RECORDS_FILE", &self.records_file),
            ("OUTPUT_FILE", &self.output_file),
        ] {
            if path.as_os_str().is_empty() {
                anyhow::bail!("{name} is required and must not be empty");
            }
        }
        if self.records_file == self.output_file {
            anyhow::bail!("OUTPUT_FILE must differ from RECORDS_FILE");
        }
        Ok(())
    }
}
