//! Logging for the migration tool.
//!
//! JSON lines on stderr with event fields flattened to the top level, so a
//! pass can be piped straight into `jq` by record key or error.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Build the filter from `LOG_LEVEL`; `RUST_LOG` wins when set.
fn filter(log_level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(log_level).with_context(|| format!("invalid LOG_LEVEL '{log_level}'"))
}

/// Install the global subscriber.
///
/// # Errors
///
/// An unparseable `LOG_LEVEL`, or a subscriber that is already set.
pub fn init(log_level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter(log_level)?)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise incrypt-migrate logging: {e}"))
}
