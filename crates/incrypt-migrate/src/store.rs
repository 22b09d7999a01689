//! [`FileRecordStore`]: a [`RecordStore`] over JSON-lines files.
//!
//! The input file is never modified. `write_batch` writes the full record
//! set to the output file with migrated records replaced by key.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use common::protocol::StoredRecord;
use common::BoxError;
use incrypt::migration::MigrationBatch;
use incrypt::RecordStore;
use thiserror::Error;
use tracing::debug;

/// Errors from reading or writing record files.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: invalid record: {source}")]
    Parse {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// JSON-lines record store.
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    input: PathBuf,
    output: PathBuf,
}

impl FileRecordStore {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    async fn load(&self) -> Result<Vec<StoredRecord>, StoreError> {
        let raw = tokio::fs::read_to_string(&self.input)
            .await
            .map_err(|source| io_error(&self.input, source))?;
        parse_lines(&self.input, &raw)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Blank lines are skipped; line numbers are 1-based.
fn parse_lines(path: &Path, raw: &str) -> Result<Vec<StoredRecord>, StoreError> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| StoreError::Parse {
                path: path.display().to_string(),
                line: i + 1,
                source,
            })
        })
        .collect()
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn find_stale(
        &self,
        current_version: u32,
        limit: usize,
    ) -> Result<MigrationBatch, BoxError> {
        let stale: Vec<StoredRecord> = self
            .load()
            .await?
            .into_iter()
            .filter(|r| r.version != current_version)
            .collect();
        let total = stale.len();
        let records: Vec<StoredRecord> = stale.into_iter().take(limit).collect();
        debug!(total, fetched = records.len(), "stale records selected");
        Ok(MigrationBatch { records, total })
    }

    async fn write_batch(&self, records: Vec<StoredRecord>) -> Result<(), BoxError> {
        let mut migrated: HashMap<String, StoredRecord> =
            records.into_iter().map(|r| (r.key.clone(), r)).collect();

        let mut out = String::new();
        for record in self.load().await? {
            let record = migrated.remove(&record.key).unwrap_or(record);
            out.push_str(&serde_json::to_string(&record)?);
            out.push('\n');
        }
        if !migrated.is_empty() {
            return Err(format!("{} migrated records have no original", migrated.len()).into());
        }

        tokio::fs::write(&self.output, out)
            .await
            .map_err(|source| io_error(&self.output, source))?;
        debug!(path = %self.output.display(), "records written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: &str, version: u32) -> StoredRecord {
        StoredRecord {
            key: key.into(),
            body: format!("body-{key}-{version}"),
            version,
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("incrypt-migrate-{}-{name}", std::process::id()))
    }

    async fn write_records(path: &Path, records: &[StoredRecord]) {
        let mut raw = String::new();
        for r in records {
            raw.push_str(&serde_json::to_string(r).unwrap());
            raw.push_str("\n\n");
        }
        tokio::fs::write(path, raw).await.unwrap();
    }

    #[test]
    fn parse_reports_line_number() {
        let raw = "{\"key\":\"a\",\"body\":\"x\",\"version\":0}\nnot json\n";
        let err = parse_lines(Path::new("records.jsonl"), raw).unwrap_err();
        assert!(matches!(err, StoreError::Parse { line: 2, .. }), "{err}");
    }

    #[tokio::test]
    async fn find_stale_filters_and_limits() {
        let input = temp_path("find-in.jsonl");
        write_records(
            &input,
            &[record("a", 0), record("b", 2), record("c", 1), record("d", 0)],
        )
        .await;
        let store = FileRecordStore::new(&input, temp_path("find-out.jsonl"));

        let batch = store.find_stale(2, 2).await.unwrap();
        assert_eq!(batch.total, 3);
        let keys: Vec<&str> = batch.records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, ["a", "c"]);

        tokio::fs::remove_file(&input).await.unwrap();
    }

    #[tokio::test]
    async fn write_batch_replaces_by_key_and_keeps_order() {
        let input = temp_path("write-in.jsonl");
        let output = temp_path("write-out.jsonl");
        write_records(&input, &[record("a", 0), record("b", 0), record("c", 2)]).await;
        let store = FileRecordStore::new(&input, &output);

        store.write_batch(vec![record("b", 2)]).await.unwrap();

        let raw = tokio::fs::read_to_string(&output).await.unwrap();
        let written = parse_lines(&output, &raw).unwrap();
        assert_eq!(written, vec![record("a", 0), record("b", 2), record("c", 2)]);

        tokio::fs::remove_file(&input).await.unwrap();
        tokio::fs::remove_file(&output).await.unwrap();
    }

    #[tokio::test]
    async fn input_file_is_never_rewritten() {
        let input = temp_path("readonly-in.jsonl");
        let output = temp_path("readonly-out.jsonl");
        write_records(&input, &[record("a", 0), record("b", 0)]).await;
        let before = tokio::fs::read_to_string(&input).await.unwrap();
        let store = FileRecordStore::new(&input, &output);

        store.write_batch(vec![record("a", 2)]).await.unwrap();

        assert_eq!(tokio::fs::read_to_string(&input).await.unwrap(), before);
        // A second pass over the same input selects the same page.
        let batch = store.find_stale(2, 1).await.unwrap();
        assert_eq!(batch.records, vec![record("a", 0)]);
        assert_eq!(batch.total, 2);

        tokio::fs::remove_file(&input).await.unwrap();
        tokio::fs::remove_file(&output).await.unwrap();
    }

    #[tokio::test]
    async fn write_batch_rejects_unknown_keys() {
        let input = temp_path("orphan-in.jsonl");
        let output = temp_path("orphan-out.jsonl");
        write_records(&input, &[record("a", 0)]).await;
        let store = FileRecordStore::new(&input, &output);

        assert!(store.write_batch(vec![record("zzz", 2)]).await.is_err());
        assert!(tokio::fs::metadata(&output).await.is_err());

        tokio::fs::remove_file(&input).await.unwrap();
    }

    #[tokio::test]
    async fn missing_input_is_io_error() {
        let store = FileRecordStore::new(temp_path("absent.jsonl"), temp_path("unused.jsonl"));
        let err = store.find_stale(1, 10).await.unwrap_err();
        assert!(err.to_string().contains("failed to access"), "{err}");
    }
}
