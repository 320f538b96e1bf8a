use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Best-effort batch writer for flat analytics records
#[async_trait]
pub trait AnalyticsSink: Send + Sync + std::fmt::Debug {
    /// Write `rows` to `table`. Returns whether the batch landed. An empty
    /// batch is a successful no-op.
    async fn insert_rows(&self, table: &str, rows: &[Value]) -> bool;
}

/// Discards every batch
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnalytics;

#[async_trait]
impl AnalyticsSink for NoopAnalytics {
    async fn insert_rows(&self, _table: &str, _rows: &[Value]) -> bool {
        true
    }
}

/// Appends batches as JSON lines to `<dir>/<table>.jsonl`.
///
/// A missing directory is reported as a warning; it is never created here.
#[derive(Debug, Clone)]
pub struct JsonlAnalyticsSink {
    dir: PathBuf,
}

impl JsonlAnalyticsSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn table_path(&self, table: &str) -> PathBuf {
        let file: String = table
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.jsonl", file))
    }

    async fn append(&self, table: &str, rows: &[Value]) -> std::io::Result<()> {
        let mut buffer = String::new();
        for row in rows {
            buffer.push_str(&row.to_string());
            buffer.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.table_path(table))
            .await?;
        file.write_all(buffer.as_bytes()).await?;
        file.flush().await
    }
}

#[async_trait]
impl AnalyticsSink for JsonlAnalyticsSink {
    async fn insert_rows(&self, table: &str, rows: &[Value]) -> bool {
        if rows.is_empty() {
            tracing::info!("No rows to insert into {}, skipping", table);
            return true;
        }

        if !self.dir.is_dir() {
            tracing::warn!(
                "Analytics destination {} not found - skipping analytics",
                self.dir.display()
            );
            return false;
        }

        match self.append(table, rows).await {
            Ok(()) => {
                tracing::info!("Inserted {} rows into analytics table {}", rows.len(), table);
                true
            }
            Err(e) => {
                tracing::warn!("Analytics insert into {} failed: {}", table, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_noop_accepts_everything() {
        let rows = [json!({"a": 1})];
        assert!(tokio_test::block_on(NoopAnalytics.insert_rows("any.table", &rows)));
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop_success() {
        let sink = JsonlAnalyticsSink::new("/definitely/not/here");
        assert!(sink.insert_rows("privacy.results", &[]).await);
    }

    #[tokio::test]
    async fn test_missing_destination_is_soft_failure() {
        let sink = JsonlAnalyticsSink::new("/definitely/not/here");
        assert!(!sink.insert_rows("privacy.results", &[json!({"a": 1})]).await);
    }

    #[tokio::test]
    async fn test_rows_are_appended_as_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlAnalyticsSink::new(dir.path());

        assert!(sink.insert_rows("privacy.results", &[json!({"a": 1})]).await);
        assert!(sink.insert_rows("privacy.results", &[json!({"a": 2}), json!({"a": 3})]).await);

        let content = std::fs::read_to_string(dir.path().join("privacy.results.jsonl")).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines, vec![json!({"a": 1}), json!({"a": 2}), json!({"a": 3})]);
    }
}
