use std::path::PathBuf;

use async_trait::async_trait;
use chrono::SecondsFormat;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use super::{RecordSink, SinkError, SinkRecord};

/// Appends one `<timestamp>,<raw>` line per run to a local file.
///
/// The raw portal text is written untouched so the file stays a faithful
/// history even when numeric parsing declined the value.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl RecordSink for CsvSink {
    fn name(&self) -> &'static str {
        "csv"
    }

    async fn record(&self, record: &SinkRecord) -> Result<(), SinkError> {
        let line = format!(
            "{},{}\n",
            record.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            record.raw
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record_at(raw: &str, hour: u32) -> SinkRecord {
        SinkRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
            raw: raw.to_string(),
            numeric: None,
        }
    }

    #[tokio::test]
    async fn appends_without_clobbering_history() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("returns.csv");
        let sink = CsvSink::new(path.clone());

        sink.record(&record_at("7.97%", 9)).await.expect("first append");
        sink.record(&record_at("8.01%", 10)).await.expect("second append");

        let contents = std::fs::read_to_string(&path).expect("csv contents");
        assert_eq!(
            contents,
            "2024-05-01T09:00:00Z,7.97%\n2024-05-01T10:00:00Z,8.01%\n"
        );
    }

    #[tokio::test]
    async fn creates_the_file_on_first_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fresh.csv");
        assert!(!path.exists());

        CsvSink::new(path.clone())
            .record(&record_at("N/A", 9))
            .await
            .expect("append");

        assert!(path.exists());
    }

    #[tokio::test]
    async fn unwritable_path_surfaces_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("returns.csv");

        let err = CsvSink::new(path)
            .record(&record_at("7.97%", 9))
            .await
            .expect_err("append into missing directory");
        assert!(matches!(err, SinkError::Io(_)));
    }
}
