//! CSV output writer.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::storage::types::format_timestamp;
use crate::storage::writer::DataWriter;
use crate::storage::{DataRow, StorageError};

/// Column header written to new files.
pub const CSV_HEADER: [&str; 4] = ["dt", "measurement", "value", "sensor"];

/// Appends rows to a CSV file.
///
/// An existing file is appended to; the header is only written to a new or
/// empty file. Rows are encoded into a batch that reaches the file on
/// `flush`. A failed flush drops the batch, so rows the logger retries are
/// not written twice.
#[derive(Debug)]
pub struct CsvWriter {
    path: PathBuf,
    file: Option<File>,
    header_pending: bool,
    batch: Vec<u8>,
}

impl CsvWriter {
    /// Open (or create) `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let fresh = std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut writer = Self {
            path,
            file: Some(file),
            header_pending: fresh,
            batch: Vec::new(),
        };
        if fresh {
            writer.flush_batch()?;
        }
        Ok(writer)
    }

    /// File being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes encoded but not yet flushed.
    pub fn pending_bytes(&self) -> usize {
        self.batch.len()
    }

    fn encode<I, T>(buf: &mut Vec<u8>, record: I) -> Result<(), StorageError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let mut encoder = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(buf);
        encoder.write_record(record)?;
        encoder.flush()?;
        Ok(())
    }

    fn flush_batch(&mut self) -> Result<(), StorageError> {
        let file = self.file.as_mut().ok_or(StorageError::Closed)?;
        let mut bytes = Vec::new();
        if self.header_pending {
            Self::encode(&mut bytes, CSV_HEADER)?;
        }
        bytes.append(&mut self.batch);
        if bytes.is_empty() {
            return Ok(());
        }

        file.write_all(&bytes)?;
        file.flush()?;
        self.header_pending = false;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DataWriter for CsvWriter {
    async fn write(&mut self, row: &DataRow) -> Result<(), StorageError> {
        if self.file.is_none() {
            return Err(StorageError::Closed);
        }
        Self::encode(
            &mut self.batch,
            [
                format_timestamp(&row.timestamp),
                row.measurement.clone(),
                row.value.to_string(),
                row.sensor.clone(),
            ],
        )
    }

    async fn flush(&mut self) -> Result<(), StorageError> {
        self.flush_batch()
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        if self.file.is_none() {
            return Ok(());
        }
        let result = self.flush_batch();
        self.file = None;
        tracing::debug!(path = %self.path.display(), "CSV writer closed");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessKind;
    use chrono::{TimeZone, Utc};

    fn row(secs: u32, value: f64) -> DataRow {
        DataRow {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, secs).unwrap(),
            measurement: "airT".to_string(),
            value,
            sensor: "tph1".to_string(),
            process: ProcessKind::Sample,
        }
    }

    #[tokio::test]
    async fn test_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logger.csv");

        let mut writer = CsvWriter::open(&path).unwrap();
        writer.write(&row(5, 21.5)).await.unwrap();
        writer.write(&row(10, 22.0)).await.unwrap();
        writer.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "dt,measurement,value,sensor",
                "2024-01-01 00:00:05.000000,airT,21.5,tph1",
                "2024-01-01 00:00:10.000000,airT,22,tph1",
            ]
        );
    }

    #[tokio::test]
    async fn test_reopen_appends_without_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logger.csv");

        let mut writer = CsvWriter::open(&path).unwrap();
        writer.write(&row(1, 1.0)).await.unwrap();
        writer.close().await.unwrap();

        let mut writer = CsvWriter::open(&path).unwrap();
        writer.write(&row(2, 2.0)).await.unwrap();
        writer.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("dt,measurement").count(), 1);
        assert_eq!(content.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_write_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvWriter::open(dir.path().join("x.csv")).unwrap();
        writer.close().await.unwrap();
        assert!(matches!(
            writer.write(&row(1, 1.0)).await,
            Err(StorageError::Closed)
        ));
        // closing twice is fine
        writer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_flush_drops_batch() {
        // writes to /dev/full fail with ENOSPC
        let path = Path::new("/dev/full");
        if !path.exists() {
            return;
        }
        let Err(_) = CsvWriter::open(path) else {
            panic!("header flush to /dev/full should fail");
        };

        let mut writer = CsvWriter {
            path: path.to_path_buf(),
            file: Some(OpenOptions::new().append(true).open(path).unwrap()),
            header_pending: false,
            batch: Vec::new(),
        };
        writer.write(&row(1, 1.0)).await.unwrap();
        assert!(writer.pending_bytes() > 0);
        assert!(matches!(writer.flush().await, Err(StorageError::Io(_))));
        assert_eq!(writer.pending_bytes(), 0);
        // nothing left to replay
        writer.flush().await.unwrap();
    }
}
