//! Output writer seam.

use crate::config::OutputConfig;
use crate::storage::csv_file::CsvWriter;
use crate::storage::db::SqliteWriter;
use crate::storage::memory::MemoryWriter;
use crate::storage::{DataRow, OutputKind, StorageError};

/// Append-only sink for reduced rows.
///
/// Failures are surfaced to the caller, which must not discard the source
/// data when a write fails.
#[async_trait::async_trait]
pub trait DataWriter: Send + 'static {
    /// Append one row.
    async fn write(&mut self, row: &DataRow) -> Result<(), StorageError>;

    /// Push buffered rows to the backing store.
    async fn flush(&mut self) -> Result<(), StorageError>;

    /// Flush and release the backing store. Later writes fail with `Closed`.
    async fn close(&mut self) -> Result<(), StorageError>;
}

/// Build the writer selected by `output`.
pub async fn open_writer(output: &OutputConfig) -> Result<Box<dyn DataWriter>, StorageError> {
    let writer: Box<dyn DataWriter> = match output.kind {
        OutputKind::Csv => Box::new(CsvWriter::open(&output.path)?),
        OutputKind::Sqlite => Box::new(SqliteWriter::open(&output.path).await?),
        OutputKind::Memory => Box::new(MemoryWriter::new()),
    };
    tracing::info!(kind = %output.kind, path = %output.path.display(), "Output writer opened");
    Ok(writer)
}
