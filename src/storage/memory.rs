//! In-memory output writer for dry runs and tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::storage::writer::DataWriter;
use crate::storage::{DataRow, StorageError};

/// Writer keeping rows in a shared vector.
///
/// Clones share state, so a test can keep a handle after giving the writer
/// to a logger.
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    rows: Arc<Mutex<Vec<DataRow>>>,
    calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl MemoryWriter {
    /// Empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Rows written so far.
    pub fn rows(&self) -> Vec<DataRow> {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of `write` calls, failed ones included.
    pub fn write_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DataWriter for MemoryWriter {
    async fn write(&mut self, row: &DataRow) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.is_closed() {
            return Err(StorageError::Closed);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Internal("injected write failure".to_string()));
        }
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(row.clone());
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
