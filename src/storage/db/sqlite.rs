//! SQLite backend implementation using sqlx.
//!
//! Provides connection pooling and the `data` table row writer.

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool as SqlxPool, SqlitePoolOptions,
    SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::storage::types::format_timestamp;
use crate::storage::writer::DataWriter;
use crate::storage::{DataRow, StorageError};

/// Default maximum connections in the pool.
const DEFAULT_MAX_CONNECTIONS: u32 = 2;

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const CREATE_DATA_TABLE: &str = "CREATE TABLE IF NOT EXISTS data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    dtstamp TEXT NOT NULL,
    measurement TEXT NOT NULL,
    sensor TEXT NOT NULL,
    process TEXT NOT NULL,
    value REAL NOT NULL
)";

const INSERT_ROW: &str =
    "INSERT INTO data (dtstamp, measurement, sensor, process, value) VALUES (?, ?, ?, ?, ?)";

/// SQLite connection pool wrapper.
///
/// Wraps sqlx's SqlitePool with WAL mode and create-if-missing defaults.
#[derive(Clone)]
pub struct SqlitePool {
    inner: SqlxPool,
}

impl std::fmt::Debug for SqlitePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePool").finish_non_exhaustive()
    }
}

impl SqlitePool {
    /// Connect to a SQLite database.
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite connection URL, e.g., `sqlite:data/logger.db?mode=rwc`
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .acquire_timeout(DEFAULT_CONNECT_TIMEOUT)
            .connect_with(options)
            .await?;

        Ok(Self { inner: pool })
    }

    /// Get the underlying sqlx pool for direct query execution.
    #[inline]
    pub fn inner(&self) -> &SqlxPool {
        &self.inner
    }

    /// Close the connection pool gracefully.
    pub async fn close(&self) {
        self.inner.close().await;
    }

    /// Check if the pool is closed.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// Connection URL for a database file, created on first use.
pub fn sqlite_url(path: &Path) -> String {
    format!("sqlite:{}?mode=rwc", path.display())
}

/// Writes rows into the `data` table.
#[derive(Debug)]
pub struct SqliteWriter {
    pool: SqlitePool,
}

impl SqliteWriter {
    /// Open the database file at `path`, creating directories and schema.
    pub async fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }
        Self::connect(&sqlite_url(path)).await
    }

    /// Connect by URL and ensure the schema exists.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePool::connect(url).await?;
        sqlx::query(CREATE_DATA_TABLE).execute(pool.inner()).await?;
        Ok(Self { pool })
    }

    /// Underlying pool, for queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl DataWriter for SqliteWriter {
    async fn write(&mut self, row: &DataRow) -> Result<(), StorageError> {
        if self.pool.is_closed() {
            return Err(StorageError::Closed);
        }
        sqlx::query(INSERT_ROW)
            .bind(format_timestamp(&row.timestamp))
            .bind(&row.measurement)
            .bind(&row.sensor)
            .bind(row.process.as_ref())
            .bind(row.value)
            .execute(self.pool.inner())
            .await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        if !self.pool.is_closed() {
            self.pool.close().await;
            tracing::debug!("SQLite writer closed");
        }
        Ok(())
    }
}
