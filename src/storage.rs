//! Storage Layer
//!
//! Output writers receiving the reduced rows of every storage cycle.
//!
//! # Components
//!
//! - [`DataWriter`]: Async append-only row sink
//! - [`CsvWriter`]: `dt,measurement,value,sensor` CSV file
//! - [`SqliteWriter`]: `data` table in a WAL-mode SQLite database
//! - [`MemoryWriter`]: Shared in-memory rows with a failure switch
//! - [`open_writer`]: Builds the writer named by the output configuration

mod csv_file;
pub mod db;
mod error;
mod memory;
mod types;
mod writer;

pub use csv_file::{CSV_HEADER, CsvWriter};
pub use db::{SqlitePool, SqliteWriter};
pub use error::StorageError;
pub use memory::MemoryWriter;
pub use types::{DataRow, OutputKind, TIMESTAMP_FORMAT, format_timestamp};
pub use writer::{DataWriter, open_writer};
