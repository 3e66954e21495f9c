//! Database backends.
//!
//! Currently supports SQLite through sqlx.
//!
//! # Example
//!
//! ```ignore
//! let pool = SqlitePool::connect("sqlite:data/logger.db?mode=rwc").await?;
//! let row = sqlx::query("SELECT 1").fetch_one(pool.inner()).await?;
//! ```

mod sqlite;

pub use sqlite::{SqlitePool, SqliteWriter, sqlite_url};
