//! Core data types for the storage layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::process::ProcessKind;

/// Timestamp layout used in every output (`2024-01-01 10:30:05.000000`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Format a timestamp the way outputs store it.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// One reduced value ready to be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRow {
    /// Reading timestamp, or the scheduled store time for aggregates.
    pub timestamp: DateTime<Utc>,
    /// Measurement name.
    pub measurement: String,
    /// Reduced value.
    pub value: f64,
    /// Source sensor name.
    pub sensor: String,
    /// Reduction that produced the value.
    pub process: ProcessKind,
}

/// Output backend selector.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputKind {
    /// Comma separated file.
    #[default]
    Csv,
    /// SQLite database.
    Sqlite,
    /// Keep rows in memory only (dry runs).
    Memory,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    #[test]
    fn test_format_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 5).unwrap()
            + chrono::Duration::microseconds(250);
        assert_eq!(format_timestamp(&ts), "2024-01-01 10:30:05.000250");
    }

    #[test]
    fn test_output_kind_from_str() {
        assert_eq!(OutputKind::from_str("csv").unwrap(), OutputKind::Csv);
        assert_eq!(OutputKind::from_str("SQLite").unwrap(), OutputKind::Sqlite);
        assert!(OutputKind::from_str("mysql").is_err());
        assert_eq!(OutputKind::Memory.as_ref(), "memory");
    }
}
