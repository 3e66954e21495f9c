//! Work bound to scheduled jobs.

use std::fmt;

use crate::config::LoggingRecord;

/// What a scheduled job does when it fires.
#[derive(Debug, Clone)]
pub enum JobTask {
    /// Run one acquisition cycle of a sensor.
    Measure {
        /// Sensor name.
        sensor: String,
    },
    /// Reduce and store one measurement of a sensor.
    Store {
        /// Logging rule.
        rule: LoggingRecord,
    },
}

impl JobTask {
    /// Sensor this task acts on.
    pub fn sensor(&self) -> &str {
        match self {
            Self::Measure { sensor } => sensor,
            Self::Store { rule } => &rule.sensor,
        }
    }

    /// Whether this task is bound to sensor `name`.
    pub fn references(&self, name: &str) -> bool {
        self.sensor() == name
    }
}

impl fmt::Display for JobTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Measure { sensor } => write!(f, "measure {sensor}"),
            Self::Store { rule } => write!(f, "store {rule}"),
        }
    }
}
