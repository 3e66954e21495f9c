//! Sensor and logging-rule records.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::process::ProcessKind;
use crate::sensor::SensorSpec;

fn default_active() -> bool {
    true
}

/// One configured sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorRecord {
    /// Registry key of the sensor implementation.
    pub sensor_type: String,

    /// Constructor input.
    #[serde(flatten)]
    pub spec: SensorSpec,

    /// Inactive sensors are not constructed (default: true).
    #[serde(default = "default_active")]
    pub active: bool,
}

impl SensorRecord {
    /// Active record of `sensor_type` built from `spec`.
    pub fn new(sensor_type: impl Into<String>, spec: SensorSpec) -> Self {
        Self {
            sensor_type: sensor_type.into(),
            spec,
            active: true,
        }
    }

    /// Sensor name.
    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

/// One logging rule: store `measurement` of `sensor` every `storage_interval`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingRecord {
    /// Measurement name.
    #[serde(alias = "store")]
    pub measurement: String,

    /// Source sensor name.
    pub sensor: String,

    /// Storage interval (e.g., "10s", "1m").
    #[serde(with = "humantime_serde")]
    pub storage_interval: Duration,

    /// Reduction applied to each window.
    pub process: ProcessKind,

    /// Inactive rules are not scheduled (default: true).
    #[serde(default = "default_active")]
    pub active: bool,
}

impl LoggingRecord {
    /// Active rule.
    pub fn new(
        measurement: impl Into<String>,
        sensor: impl Into<String>,
        storage_interval: Duration,
        process: ProcessKind,
    ) -> Self {
        Self {
            measurement: measurement.into(),
            sensor: sensor.into(),
            storage_interval,
            process,
            active: true,
        }
    }
}

impl std::fmt::Display for LoggingRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} {} every {}",
            self.sensor,
            self.measurement,
            self.process,
            humantime::format_duration(self.storage_interval)
        )
    }
}

/// Source of sensor and logging-rule definitions.
///
/// The logger reads these once, at configuration time.
pub trait ConfigSource: Send + Sync {
    /// Logger name, used in log output.
    fn logger_name(&self) -> &str;

    /// Every sensor record, active or not.
    fn sensor_records(&self) -> Vec<SensorRecord>;

    /// Every logging rule, active or not.
    fn logging_records(&self) -> Vec<LoggingRecord>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_record_yaml() {
        let yaml = r#"
name: tph1
sensor_type: simulator
serial_number: "6166"
address: 0
virtual_port: none
measure_interval: 5s
"#;
        let record: SensorRecord = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(record.sensor_type, "simulator");
        assert_eq!(record.name(), "tph1");
        assert_eq!(record.spec.measure_interval, Some(Duration::from_secs(5)));
        assert_eq!(record.spec.physical_port(), None);
        assert!(record.active);
    }

    #[test]
    fn test_logging_record_yaml() {
        let yaml = r#"
store: measure1
sensor: tph1
storage_interval: 1m
process: avg
active: false
"#;
        let rule: LoggingRecord = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.measurement, "measure1");
        assert_eq!(rule.storage_interval, Duration::from_secs(60));
        assert_eq!(rule.process, ProcessKind::Average);
        assert!(!rule.active);
    }

    #[test]
    fn test_logging_record_display() {
        let rule = LoggingRecord::new("airT", "tph1", Duration::from_secs(10), ProcessKind::Max);
        assert_eq!(rule.to_string(), "tph1/airT max every 10s");
    }
}
