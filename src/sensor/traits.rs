//! Sensor capability contract.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::sensor::buffer::MeasurementBuffer;
use crate::sensor::driver::Port;
use crate::scheduler::SharedClock;

/// Virtual port marker for sensors with no physical connection.
pub const NO_PORT: &str = "none";

/// One timestamped value of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Acquisition time.
    pub timestamp: DateTime<Utc>,
    /// Measured value.
    pub value: f64,
}

impl Reading {
    /// Create a reading.
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// A single measurement that could not be acquired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementFailure {
    /// Measurement name.
    pub measurement: String,
    /// Why it failed.
    pub reason: String,
}

/// Recoverable outcome of one acquisition cycle with failed measurements.
///
/// Measurements not listed here were appended normally.
#[derive(Debug, Clone, Error)]
#[error("sensor '{sensor}' failed to measure {}", describe(.failures))]
pub struct MeasureError {
    /// Sensor name.
    pub sensor: String,
    /// Failed measurements and their reasons.
    pub failures: Vec<MeasurementFailure>,
}

impl MeasureError {
    /// Create an empty error for `sensor`.
    pub fn new(sensor: impl Into<String>) -> Self {
        Self {
            sensor: sensor.into(),
            failures: Vec::new(),
        }
    }

    /// Record a failed measurement.
    pub fn push(&mut self, measurement: impl Into<String>, reason: impl fmt::Display) {
        self.failures.push(MeasurementFailure {
            measurement: measurement.into(),
            reason: reason.to_string(),
        });
    }

    /// Names of the failed measurements.
    pub fn measurements(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.measurement.as_str()).collect()
    }

    /// `Ok` if nothing failed, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), Self> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

fn describe(failures: &[MeasurementFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.measurement, f.reason))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Constructor input for a sensor.
///
/// Fields are optional here because each sensor type decides which of
/// them it requires; see [`SensorSpec::require_serial_number`] and friends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorSpec {
    /// Unique sensor name within a run.
    pub name: String,
    /// Manufacturer serial number.
    #[serde(default)]
    pub serial_number: Option<String>,
    /// Hardware (bus) address.
    #[serde(default)]
    pub address: Option<u32>,
    /// Virtual port identifier, or `none`.
    #[serde(default)]
    pub virtual_port: Option<String>,
    /// Measurement interval.
    #[serde(default, with = "humantime_serde")]
    pub measure_interval: Option<Duration>,
    /// Type-specific settings.
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl SensorSpec {
    /// Create a spec with a name, serial number and interval.
    pub fn new(name: impl Into<String>, serial_number: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            serial_number: Some(serial_number.into()),
            measure_interval: Some(interval),
            ..Default::default()
        }
    }

    /// Set the virtual port.
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.virtual_port = Some(port.into());
        self
    }

    /// Set the hardware address.
    pub fn with_address(mut self, address: u32) -> Self {
        self.address = Some(address);
        self
    }

    /// Set type-specific settings.
    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = settings;
        self
    }

    /// Virtual port, unless absent or the [`NO_PORT`] marker.
    pub fn physical_port(&self) -> Option<&str> {
        self.virtual_port
            .as_deref()
            .filter(|p| !p.is_empty() && !p.eq_ignore_ascii_case(NO_PORT))
    }

    /// Serial number or a configuration error.
    pub fn require_serial_number(&self) -> Result<&str, ConfigError> {
        self.serial_number
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| self.missing("serial_number"))
    }

    /// Positive measure interval or a configuration error.
    pub fn require_interval(&self) -> Result<Duration, ConfigError> {
        self.measure_interval
            .filter(|d| !d.is_zero())
            .ok_or_else(|| self.missing("measure_interval"))
    }

    /// Hardware address or a configuration error.
    pub fn require_address(&self) -> Result<u32, ConfigError> {
        self.address.ok_or_else(|| self.missing("address"))
    }

    /// Decode `settings` into a typed struct; a missing block yields the default.
    pub fn settings_as<T>(&self) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Default,
    {
        if self.settings.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.settings.clone()).map_err(|e| {
            ConfigError::ValidationError(format!("sensor '{}': invalid settings: {}", self.name, e))
        })
    }

    fn missing(&self, setting: &'static str) -> ConfigError {
        ConfigError::MissingSetting {
            sensor: self.name.clone(),
            setting,
        }
    }
}

/// Runtime collaborators handed to a sensor constructor.
pub struct SensorContext {
    /// Time source for reading timestamps.
    pub clock: SharedClock,
    /// Connected port, if the spec names a physical one.
    pub port: Option<Box<dyn Port>>,
}

impl fmt::Debug for SensorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorContext")
            .field("port", &self.port.is_some())
            .finish_non_exhaustive()
    }
}

/// Core sensor trait.
///
/// A sensor performs acquisitions and keeps its readings in a
/// [`MeasurementBuffer`]. Buffer access goes through the provided methods,
/// which are safe to call while a `measure()` is in flight.
#[async_trait::async_trait]
pub trait Sensor: Send + Sync + 'static {
    /// Sensor name, unique within a run.
    fn name(&self) -> &str;

    /// Manufacturer serial number.
    fn serial_number(&self) -> &str;

    /// Configured measurement interval.
    fn measure_interval(&self) -> Duration;

    /// Shortest interval the hardware supports.
    fn min_interval(&self) -> Duration;

    /// Backing store for readings.
    fn buffer(&self) -> &MeasurementBuffer;

    /// Perform exactly one acquisition cycle.
    ///
    /// Appends one reading per measurement that succeeded. Failed
    /// measurements are reported in the error; the others are still kept.
    async fn measure(&self) -> Result<(), MeasureError>;

    /// Names of the measurements this sensor produces.
    fn measurement_names(&self) -> Vec<String> {
        self.buffer().names()
    }

    /// Readings with `start <= timestamp < end`, in time order.
    fn getdata(&self, measurement: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Reading> {
        self.buffer().range(measurement, start, end)
    }

    /// Latest reading per measurement, `None` where nothing was collected yet.
    fn getcurrentdata(&self) -> BTreeMap<String, Option<Reading>> {
        self.buffer().latest()
    }

    /// Drop readings with `start <= timestamp < end`. Returns how many were removed.
    fn cleardata(&self, measurement: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> usize {
        self.buffer().clear_range(measurement, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_measure_error_display() {
        let mut err = MeasureError::new("rmy");
        err.push("bp", "no match");
        err.push("airT", "timeout");
        assert_eq!(
            err.to_string(),
            "sensor 'rmy' failed to measure bp (no match), airT (timeout)"
        );
        assert_eq!(err.measurements(), vec!["bp", "airT"]);
    }

    #[test]
    fn test_measure_error_into_result() {
        assert!(MeasureError::new("a").into_result().is_ok());
        let mut err = MeasureError::new("a");
        err.push("m", "bad");
        assert!(err.into_result().is_err());
    }

    #[test]
    fn test_spec_required_settings() {
        let spec = SensorSpec {
            name: "tph1".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            spec.require_serial_number(),
            Err(ConfigError::MissingSetting { setting: "serial_number", .. })
        ));
        assert!(matches!(
            spec.require_interval(),
            Err(ConfigError::MissingSetting { setting: "measure_interval", .. })
        ));
        assert!(spec.require_address().is_err());

        let spec = SensorSpec::new("tph1", "6166", Duration::from_secs(5)).with_address(3);
        assert_eq!(spec.require_serial_number().unwrap(), "6166");
        assert_eq!(spec.require_interval().unwrap(), Duration::from_secs(5));
        assert_eq!(spec.require_address().unwrap(), 3);
    }

    #[test]
    fn test_spec_zero_interval_is_missing() {
        let spec = SensorSpec::new("tph1", "6166", Duration::ZERO);
        assert!(spec.require_interval().is_err());
    }

    #[test]
    fn test_physical_port_marker() {
        let spec = SensorSpec::new("sim", "1", Duration::from_secs(1));
        assert_eq!(spec.physical_port(), None);
        assert_eq!(spec.clone().with_port("none").physical_port(), None);
        assert_eq!(spec.clone().with_port("NONE").physical_port(), None);
        assert_eq!(spec.with_port("COM7").physical_port(), Some("COM7"));
    }

    #[test]
    fn test_settings_as_defaults_when_absent() {
        #[derive(Debug, Default, Deserialize)]
        struct Settings {
            #[serde(default)]
            baud: u32,
        }

        let spec = SensorSpec::new("s", "1", Duration::from_secs(1));
        assert_eq!(spec.settings_as::<Settings>().unwrap().baud, 0);

        let spec = spec.with_settings(json!({"baud": 9600}));
        assert_eq!(spec.settings_as::<Settings>().unwrap().baud, 9600);

        let spec = SensorSpec::new("s", "1", Duration::from_secs(1))
            .with_settings(json!({"baud": "fast"}));
        assert!(spec.settings_as::<Settings>().is_err());
    }

    #[test]
    fn test_spec_yaml() {
        let yaml = r#"
name: tph1
serial_number: "6166"
address: 0
virtual_port: COM7
measure_interval: 5s
settings:
  baud: 19200
"#;
        let spec: SensorSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.name, "tph1");
        assert_eq!(spec.measure_interval, Some(Duration::from_secs(5)));
        assert_eq!(spec.physical_port(), Some("COM7"));
        assert_eq!(spec.settings["baud"], 19200);
    }
}
