//! Simulated sensor for bench setups and tests.
//!
//! Produces values derived from the acquisition time, so expected readings
//! are known in advance when driven by a simulated clock.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Timelike;
use serde::Deserialize;

use crate::config::ConfigError;
use crate::scheduler::SharedClock;
use crate::sensor::buffer::MeasurementBuffer;
use crate::sensor::traits::{MeasureError, Reading, Sensor, SensorContext, SensorSpec};

/// Registry key for this sensor type.
pub const SIMULATOR_TYPE: &str = "simulator";

/// Measurements produced: minute, second and microsecond of the timestamp.
pub const SIMULATOR_MEASUREMENTS: [&str; 3] = ["measure1", "measure2", "measure3"];

/// Fastest supported polling interval.
const SIMULATOR_MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Default, Deserialize)]
struct SimulatorSettings {
    /// Measurements that fail on every cycle.
    #[serde(default)]
    fail: BTreeSet<String>,
}

/// Sensor producing clock-derived values.
pub struct SimulatedSensor {
    name: String,
    serial_number: String,
    interval: Duration,
    failing: BTreeSet<String>,
    clock: SharedClock,
    buffer: MeasurementBuffer,
}

impl SimulatedSensor {
    /// Construct from a spec.
    ///
    /// # Errors
    /// Returns `ConfigError` if the serial number or interval is missing,
    /// or `settings.fail` names an unknown measurement.
    pub fn new(spec: &SensorSpec, ctx: SensorContext) -> Result<Self, ConfigError> {
        let serial_number = spec.require_serial_number()?.to_string();
        let interval = spec.require_interval()?;
        let settings: SimulatorSettings = spec.settings_as()?;

        if let Some(unknown) = settings
            .fail
            .iter()
            .find(|m| !SIMULATOR_MEASUREMENTS.contains(&m.as_str()))
        {
            return Err(ConfigError::ValidationError(format!(
                "sensor '{}': cannot fail unknown measurement '{}'",
                spec.name, unknown
            )));
        }

        Ok(Self {
            name: spec.name.clone(),
            serial_number,
            interval,
            failing: settings.fail,
            clock: ctx.clock,
            buffer: MeasurementBuffer::new(SIMULATOR_MEASUREMENTS),
        })
    }

    /// Registry constructor.
    pub fn boxed(spec: &SensorSpec, ctx: SensorContext) -> Result<Box<dyn Sensor>, ConfigError> {
        Ok(Box::new(Self::new(spec, ctx)?))
    }
}

impl std::fmt::Debug for SimulatedSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedSensor")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Sensor for SimulatedSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn serial_number(&self) -> &str {
        &self.serial_number
    }

    fn measure_interval(&self) -> Duration {
        self.interval
    }

    fn min_interval(&self) -> Duration {
        SIMULATOR_MIN_INTERVAL
    }

    fn buffer(&self) -> &MeasurementBuffer {
        &self.buffer
    }

    async fn measure(&self) -> Result<(), MeasureError> {
        let ts = self.clock.now();
        let values = [
            f64::from(ts.minute()),
            f64::from(ts.second()),
            f64::from(ts.timestamp_subsec_micros()),
        ];

        let mut err = MeasureError::new(&self.name);
        for (name, value) in SIMULATOR_MEASUREMENTS.iter().zip(values) {
            if self.failing.contains(*name) {
                err.push(*name, "simulated failure");
                continue;
            }
            self.buffer.push(name, Reading::new(ts, value));
        }

        tracing::debug!(
            sensor = %self.name,
            measure1 = values[0],
            measure2 = values[1],
            measure3 = values[2],
            "Simulated measurement"
        );
        err.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{Clock, ManualClock};
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::Arc;

    fn context(clock: &ManualClock) -> SensorContext {
        SensorContext {
            clock: Arc::new(clock.clone()),
            port: None,
        }
    }

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap())
    }

    #[tokio::test]
    async fn test_measure_appends_each_measurement() {
        let clock = clock();
        let spec = SensorSpec::new("sim", "9999", Duration::from_secs(5));
        let sensor = SimulatedSensor::new(&spec, context(&clock)).unwrap();

        clock.advance(Duration::from_secs(7));
        sensor.measure().await.unwrap();

        let current = sensor.getcurrentdata();
        assert_eq!(current.len(), 3);
        assert_eq!(current["measure1"].unwrap().value, 30.0);
        assert_eq!(current["measure2"].unwrap().value, 7.0);
        assert_eq!(current["measure3"].unwrap().value, 0.0);
        assert_eq!(current["measure2"].unwrap().timestamp, clock.now());
    }

    #[tokio::test]
    async fn test_getdata_window() {
        let clock = clock();
        let start = clock.now();
        let spec = SensorSpec::new("sim", "9999", Duration::from_secs(1));
        let sensor = SimulatedSensor::new(&spec, context(&clock)).unwrap();

        for _ in 0..4 {
            sensor.measure().await.unwrap();
            clock.advance(Duration::from_secs(1));
        }

        let a = start;
        let b = start + chrono::Duration::seconds(4);
        let inside = sensor.getdata("measure2", a, b);
        assert_eq!(inside.len(), 4);
        assert!(inside.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!(sensor.getdata("measure2", b, b + chrono::Duration::seconds(1)).is_empty());

        assert_eq!(sensor.cleardata("measure2", a, a + chrono::Duration::seconds(2)), 2);
        assert_eq!(sensor.getdata("measure2", a, b).len(), 2);
        assert_eq!(sensor.getdata("measure1", a, b).len(), 4);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_other_measurements() {
        let clock = clock();
        let spec = SensorSpec::new("sim", "9999", Duration::from_secs(5))
            .with_settings(json!({"fail": ["measure3"]}));
        let sensor = SimulatedSensor::new(&spec, context(&clock)).unwrap();

        let err = sensor.measure().await.unwrap_err();
        assert_eq!(err.sensor, "sim");
        assert_eq!(err.measurements(), vec!["measure3"]);

        let current = sensor.getcurrentdata();
        assert!(current["measure1"].is_some());
        assert!(current["measure3"].is_none());
    }

    #[test]
    fn test_missing_serial_number() {
        let clock = clock();
        let spec = SensorSpec {
            name: "sim".to_string(),
            measure_interval: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let result = SimulatedSensor::new(&spec, context(&clock));
        assert!(matches!(result, Err(ConfigError::MissingSetting { .. })));
    }

    #[test]
    fn test_unknown_fail_setting() {
        let clock = clock();
        let spec = SensorSpec::new("sim", "1", Duration::from_secs(5))
            .with_settings(json!({"fail": ["humidity"]}));
        let result = SimulatedSensor::new(&spec, context(&clock));
        assert!(result.unwrap_err().to_string().contains("humidity"));
    }
}
