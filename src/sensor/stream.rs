//! Streaming sensor parsed with regular expressions.
//!
//! Devices that push text frames (barometers, data-stream loggers) are read
//! by draining whatever bytes the port has ready and extracting each
//! measurement with its own pattern.

use std::collections::BTreeMap;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::config::ConfigError;
use crate::scheduler::SharedClock;
use crate::sensor::buffer::MeasurementBuffer;
use crate::sensor::driver::{Port, PortSettings};
use crate::sensor::traits::{MeasureError, Reading, Sensor, SensorContext, SensorSpec};

/// Registry key for this sensor type.
pub const STREAM_TYPE: &str = "stream";

/// Default time to wait for bytes on each cycle (250 ms).
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(250);

/// Largest chunk drained per cycle.
const READ_CHUNK: usize = 4096;

fn default_read_timeout() -> Duration {
    DEFAULT_READ_TIMEOUT
}

fn default_baud() -> u32 {
    PortSettings::default().baud
}

/// Settings block of a stream sensor.
#[derive(Debug, Deserialize)]
pub struct StreamSettings {
    /// Measurement name to pattern. The first capture group holds the value.
    pub measurements: BTreeMap<String, String>,
    /// Time to wait for bytes on each cycle.
    #[serde(default = "default_read_timeout", with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Line baud rate passed to the driver.
    #[serde(default = "default_baud")]
    pub baud: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            measurements: BTreeMap::new(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            baud: default_baud(),
        }
    }
}

/// Sensor reading text frames from a port.
pub struct StreamSensor {
    name: String,
    serial_number: String,
    interval: Duration,
    read_timeout: Duration,
    patterns: Vec<(String, Regex)>,
    port: Mutex<Box<dyn Port>>,
    clock: SharedClock,
    buffer: MeasurementBuffer,
}

impl StreamSensor {
    /// Construct from a spec and a connected port.
    ///
    /// # Errors
    /// Returns `ConfigError` if the serial number, interval, address or port
    /// is missing, no measurements are declared, or a pattern is invalid.
    pub fn new(spec: &SensorSpec, ctx: SensorContext) -> Result<Self, ConfigError> {
        let serial_number = spec.require_serial_number()?.to_string();
        let interval = spec.require_interval()?;
        spec.require_address()?;
        let settings: StreamSettings = spec.settings_as()?;

        let port = ctx.port.ok_or_else(|| ConfigError::MissingSetting {
            sensor: spec.name.clone(),
            setting: "virtual_port",
        })?;

        if settings.measurements.is_empty() {
            return Err(ConfigError::MissingSetting {
                sensor: spec.name.clone(),
                setting: "settings.measurements",
            });
        }

        let patterns = settings
            .measurements
            .iter()
            .map(|(name, pattern)| {
                let re = Regex::new(pattern).map_err(|e| {
                    ConfigError::ValidationError(format!(
                        "sensor '{}': invalid pattern for '{}': {}",
                        spec.name, name, e
                    ))
                })?;
                if re.captures_len() < 2 {
                    return Err(ConfigError::ValidationError(format!(
                        "sensor '{}': pattern for '{}' needs a capture group",
                        spec.name, name
                    )));
                }
                Ok((name.clone(), re))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: spec.name.clone(),
            serial_number,
            interval,
            read_timeout: settings.read_timeout,
            buffer: MeasurementBuffer::new(patterns.iter().map(|(n, _)| n.clone())),
            patterns,
            port: Mutex::new(port),
            clock: ctx.clock,
        })
    }

    /// Registry constructor.
    pub fn boxed(spec: &SensorSpec, ctx: SensorContext) -> Result<Box<dyn Sensor>, ConfigError> {
        Ok(Box::new(Self::new(spec, ctx)?))
    }

    /// Drain available bytes. `None` if nothing arrived before the timeout.
    async fn read_frame(&self) -> Result<Option<String>, std::io::Error> {
        let mut port = self.port.lock().await;
        let mut buf = vec![0u8; READ_CHUNK];
        match timeout(self.read_timeout, port.read(&mut buf)).await {
            Ok(Ok(0)) | Err(_) => Ok(None),
            Ok(Ok(n)) => Ok(Some(String::from_utf8_lossy(&buf[..n]).into_owned())),
            Ok(Err(e)) => Err(e),
        }
    }
}

impl std::fmt::Debug for StreamSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSensor")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("measurements", &self.patterns.len())
            .finish_non_exhaustive()
    }
}

/// Value of the last match of `re` in `text`.
fn extract(re: &Regex, text: &str) -> Result<f64, String> {
    let caps = re
        .captures_iter(text)
        .last()
        .ok_or_else(|| "no match in frame".to_string())?;
    let raw = caps
        .get(1)
        .map(|m| m.as_str().trim())
        .ok_or_else(|| "empty capture".to_string())?;
    raw.parse::<f64>()
        .map_err(|_| format!("non-numeric value '{raw}'"))
}

#[async_trait::async_trait]
impl Sensor for StreamSensor {
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
        Duration::ZERO
    }

    fn buffer(&self) -> &MeasurementBuffer {
        &self.buffer
    }

    async fn measure(&self) -> Result<(), MeasureError> {
        let ts = self.clock.now();
        let frame = match self.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::trace!(sensor = %self.name, "No bytes waiting");
                return Ok(());
            }
            Err(e) => {
                let mut err = MeasureError::new(&self.name);
                for (name, _) in &self.patterns {
                    err.push(name.as_str(), &e);
                }
                return Err(err);
            }
        };

        let mut err = MeasureError::new(&self.name);
        for (name, re) in &self.patterns {
            match extract(re, &frame) {
                Ok(value) => self.buffer.push(name, Reading::new(ts, value)),
                Err(reason) => err.push(name.as_str(), reason),
            }
        }
        err.into_result()
    }
}
