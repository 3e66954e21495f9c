//! Application configuration structures.

use std::collections::{BTreeMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::storage::OutputKind;

use super::sensor::{ConfigSource, LoggingRecord, SensorRecord};
use super::validation::{ConfigError, expand_env_vars};

// =============================================================================
// Constants
// =============================================================================

/// Default UDP control port.
pub const DEFAULT_CONTROL_PORT: u16 = 62000;

/// Default look-back for the first storage window of a rule (24 hours).
pub const DEFAULT_WINDOW_LOOKBACK: Duration = Duration::from_secs(24 * 60 * 60);

fn default_window_lookback() -> Duration {
    DEFAULT_WINDOW_LOOKBACK
}

// =============================================================================
// Sections
// =============================================================================

/// Logger identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Logger name (default: "databear").
    pub name: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            name: "databear".to_string(),
        }
    }
}

/// Control endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Bind address (default: "127.0.0.1").
    pub bind: String,

    /// UDP port (default: 62000).
    pub port: u16,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: DEFAULT_CONTROL_PORT,
        }
    }
}

impl ControlConfig {
    /// Socket address to bind.
    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = self.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!("invalid control bind address: '{}'", self.bind))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Output writer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Backend (default: csv).
    pub kind: OutputKind,

    /// File path of the CSV file or SQLite database.
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            kind: OutputKind::Csv,
            path: PathBuf::from("databear.csv"),
        }
    }
}

/// Logging rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataloggerConfig {
    /// Rules, in scheduling order.
    #[serde(default)]
    pub settings: Vec<LoggingRecord>,
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logger identity.
    #[serde(default)]
    pub logger: LoggerConfig,

    /// Control endpoint.
    #[serde(default)]
    pub control: ControlConfig,

    /// Output writer.
    #[serde(default)]
    pub output: OutputConfig,

    /// Look-back of a rule's first storage window (default: 24h).
    #[serde(default = "default_window_lookback", with = "humantime_serde")]
    pub window_lookback: Duration,

    /// Virtual port to TCP serial gateway (`host:port`).
    #[serde(default)]
    pub ports: BTreeMap<String, String>,

    /// Sensors, in scheduling order.
    #[serde(default)]
    pub sensors: Vec<SensorRecord>,

    /// Logging rules.
    #[serde(default)]
    pub datalogger: DataloggerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logger: LoggerConfig::default(),
            control: ControlConfig::default(),
            output: OutputConfig::default(),
            window_lookback: DEFAULT_WINDOW_LOOKBACK,
            ports: BTreeMap::new(),
            sensors: Vec::new(),
            datalogger: DataloggerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` references are expanded before parsing.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(&expand_env_vars(content))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Sensor-type specific requirements (serial number, address, ...) are
    /// checked when the sensor is constructed.
    ///
    /// # Errors
    /// Returns `ConfigError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.control.addr()?;

        if self.control.port == 0 {
            return Err(ConfigError::ValidationError(
                "control port must be non-zero".to_string(),
            ));
        }

        if self.window_lookback.is_zero() {
            return Err(ConfigError::ValidationError(
                "window_lookback must be positive".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for record in &self.sensors {
            if record.name().trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "sensor name must not be empty".to_string(),
                ));
            }
            if record.sensor_type.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "sensor '{}': sensor_type must not be empty",
                    record.name()
                )));
            }
            if !names.insert(record.name()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate sensor name: '{}'",
                    record.name()
                )));
            }
        }

        for rule in &self.datalogger.settings {
            if !names.contains(rule.sensor.as_str()) {
                return Err(ConfigError::UnknownReference {
                    kind: "sensor",
                    name: rule.sensor.clone(),
                });
            }
            if rule.measurement.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "logging rule on sensor '{}': measurement must not be empty",
                    rule.sensor
                )));
            }
            if rule.storage_interval.is_zero() {
                return Err(ConfigError::ValidationError(format!(
                    "logging rule '{}': storage_interval must be positive",
                    rule
                )));
            }
        }

        Ok(())
    }
}

impl ConfigSource for AppConfig {
    fn logger_name(&self) -> &str {
        &self.logger.name
    }

    fn sensor_records(&self) -> Vec<SensorRecord> {
        self.sensors.clone()
    }

    fn logging_records(&self) -> Vec<LoggingRecord> {
        self.datalogger.settings.clone()
    }
}
