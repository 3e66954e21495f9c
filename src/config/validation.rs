//! Configuration errors and parsing utilities.

use std::time::Duration;

use thiserror::Error;

/// Configuration error types.
///
/// Every variant is fatal at load time: the logger never starts running
/// with a partially wired schedule.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),

    /// A sensor is missing a setting its type requires.
    #[error("sensor '{sensor}': missing required setting '{setting}'")]
    MissingSetting {
        /// Sensor name.
        sensor: String,
        /// Name of the absent setting.
        setting: &'static str,
    },

    /// No constructor is registered for the sensor type.
    #[error("unknown sensor type '{0}'")]
    UnknownSensorType(String),

    /// Measurement interval is below the sensor's hardware floor.
    #[error("sensor '{sensor}': measure interval {interval:?} is below the sensor minimum {minimum:?}")]
    IntervalBelowMinimum {
        /// Sensor name.
        sensor: String,
        /// Configured interval.
        interval: Duration,
        /// Hardware floor.
        minimum: Duration,
    },

    /// Storage interval is shorter than the source sensor's measure interval.
    #[error(
        "logging rule '{measurement}' on sensor '{sensor}': storage interval {storage:?} is below the measure interval {measure:?}"
    )]
    StorageIntervalTooShort {
        /// Measurement name.
        measurement: String,
        /// Source sensor.
        sensor: String,
        /// Configured storage interval.
        storage: Duration,
        /// Sensor measure interval.
        measure: Duration,
    },

    /// A logging rule references a sensor or measurement that does not exist.
    #[error("logging rule references unknown {kind} '{name}'")]
    UnknownReference {
        /// "sensor" or "measurement".
        kind: &'static str,
        /// Referenced name.
        name: String,
    },

    /// The hardware driver could not open a sensor's port.
    #[error("sensor '{sensor}': failed to open port '{port}': {reason}")]
    PortUnavailable {
        /// Sensor name.
        sensor: String,
        /// Virtual port identifier.
        port: String,
        /// Driver failure.
        reason: String,
    },
}

/// Parse duration string using humantime.
///
/// Supports various formats: `30s`, `1m`, `5m30s`, `1h`, `2h30m`, `1d`, `100ms`, etc.
///
/// # Examples
///
/// ```
/// use databear::config::parse_duration;
///
/// assert_eq!(parse_duration("30s").unwrap().as_secs(), 30);
/// assert_eq!(parse_duration("1m").unwrap().as_secs(), 60);
/// assert_eq!(parse_duration("24h").unwrap().as_secs(), 86400);
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration string is empty".to_string());
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Expand environment variables in a string.
/// Supports ${VAR} and ${VAR:-default} syntax.
pub fn expand_env_vars(input: &str) -> String {
    static ENV_VAR_REGEX: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();

    let regex = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("failed to compile env var regex")
    });

    regex
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var_name).unwrap_or_else(|_| default_value.to_string())
        })
        .into_owned()
}
