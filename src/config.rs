//! Configuration module for the databear logger.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Logger identity and control endpoint (bind address, UDP port)
//! - Output writer (CSV or SQLite) and first-window look-back
//! - Virtual port map, sensors and logging rules
//!
//! The logger consumes sensors and rules through [`ConfigSource`], which
//! [`AppConfig`] implements.

mod app;
mod sensor;
mod validation;

pub use app::{
    AppConfig, ControlConfig, DEFAULT_CONTROL_PORT, DEFAULT_WINDOW_LOOKBACK, DataloggerConfig,
    LoggerConfig, OutputConfig,
};
pub use sensor::{ConfigSource, LoggingRecord, SensorRecord};
pub use validation::{ConfigError, expand_env_vars, parse_duration};
