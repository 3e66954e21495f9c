//! DataBear - Field Telemetry Collector
//!
//! This crate provides the core of the DataBear data logger. It can be used
//! as a library by other Rust projects, or run as a standalone binary with
//! the `databear` executable.
//!
//! # Architecture
//!
//! - **Scheduler**: periodic jobs driven by a cooperative run loop
//! - **Sensors**: hardware-agnostic acquisition contract and built-in types
//! - **Process**: windowed reduction (`sample`, `average`, `min`, `max`, `dump`)
//! - **Storage**: CSV, SQLite and in-memory output writers
//! - **Logger**: orchestrates measurement, reduction and storage
//! - **Control**: UDP request/response endpoint and client
//!
//! # Example
//!
//! ```rust,no_run
//! use databear::{AppConfig, ControlEndpoint, Logger, open_writer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load("configs/databear.yaml")?;
//!     let writer = open_writer(&config.output).await?;
//!
//!     let mut logger = Logger::new(writer);
//!     logger.load_configuration(&config).await?;
//!     logger.run(Some(ControlEndpoint::bind(config.control.addr()?).await?)).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod control;
pub mod logger;
pub mod process;
pub mod scheduler;
pub mod sensor;
pub mod storage;

pub use config::{AppConfig, ConfigError, ConfigSource, LoggingRecord, SensorRecord};
pub use control::{ControlClient, ControlEndpoint, ControlError, ControlResponse};
pub use logger::{Logger, LoggerError, LoggerHandle, LoggerState, check_configuration};
pub use process::{ProcessKind, calculate};
pub use scheduler::{Clock, ManualClock, Scheduler, SystemClock, Tick};
pub use sensor::{Reading, Sensor, SensorRegistry, SensorSpec};
pub use storage::{DataRow, DataWriter, OutputKind, StorageError, open_writer};
