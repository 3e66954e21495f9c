//! Sensor Layer
//!
//! Pluggable sensors that acquire timestamped readings into an in-memory
//! buffer, and the hardware drivers that connect them to their ports.
//!
//! # Architecture
//!
//! - [`Sensor`]: Core trait; one `measure()` per acquisition cycle plus
//!   windowed `getdata` / `cleardata` over the buffered readings
//! - [`MeasurementBuffer`]: Per-measurement, time-ordered reading store
//! - [`HardwareDriver`]: Opens a virtual port ([`TcpPortDriver`], [`MemoryDriver`])
//! - [`SensorRegistry`]: Sensor type name to constructor
//!
//! # Example
//!
//! ```
//! use databear::scheduler::SystemClock;
//! use databear::sensor::{SensorContext, SensorRegistry, SensorSpec};
//! use std::time::Duration;
//!
//! let registry = SensorRegistry::with_builtin();
//! let spec = SensorSpec::new("sim1", "0001", Duration::from_secs(5));
//! let ctx = SensorContext { clock: SystemClock::shared(), port: None };
//! let sensor = registry.build("simulator", &spec, ctx).unwrap();
//! assert_eq!(sensor.measurement_names(), vec!["measure1", "measure2", "measure3"]);
//! ```

mod buffer;
mod driver;
mod registry;
pub mod simulator;
pub mod stream;
mod traits;

pub use buffer::MeasurementBuffer;
pub use driver::{DriverError, HardwareDriver, MemoryDriver, Port, PortSettings, TcpPortDriver};
pub use registry::{SensorFactory, SensorRegistry};
pub use simulator::SimulatedSensor;
pub use stream::StreamSensor;
pub use traits::{
    MeasureError, MeasurementFailure, NO_PORT, Reading, Sensor, SensorContext, SensorSpec,
};
