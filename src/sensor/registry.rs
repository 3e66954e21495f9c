//! Sensor type registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ConfigError;
use crate::sensor::simulator::{SIMULATOR_TYPE, SimulatedSensor};
use crate::sensor::stream::{STREAM_TYPE, StreamSensor};
use crate::sensor::traits::{Sensor, SensorContext, SensorSpec};

/// Constructor registered for a sensor type.
pub type SensorFactory =
    Arc<dyn Fn(&SensorSpec, SensorContext) -> Result<Box<dyn Sensor>, ConfigError> + Send + Sync>;

/// Maps sensor type names to constructors.
#[derive(Clone, Default)]
pub struct SensorRegistry {
    factories: HashMap<String, SensorFactory>,
}

impl SensorRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `simulator` and `stream` types.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(SIMULATOR_TYPE, SimulatedSensor::boxed);
        registry.register(STREAM_TYPE, StreamSensor::boxed);
        registry
    }

    /// Register (or replace) a constructor.
    pub fn register<F>(&mut self, sensor_type: impl Into<String>, factory: F)
    where
        F: Fn(&SensorSpec, SensorContext) -> Result<Box<dyn Sensor>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(sensor_type.into(), Arc::new(factory));
    }

    /// Whether `sensor_type` is known.
    pub fn contains(&self, sensor_type: &str) -> bool {
        self.factories.contains_key(sensor_type)
    }

    /// Construct a sensor of `sensor_type`.
    ///
    /// # Errors
    /// `UnknownSensorType` if nothing is registered under that name, or
    /// whatever the constructor rejects.
    pub fn build(
        &self,
        sensor_type: &str,
        spec: &SensorSpec,
        ctx: SensorContext,
    ) -> Result<Box<dyn Sensor>, ConfigError> {
        let factory = self
            .factories
            .get(sensor_type)
            .ok_or_else(|| ConfigError::UnknownSensorType(sensor_type.to_string()))?;
        factory(spec, ctx)
    }

    /// Registered type names, sorted.
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl std::fmt::Debug for SensorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorRegistry")
            .field("types", &self.types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SystemClock;
    use std::time::Duration;

    fn ctx() -> SensorContext {
        SensorContext {
            clock: SystemClock::shared(),
            port: None,
        }
    }

    #[test]
    fn test_builtin_types() {
        let registry = SensorRegistry::with_builtin();
        assert_eq!(registry.types(), vec!["simulator", "stream"]);
        assert!(registry.contains("simulator"));
    }

    #[test]
    fn test_build_unknown_type() {
        let registry = SensorRegistry::with_builtin();
        let spec = SensorSpec::new("x", "1", Duration::from_secs(1));
        let Err(err) = registry.build("dyacon_tph1", &spec, ctx()) else {
            panic!("unknown sensor type was built");
        };
        assert!(matches!(err, ConfigError::UnknownSensorType(t) if t == "dyacon_tph1"));
    }

    #[test]
    fn test_register_custom_type() {
        let mut registry = SensorRegistry::new();
        registry.register("bench", SimulatedSensor::boxed);

        let spec = SensorSpec::new("b1", "1", Duration::from_secs(2));
        let sensor = registry.build("bench", &spec, ctx()).unwrap();
        assert_eq!(sensor.name(), "b1");
        assert_eq!(sensor.measure_interval(), Duration::from_secs(2));
        assert!(!registry.contains("simulator"));
    }
}
