//! Cross-task access to a running logger.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::logger::LoggerError;
use crate::sensor::Sensor;

/// How long a handle waits for the scheduling loop to answer a command.
const COMMAND_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Sensor set shared by the scheduling loop and the control endpoint.
pub type SharedSensors = Arc<RwLock<BTreeMap<String, Arc<dyn Sensor>>>>;

/// Requests consumed by the scheduling loop.
#[derive(Debug)]
pub enum LoggerCommand {
    /// Cancel every job of a sensor; replies whether any was found.
    Stop {
        /// Sensor name.
        sensor: String,
        /// Reply channel.
        reply: oneshot::Sender<bool>,
    },
    /// Leave the scheduling loop and drain.
    Shutdown,
}

/// Cloneable handle used by the control endpoint.
///
/// Reads go straight to the shared sensor set; anything that mutates the
/// schedule is queued for the scheduling loop.
#[derive(Clone)]
pub struct LoggerHandle {
    sensors: SharedSensors,
    commands: mpsc::Sender<LoggerCommand>,
}

impl LoggerHandle {
    pub(crate) fn new(sensors: SharedSensors, commands: mpsc::Sender<LoggerCommand>) -> Self {
        Self { sensors, commands }
    }

    /// Sensor by name.
    pub fn sensor(&self, name: &str) -> Option<Arc<dyn Sensor>> {
        self.sensors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Sensor names, sorted.
    pub fn sensor_names(&self) -> Vec<String> {
        self.sensors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Ask the scheduling loop to cancel the jobs of `sensor`.
    ///
    /// # Errors
    /// `NotRunning` if the loop does not answer.
    pub async fn stop_sensor(&self, sensor: &str) -> Result<bool, LoggerError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(LoggerCommand::Stop {
                sensor: sensor.to_string(),
                reply,
            })
            .await
            .map_err(|_| LoggerError::NotRunning)?;

        match tokio::time::timeout(COMMAND_REPLY_TIMEOUT, response).await {
            Ok(Ok(found)) => Ok(found),
            _ => Err(LoggerError::NotRunning),
        }
    }

    /// Queue a shutdown request. Does not wait for the drain.
    ///
    /// # Errors
    /// `NotRunning` if the loop has already gone away.
    pub async fn shutdown(&self) -> Result<(), LoggerError> {
        self.commands
            .send(LoggerCommand::Shutdown)
            .await
            .map_err(|_| LoggerError::NotRunning)
    }
}

impl std::fmt::Debug for LoggerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerHandle")
            .field("sensors", &self.sensor_names())
            .finish_non_exhaustive()
    }
}
