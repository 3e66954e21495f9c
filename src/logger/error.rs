//! Logger error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::control::ControlError;
use crate::logger::LoggerState;
use crate::process::ReduceError;
use crate::scheduler::SchedulerError;
use crate::storage::StorageError;

/// Errors raised by the logger.
///
/// Measurement failures are not represented here: they are logged by the
/// worker pool and never reach the scheduling loop.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// Configuration is invalid; fatal at load time.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Scheduler rejected a job.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// Reduction failed.
    #[error(transparent)]
    Reduce(#[from] ReduceError),

    /// Output writer failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Control endpoint failed.
    #[error(transparent)]
    Control(#[from] ControlError),

    /// Operation not allowed in the current lifecycle state.
    #[error("logger is {actual}, expected {expected}")]
    InvalidState {
        /// Required state.
        expected: LoggerState,
        /// Current state.
        actual: LoggerState,
    },

    /// The scheduling loop is not accepting commands.
    #[error("logger is not running")]
    NotRunning,
}
