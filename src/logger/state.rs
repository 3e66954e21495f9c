//! Logger lifecycle states.

use serde::Serialize;
use strum_macros::{AsRefStr, Display};

/// Lifecycle of a [`Logger`](super::Logger).
///
/// `Unconfigured -> Configured -> Running -> Draining -> Stopped`. A failed
/// configuration leaves the logger `Unconfigured`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LoggerState {
    /// Nothing loaded yet.
    #[default]
    Unconfigured,
    /// Sensors built and jobs scheduled.
    Configured,
    /// Scheduling loop active.
    Running,
    /// Tearing down: worker pool, control endpoint, then output writer.
    Draining,
    /// Fully torn down.
    Stopped,
}

impl LoggerState {
    /// Whether the logger has begun or finished teardown.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Draining | Self::Stopped)
    }
}
