//! Control Layer
//!
//! Tiny request/response protocol over UDP for querying and steering a
//! running logger.
//!
//! # Commands
//!
//! | command    | arg    | effect                                       |
//! |------------|--------|----------------------------------------------|
//! | `status`   |        | liveness probe                               |
//! | `getdata`  | sensor | latest reading per measurement               |
//! | `stop`     | sensor | cancel the sensor's measure and store jobs   |
//! | `shutdown` |        | drain the logger; answered before teardown   |
//!
//! Reads are served from the shared sensor set. `stop` and `shutdown` are
//! queued to the scheduling loop so the job set is only ever mutated there.

mod client;
mod endpoint;
mod protocol;

pub use client::{ControlClient, DEFAULT_CLIENT_TIMEOUT};
pub use endpoint::{ControlEndpoint, MAX_DATAGRAM, RunningEndpoint, respond};
pub use protocol::{
    ControlCommand, ControlRequest, ControlResponse, RESPONSE_INVALID_COMMAND, RESPONSE_OK,
    RESPONSE_SENSOR_NOT_FOUND, current_data,
};

use std::net::SocketAddr;

use thiserror::Error;

/// Control endpoint and client errors.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The control socket could not be bound.
    #[error("failed to bind control socket {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Socket i/o failed.
    #[error("control i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Message could not be encoded or decoded.
    #[error("control message error: {0}")]
    Json(#[from] serde_json::Error),

    /// No response arrived in time.
    #[error("no response from {0}")]
    Timeout(SocketAddr),
}
