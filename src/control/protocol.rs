//! Control protocol wire types.
//!
//! One JSON request per datagram, one JSON response back:
//!
//! ```text
//! {"command": "getdata", "arg": "tph1"}
//! {"response": "OK", "data": {"airT": ["2024-01-01 10:30:05.000000", 21.5], "rh": null}}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sensor::Reading;
use crate::storage::format_timestamp;

/// Response to a successful command.
pub const RESPONSE_OK: &str = "OK";

/// Response when the named sensor does not exist.
pub const RESPONSE_SENSOR_NOT_FOUND: &str = "Sensor not found";

/// Response to a malformed or unknown command.
pub const RESPONSE_INVALID_COMMAND: &str = "Invalid Command";

/// Raw request as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    /// Command name.
    pub command: String,
    /// Optional argument, usually a sensor name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<String>,
}

impl ControlRequest {
    /// Request with no argument.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            arg: None,
        }
    }

    /// Set the argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.arg = Some(arg.into());
        self
    }
}

/// A recognised command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Liveness probe.
    Status,
    /// Latest reading of every measurement of a sensor.
    GetData(String),
    /// Cancel every job of a sensor.
    Stop(String),
    /// Drain and stop the logger.
    Shutdown,
}

impl ControlCommand {
    /// Interpret a request. `None` for unknown commands or a missing argument.
    pub fn parse(request: &ControlRequest) -> Option<Self> {
        let arg = || request.arg.clone().filter(|a| !a.is_empty());
        match request.command.as_str() {
            "status" => Some(Self::Status),
            "getdata" => arg().map(Self::GetData),
            "stop" => arg().map(Self::Stop),
            "shutdown" => Some(Self::Shutdown),
            _ => None,
        }
    }

    /// Decode a datagram. `None` if it is not a valid request.
    pub fn decode(datagram: &[u8]) -> Option<Self> {
        let request: ControlRequest = serde_json::from_slice(datagram).ok()?;
        Self::parse(&request)
    }
}

/// Response as sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    /// `OK`, `Sensor not found` or `Invalid Command`.
    pub response: String,
    /// Payload of `getdata`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ControlResponse {
    /// `{"response": "OK"}`.
    pub fn ok() -> Self {
        Self {
            response: RESPONSE_OK.to_string(),
            data: None,
        }
    }

    /// `{"response": "OK", "data": ...}`.
    pub fn with_data(data: Value) -> Self {
        Self {
            response: RESPONSE_OK.to_string(),
            data: Some(data),
        }
    }

    /// `{"response": "Sensor not found"}`.
    pub fn sensor_not_found() -> Self {
        Self {
            response: RESPONSE_SENSOR_NOT_FOUND.to_string(),
            data: None,
        }
    }

    /// `{"response": "Invalid Command"}`.
    pub fn invalid_command() -> Self {
        Self {
            response: RESPONSE_INVALID_COMMAND.to_string(),
            data: None,
        }
    }

    /// Whether the command succeeded.
    pub fn is_ok(&self) -> bool {
        self.response == RESPONSE_OK
    }
}

/// `getdata` payload: measurement name to `[timestamp, value]`, or null.
pub fn current_data(latest: &BTreeMap<String, Option<Reading>>) -> Value {
    let map = latest
        .iter()
        .map(|(name, reading)| {
            let entry = match reading {
                Some(r) => serde_json::json!([format_timestamp(&r.timestamp), r.value]),
                None => Value::Null,
            };
            (name.clone(), entry)
        })
        .collect::<serde_json::Map<_, _>>();
    Value::Object(map)
}
