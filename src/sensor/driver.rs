//! Hardware driver collaborator.
//!
//! A driver turns a virtual port identifier into a connected byte stream.
//! Field installs reach RS-485 sensors through TCP serial gateways, so the
//! production driver is [`TcpPortDriver`]; tests use [`MemoryDriver`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::sensor::traits::SensorSpec;

/// Default port connect timeout (3 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Buffer size of in-memory ports.
const MEMORY_PORT_CAPACITY: usize = 4096;

/// A connected byte stream to a sensor.
pub trait Port: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Port for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// Errors raised while opening a port.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The virtual port is not mapped to anything.
    #[error("unknown virtual port '{0}'")]
    UnknownPort(String),

    /// Connection failed.
    #[error("port i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection did not complete in time.
    #[error("timeout connecting to '{0}'")]
    Timeout(String),
}

/// Serial line settings a sensor declares for its port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSettings {
    /// Baud rate.
    pub baud: u32,
    /// Hardware address on the bus.
    pub address: Option<u32>,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud: 9600,
            address: None,
        }
    }
}

impl PortSettings {
    /// Line settings declared by a sensor: `settings.baud` and its address.
    pub fn for_sensor(spec: &SensorSpec) -> Self {
        let baud = spec
            .settings
            .get("baud")
            .and_then(serde_json::Value::as_u64)
            .and_then(|b| u32::try_from(b).ok())
            .unwrap_or(Self::default().baud);
        Self {
            baud,
            address: spec.address,
        }
    }
}

/// Opens ports by virtual identifier.
#[async_trait::async_trait]
pub trait HardwareDriver: Send + Sync + 'static {
    /// Connect to `virtual_port` with the given line settings.
    async fn connect(
        &self,
        virtual_port: &str,
        settings: &PortSettings,
    ) -> Result<Box<dyn Port>, DriverError>;
}

/// Driver reaching ports through TCP serial gateways.
#[derive(Debug, Clone)]
pub struct TcpPortDriver {
    ports: BTreeMap<String, String>,
    connect_timeout: Duration,
}

impl TcpPortDriver {
    /// Create a driver from a `virtual port -> host:port` map.
    pub fn new(ports: BTreeMap<String, String>) -> Self {
        Self {
            ports,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

#[async_trait::async_trait]
impl HardwareDriver for TcpPortDriver {
    async fn connect(
        &self,
        virtual_port: &str,
        settings: &PortSettings,
    ) -> Result<Box<dyn Port>, DriverError> {
        let target = self
            .ports
            .get(virtual_port)
            .ok_or_else(|| DriverError::UnknownPort(virtual_port.to_string()))?;

        let stream = timeout(self.connect_timeout, TcpStream::connect(target))
            .await
            .map_err(|_| DriverError::Timeout(target.clone()))??;
        stream.set_nodelay(true)?;

        tracing::info!(
            port = %virtual_port,
            target = %target,
            baud = settings.baud,
            "Port connected"
        );
        Ok(Box::new(stream))
    }
}

/// In-process driver whose ports are duplex pipes.
///
/// [`attach`](Self::attach) creates a port and returns the far end, which
/// plays the role of the device. A [`detached`](Self::detached) driver
/// also opens the named ports with no device behind them, for dry runs.
#[derive(Debug, Default)]
pub struct MemoryDriver {
    ports: Mutex<HashMap<String, DuplexStream>>,
    detached: BTreeSet<String>,
}

impl MemoryDriver {
    /// Create a driver with no ports.
    pub fn new() -> Self {
        Self::default()
    }

    /// Driver that opens any of `virtual_ports` any number of times.
    ///
    /// Reads on such a port see end of stream.
    pub fn detached<I, S>(virtual_ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ports: Mutex::default(),
            detached: virtual_ports.into_iter().map(Into::into).collect(),
        }
    }

    /// Create `virtual_port` and return the device side of it.
    pub fn attach(&self, virtual_port: impl Into<String>) -> DuplexStream {
        let (host, device) = tokio::io::duplex(MEMORY_PORT_CAPACITY);
        self.ports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(virtual_port.into(), host);
        device
    }
}

#[async_trait::async_trait]
impl HardwareDriver for MemoryDriver {
    async fn connect(
        &self,
        virtual_port: &str,
        _settings: &PortSettings,
    ) -> Result<Box<dyn Port>, DriverError> {
        if let Some(port) = self
            .ports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(virtual_port)
        {
            return Ok(Box::new(port));
        }
        if self.detached.contains(virtual_port) {
            let (host, _device) = tokio::io::duplex(MEMORY_PORT_CAPACITY);
            return Ok(Box::new(host));
        }
        Err(DriverError::UnknownPort(virtual_port.to_string()))
    }
}
