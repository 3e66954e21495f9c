//! Control protocol client.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::control::ControlError;
use crate::control::protocol::{ControlRequest, ControlResponse};

/// Default response timeout (5 seconds).
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest response datagram accepted.
const MAX_RESPONSE: usize = 64 * 1024;

/// Sends single control commands to a logger.
#[derive(Debug, Clone)]
pub struct ControlClient {
    target: SocketAddr,
    timeout: Duration,
}

impl ControlClient {
    /// Client for the endpoint at `target`.
    pub fn new(target: SocketAddr) -> Self {
        Self {
            target,
            timeout: DEFAULT_CLIENT_TIMEOUT,
        }
    }

    /// Set the response timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send `command` with an optional argument.
    pub async fn send(
        &self,
        command: &str,
        arg: Option<&str>,
    ) -> Result<ControlResponse, ControlError> {
        let mut request = ControlRequest::new(command);
        request.arg = arg.map(str::to_string);
        self.request(&request).await
    }

    /// Send a request and wait for its response.
    pub async fn request(&self, request: &ControlRequest) -> Result<ControlResponse, ControlError> {
        let local: SocketAddr = if self.target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(self.target).await?;
        socket.send(&serde_json::to_vec(request)?).await?;

        let mut buf = vec![0u8; MAX_RESPONSE];
        let len = tokio::time::timeout(self.timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| ControlError::Timeout(self.target))??;
        Ok(serde_json::from_slice(&buf[..len])?)
    }
}
