//! UDP control endpoint.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::control::ControlError;
use crate::control::protocol::{ControlCommand, ControlResponse, current_data};
use crate::logger::LoggerHandle;

/// Largest request datagram accepted.
pub const MAX_DATAGRAM: usize = 1024;

/// Bound control socket, not yet serving.
#[derive(Debug)]
pub struct ControlEndpoint {
    socket: UdpSocket,
}

impl ControlEndpoint {
    /// Bind the control socket.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ControlError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ControlError::Bind { addr, source })?;
        Ok(Self { socket })
    }

    /// Address actually bound (resolves port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ControlError> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve requests on a spawned task until stopped.
    pub fn start(self, logger: LoggerHandle) -> Result<RunningEndpoint, ControlError> {
        let addr = self.local_addr()?;
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(serve(self.socket, logger, stop_rx));
        tracing::info!(addr = %addr, "Control endpoint listening");
        Ok(RunningEndpoint {
            addr,
            stop: Some(stop_tx),
            task,
        })
    }
}

/// Handle to a serving endpoint.
#[derive(Debug)]
pub struct RunningEndpoint {
    addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RunningEndpoint {
    /// Bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal the accept loop to stop and join it.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::error!(error = %e, "Control endpoint task failed");
        }
        tracing::info!(addr = %self.addr, "Control endpoint stopped");
    }
}

async fn serve(socket: UdpSocket, logger: LoggerHandle, mut stop: oneshot::Receiver<()>) {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            _ = &mut stop => break,
            received = socket.recv_from(&mut buf) => {
                let (len, peer) = match received {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(error = %e, "Control receive failed");
                        continue;
                    }
                };

                let response = respond(&logger, &buf[..len]).await;
                match serde_json::to_vec(&response) {
                    Ok(bytes) => {
                        if let Err(e) = socket.send_to(&bytes, peer).await {
                            tracing::warn!(peer = %peer, error = %e, "Control reply failed");
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to encode control response"),
                }
            }
        }
    }
}

/// Answer one request datagram.
pub async fn respond(logger: &LoggerHandle, datagram: &[u8]) -> ControlResponse {
    let Some(command) = ControlCommand::decode(datagram) else {
        tracing::debug!(
            request = %String::from_utf8_lossy(datagram),
            "Invalid control command"
        );
        return ControlResponse::invalid_command();
    };
    tracing::debug!(command = ?command, "Control command");

    match command {
        ControlCommand::Status => ControlResponse::ok(),
        ControlCommand::GetData(name) => match logger.sensor(&name) {
            Some(sensor) => ControlResponse::with_data(current_data(&sensor.getcurrentdata())),
            None => ControlResponse::sensor_not_found(),
        },
        ControlCommand::Stop(name) => {
            if logger.sensor(&name).is_none() {
                return ControlResponse::sensor_not_found();
            }
            match logger.stop_sensor(&name).await {
                Ok(true) => ControlResponse::ok(),
                Ok(false) => ControlResponse::sensor_not_found(),
                Err(e) => {
                    tracing::warn!(sensor = %name, error = %e, "Stop command not applied");
                    ControlResponse::invalid_command()
                }
            }
        }
        ControlCommand::Shutdown => {
            if let Err(e) = logger.shutdown().await {
                tracing::warn!(error = %e, "Shutdown command not delivered");
            }
            ControlResponse::ok()
        }
    }
}
