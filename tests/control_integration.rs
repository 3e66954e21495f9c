//! Control Endpoint Integration Tests
//!
//! Drive a running logger over UDP with the control client.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;

use databear::config::AppConfig;
use databear::control::{
    ControlClient, ControlEndpoint, ControlError, RESPONSE_INVALID_COMMAND,
    RESPONSE_SENSOR_NOT_FOUND,
};
use databear::logger::{Logger, LoggerState};
use databear::storage::MemoryWriter;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

// =============================================================================
// Test Helpers
// =============================================================================

const CONFIG: &str = r#"
logger:
  name: controltest
sensors:
  - name: tph1
    sensor_type: simulator
    serial_number: "6166"
    measure_interval: 1s
  - name: tph2
    sensor_type: simulator
    serial_number: "6167"
    measure_interval: 1s
datalogger:
  settings:
    - store: measure1
      sensor: tph1
      storage_interval: 2s
      process: sample
"#;

/// Start a configured logger with its endpoint on a random port.
///
/// Returns `None` when the sandbox forbids binding.
async fn start_logger() -> Option<(SocketAddr, MemoryWriter, JoinHandle<Logger>)> {
    let endpoint = match ControlEndpoint::bind("127.0.0.1:0".parse().unwrap()).await {
        Ok(e) => e,
        Err(ControlError::Bind { source, .. }) if source.kind() == ErrorKind::PermissionDenied => {
            // Some sandboxed environments disallow binding; skip the test.
            return None;
        }
        Err(e) => panic!("Failed to bind control endpoint: {e}"),
    };
    let addr = endpoint.local_addr().unwrap();

    let config = AppConfig::from_yaml(CONFIG).unwrap();
    let writer = MemoryWriter::new();
    let mut logger = Logger::new(Box::new(writer.clone()));
    logger.load_configuration(&config).await.unwrap();

    let task = tokio::spawn(async move {
        logger.run(Some(endpoint)).await.unwrap();
        logger
    });
    Some((addr, writer, task))
}

fn client(addr: SocketAddr) -> ControlClient {
    ControlClient::new(addr).with_timeout(Duration::from_secs(2))
}

// =============================================================================
// Query Commands
// =============================================================================

#[tokio::test]
async fn test_status() {
    let Some((addr, _writer, task)) = start_logger().await else {
        return;
    };

    let response = client(addr).send("status", None).await.unwrap();
    assert!(response.is_ok());
    assert!(response.data.is_none());

    client(addr).send("shutdown", None).await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_getdata() {
    let Some((addr, _writer, task)) = start_logger().await else {
        return;
    };
    let client = client(addr);

    // nothing measured yet
    let response = client.send("getdata", Some("tph1")).await.unwrap();
    assert!(response.is_ok());
    let data = response.data.unwrap();
    assert!(data["measure1"].is_null());
    assert_eq!(data.as_object().unwrap().len(), 3);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let data = client
        .send("getdata", Some("tph1"))
        .await
        .unwrap()
        .data
        .unwrap();
    let entry = data["measure2"].as_array().unwrap();
    assert_eq!(entry.len(), 2);
    assert!(entry[0].is_string());
    assert!(entry[1].is_f64());

    let response = client.send("getdata", Some("ghost")).await.unwrap();
    assert_eq!(response.response, RESPONSE_SENSOR_NOT_FOUND);

    client.send("shutdown", None).await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn test_invalid_commands() {
    let Some((addr, _writer, task)) = start_logger().await else {
        return;
    };
    let client = client(addr);

    let response = client.send("reboot", None).await.unwrap();
    assert_eq!(response.response, RESPONSE_INVALID_COMMAND);

    // getdata needs a sensor name
    let response = client.send("getdata", None).await.unwrap();
    assert_eq!(response.response, RESPONSE_INVALID_COMMAND);

    // not JSON at all
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(b"status please", addr).await.unwrap();
    let mut buf = [0u8; 1024];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let raw: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
    assert_eq!(raw, serde_json::json!({"response": "Invalid Command"}));

    // the endpoint keeps serving
    assert!(client.send("status", None).await.unwrap().is_ok());

    client.send("shutdown", None).await.unwrap();
    task.await.unwrap();
}

// =============================================================================
// Steering Commands
// =============================================================================

#[tokio::test]
async fn test_stop_sensor() {
    let Some((addr, _writer, task)) = start_logger().await else {
        return;
    };
    let client = client(addr);

    let response = client.send("stop", Some("ghost")).await.unwrap();
    assert_eq!(response.response, RESPONSE_SENSOR_NOT_FOUND);

    assert!(client.send("stop", Some("tph1")).await.unwrap().is_ok());
    // already stopped
    let response = client.send("stop", Some("tph1")).await.unwrap();
    assert_eq!(response.response, RESPONSE_SENSOR_NOT_FOUND);

    // a stopped sensor can still be queried
    assert!(client.send("getdata", Some("tph1")).await.unwrap().is_ok());

    client.send("shutdown", None).await.unwrap();
    let logger = task.await.unwrap();
    let tasks: Vec<String> = logger.jobs().into_iter().map(|j| j.task).collect();
    assert_eq!(tasks, vec!["measure tph2".to_string()]);
}

#[tokio::test]
async fn test_shutdown_drains_logger() {
    let Some((addr, writer, task)) = start_logger().await else {
        return;
    };
    let client = client(addr);

    let response = client.send("shutdown", None).await.unwrap();
    assert!(response.is_ok());

    let logger = tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(logger.state(), LoggerState::Stopped);
    assert!(logger.control_addr().is_none());
    assert!(writer.is_closed());

    // nobody answers any more
    let result = client
        .clone()
        .with_timeout(Duration::from_millis(200))
        .send("status", None)
        .await;
    assert!(result.is_err());
}
