//! Logger Scenario Tests
//!
//! End-to-end runs on simulated time, from YAML configuration to rows in
//! the output file.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use databear::config::{AppConfig, OutputConfig};
use databear::logger::{Logger, LoggerState};
use databear::scheduler::{Clock, ManualClock};
use databear::storage::{CSV_HEADER, OutputKind, SqliteWriter, open_writer};

// =============================================================================
// Test Helpers
// =============================================================================

const CONFIG: &str = r#"
logger:
  name: scenario
sensors:
  - name: tph1
    sensor_type: simulator
    serial_number: "6166"
    virtual_port: none
    measure_interval: 5s
datalogger:
  settings:
    - store: measure2
      sensor: tph1
      storage_interval: 10s
      process: sample
    - store: measure1
      sensor: tph1
      storage_interval: 10s
      process: avg
    - store: measure3
      sensor: tph1
      storage_interval: 10s
      process: dump
"#;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 10, 30, 0).unwrap()
}

async fn configured_logger(clock: &ManualClock, output: OutputConfig) -> Logger {
    let config = AppConfig::from_yaml(CONFIG).unwrap();
    let writer = open_writer(&output).await.unwrap();
    let mut logger = Logger::new(writer).with_clock(Arc::new(clock.clone()));
    logger.load_configuration(&config).await.unwrap();
    logger
}

/// Advance simulated time in 5 second steps, running due jobs after each.
async fn run_for(logger: &mut Logger, clock: &ManualClock, secs: u64) {
    for _ in 0..secs / 5 {
        clock.advance(Duration::from_secs(5));
        logger.run_pending().await.unwrap();
        logger.wait_measurements().await;
    }
}

fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let header = reader
        .headers()
        .unwrap()
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    (header, rows)
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_csv_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out/scenario.csv");
    let clock = ManualClock::new(start());
    let mut logger = configured_logger(
        &clock,
        OutputConfig {
            kind: OutputKind::Csv,
            path: path.clone(),
        },
    )
    .await;

    run_for(&mut logger, &clock, 20).await;
    logger.shutdown().await;
    assert_eq!(logger.state(), LoggerState::Stopped);

    let (header, rows) = read_csv(&path);
    assert_eq!(header, CSV_HEADER.to_vec());

    let expected: Vec<[&str; 4]> = vec![
        // window ending 10:30:10
        ["2024-01-01 10:30:05.000000", "measure2", "5", "tph1"],
        ["2024-01-01 10:30:10.000000", "measure1", "30", "tph1"],
        ["2024-01-01 10:30:05.000000", "measure3", "0", "tph1"],
        // window [10:30:10, 10:30:20)
        ["2024-01-01 10:30:15.000000", "measure2", "15", "tph1"],
        ["2024-01-01 10:30:20.000000", "measure1", "30", "tph1"],
        ["2024-01-01 10:30:10.000000", "measure3", "0", "tph1"],
        ["2024-01-01 10:30:15.000000", "measure3", "0", "tph1"],
    ];
    let expected: Vec<Vec<String>> = expected
        .into_iter()
        .map(|r| r.iter().map(|s| s.to_string()).collect())
        .collect();
    assert_eq!(rows, expected);
}

#[tokio::test]
async fn test_csv_restart_appends() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.csv");
    let output = OutputConfig {
        kind: OutputKind::Csv,
        path: path.clone(),
    };

    for _ in 0..2 {
        let clock = ManualClock::new(start());
        let mut logger = configured_logger(&clock, output.clone()).await;
        run_for(&mut logger, &clock, 10).await;
        logger.shutdown().await;
    }

    // one header, three rows per run
    let (_, rows) = read_csv(&path);
    assert_eq!(rows.len(), 6);
}

#[tokio::test]
async fn test_sqlite_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.db");
    let clock = ManualClock::new(start());
    let mut logger = configured_logger(
        &clock,
        OutputConfig {
            kind: OutputKind::Sqlite,
            path: path.clone(),
        },
    )
    .await;

    run_for(&mut logger, &clock, 20).await;
    logger.shutdown().await;

    let db = SqliteWriter::open(&path).await.unwrap();
    let rows: Vec<(String, String, f64)> =
        sqlx::query_as("SELECT dtstamp, measurement, value FROM data ORDER BY id")
            .fetch_all(db.pool().inner())
            .await
            .unwrap();
    assert_eq!(rows.len(), 7);
    assert_eq!(
        rows[0],
        ("2024-01-01 10:30:05.000000".to_string(), "measure2".to_string(), 5.0)
    );
    assert_eq!(rows[4].2, 30.0);
}

#[tokio::test]
async fn test_stalled_loop_catches_up_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stall.csv");
    let clock = ManualClock::new(start());
    let mut logger = configured_logger(
        &clock,
        OutputConfig {
            kind: OutputKind::Csv,
            path: path.clone(),
        },
    )
    .await;

    run_for(&mut logger, &clock, 5).await;

    // the loop was blocked for a minute: every job fires once, now
    clock.advance(Duration::from_secs(60));
    assert_eq!(logger.run_pending().await.unwrap(), 4);
    logger.wait_measurements().await;
    assert_eq!(logger.run_pending().await.unwrap(), 0);

    // later windows are measured from the reset
    let jobs = logger.jobs();
    assert!(jobs.iter().all(|j| j.next_run > clock.now()));
    logger.shutdown().await;

    let (_, rows) = read_csv(&path);
    assert_eq!(rows.len(), 3);
    // sample of the only reading, taken at 10:30:05
    assert_eq!(rows[0][0], "2024-01-01 10:30:05.000000");
}
