//! Logger Layer
//!
//! The orchestrator tying sensors, the scheduler, the reduction pipeline
//! and the output writer together.
//!
//! # Architecture
//!
//! - [`Logger`]: owns the job set; measurement jobs are dispatched to the
//!   [`WorkerPool`], storage jobs run inline on the scheduling loop
//! - [`LoggerHandle`]: cloneable view used by the control endpoint; reads
//!   sensors directly and queues [`LoggerCommand`]s for anything else
//! - [`LoggerState`]: `Unconfigured -> Configured -> Running -> Draining -> Stopped`
//!
//! # Example
//!
//! ```rust,no_run
//! use databear::config::AppConfig;
//! use databear::control::ControlEndpoint;
//! use databear::logger::Logger;
//! use databear::storage::open_writer;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load("databear.yaml")?;
//! let writer = open_writer(&config.output).await?;
//! let mut logger = Logger::new(writer).with_window_lookback(config.window_lookback);
//! logger.load_configuration(&config).await?;
//!
//! let endpoint = ControlEndpoint::bind(config.control.addr()?).await?;
//! logger.run(Some(endpoint)).await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod handle;
mod state;
mod task;
mod worker;

pub use error::LoggerError;
pub use handle::{LoggerCommand, LoggerHandle, SharedSensors};
pub use state::LoggerState;
pub use task::JobTask;
pub use worker::{DEFAULT_SHUTDOWN_TIMEOUT, WorkerPool};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};

use crate::config::{
    AppConfig, ConfigError, ConfigSource, DEFAULT_WINDOW_LOOKBACK, LoggingRecord, SensorRecord,
};
use crate::control::{ControlEndpoint, RunningEndpoint};
use crate::process::calculate;
use crate::scheduler::{JobId, JobInfo, Scheduler, SchedulerError, SharedClock, SystemClock, Tick};
use crate::sensor::{
    HardwareDriver, MemoryDriver, PortSettings, Sensor, SensorContext, SensorRegistry,
    TcpPortDriver,
};
use crate::storage::{DataRow, DataWriter, MemoryWriter};

/// Capacity of the command queue feeding the scheduling loop.
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Longest idle sleep when no job is registered.
const MAX_IDLE: Duration = Duration::from_secs(60);

/// Field data logger.
pub struct Logger {
    name: String,
    state: LoggerState,
    clock: SharedClock,
    registry: SensorRegistry,
    driver: Arc<dyn HardwareDriver>,
    scheduler: Scheduler<JobTask>,
    sensors: SharedSensors,
    acquire_locks: HashMap<String, Arc<Mutex<()>>>,
    last_stored: HashMap<JobId, DateTime<Utc>>,
    writer: Box<dyn DataWriter>,
    workers: Option<WorkerPool>,
    window_lookback: Duration,
    endpoint: Option<RunningEndpoint>,
    commands_tx: mpsc::Sender<LoggerCommand>,
    commands_rx: mpsc::Receiver<LoggerCommand>,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("jobs", &self.scheduler.job_count())
            .finish_non_exhaustive()
    }
}

impl Logger {
    /// Create an unconfigured logger writing to `writer`.
    ///
    /// Defaults: system clock, built-in sensor types, a TCP port driver with
    /// no ports, and a 24 hour first-window look-back.
    pub fn new(writer: Box<dyn DataWriter>) -> Self {
        let clock = SystemClock::shared();
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        Self {
            name: "databear".to_string(),
            state: LoggerState::Unconfigured,
            scheduler: Scheduler::new(Arc::clone(&clock)),
            clock,
            registry: SensorRegistry::with_builtin(),
            driver: Arc::new(TcpPortDriver::new(BTreeMap::new())),
            sensors: Arc::new(RwLock::new(BTreeMap::new())),
            acquire_locks: HashMap::new(),
            last_stored: HashMap::new(),
            writer,
            workers: None,
            window_lookback: DEFAULT_WINDOW_LOOKBACK,
            endpoint: None,
            commands_tx,
            commands_rx,
        }
    }

    /// Use `clock` for scheduling and reading timestamps.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.scheduler = Scheduler::new(Arc::clone(&clock));
        self.clock = clock;
        self
    }

    /// Use `registry` to construct sensors.
    pub fn with_registry(mut self, registry: SensorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Use `driver` to open sensor ports.
    pub fn with_driver(mut self, driver: Arc<dyn HardwareDriver>) -> Self {
        self.driver = driver;
        self
    }

    /// Look-back of a storage rule's first window.
    pub fn with_window_lookback(mut self, lookback: Duration) -> Self {
        self.window_lookback = lookback;
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Logger name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LoggerState {
        self.state
    }

    /// Handle for the control endpoint.
    pub fn handle(&self) -> LoggerHandle {
        LoggerHandle::new(Arc::clone(&self.sensors), self.commands_tx.clone())
    }

    /// Sensor by name.
    pub fn sensor(&self, name: &str) -> Option<Arc<dyn Sensor>> {
        self.sensors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Number of constructed sensors.
    pub fn sensor_count(&self) -> usize {
        self.sensors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Snapshot of the scheduled jobs.
    pub fn jobs(&self) -> Vec<JobInfo> {
        self.scheduler.jobs()
    }

    /// Address of the control endpoint while it is serving.
    pub fn control_addr(&self) -> Option<std::net::SocketAddr> {
        self.endpoint.as_ref().map(RunningEndpoint::local_addr)
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Build every active sensor and schedule its jobs.
    ///
    /// Nothing stays wired on failure: the logger is left `Unconfigured`
    /// with no sensors and no jobs.
    ///
    /// # Errors
    /// `InvalidState` unless unconfigured, otherwise the first
    /// configuration error encountered.
    pub async fn load_configuration(&mut self, source: &dyn ConfigSource) -> Result<(), LoggerError> {
        self.expect_state(LoggerState::Unconfigured)?;
        self.name = source.logger_name().to_string();

        if let Err(e) = self.wire(source).await {
            tracing::error!(logger = %self.name, error = %e, "Configuration failed");
            self.scheduler = Scheduler::new(Arc::clone(&self.clock));
            self.sensors
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
            self.acquire_locks.clear();
            return Err(e);
        }

        self.state = LoggerState::Configured;
        tracing::info!(
            logger = %self.name,
            sensors = self.sensor_count(),
            jobs = self.scheduler.job_count(),
            "Logger configured"
        );
        Ok(())
    }

    async fn wire(&mut self, source: &dyn ConfigSource) -> Result<(), LoggerError> {
        let mut inactive = HashSet::new();
        for record in source.sensor_records() {
            if !record.active {
                tracing::debug!(sensor = %record.name(), "Skipping inactive sensor");
                inactive.insert(record.name().to_string());
                continue;
            }
            let name = record.name().to_string();
            self.add_sensor(record).await?;
            self.schedule_measurement(&name)?;
        }

        for rule in source.logging_records() {
            if !rule.active {
                tracing::debug!(rule = %rule, "Skipping inactive logging rule");
                continue;
            }
            if inactive.contains(&rule.sensor) {
                tracing::debug!(rule = %rule, "Skipping logging rule of inactive sensor");
                continue;
            }
            self.schedule_storage(rule)?;
        }
        Ok(())
    }

    /// Construct a sensor through the registry and add it to the set.
    ///
    /// Opens the sensor's port first unless it is the `none` marker.
    pub async fn add_sensor(&mut self, record: SensorRecord) -> Result<(), LoggerError> {
        let spec = record.spec;
        if self.sensor(&spec.name).is_some() {
            return Err(ConfigError::ValidationError(format!(
                "duplicate sensor name: '{}'",
                spec.name
            ))
            .into());
        }

        let port = match spec.physical_port() {
            Some(port) => {
                let settings = PortSettings::for_sensor(&spec);
                let connected = self.driver.connect(port, &settings).await.map_err(|e| {
                    ConfigError::PortUnavailable {
                        sensor: spec.name.clone(),
                        port: port.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                Some(connected)
            }
            None => None,
        };

        let ctx = SensorContext {
            clock: Arc::clone(&self.clock),
            port,
        };
        let sensor: Arc<dyn Sensor> = Arc::from(self.registry.build(&record.sensor_type, &spec, ctx)?);

        tracing::info!(
            sensor = %spec.name,
            sensor_type = %record.sensor_type,
            serial_number = %sensor.serial_number(),
            "Sensor added"
        );
        self.acquire_locks
            .insert(spec.name.clone(), Arc::new(Mutex::new(())));
        self.sensors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(spec.name, sensor);
        Ok(())
    }

    /// Schedule the periodic measurement of sensor `name`.
    ///
    /// # Errors
    /// `IntervalBelowMinimum` if the sensor's interval is faster than its
    /// hardware supports.
    pub fn schedule_measurement(&mut self, name: &str) -> Result<JobId, LoggerError> {
        let sensor = self.require_sensor(name)?;
        let interval = sensor.measure_interval();
        let minimum = sensor.min_interval();
        if interval < minimum {
            return Err(ConfigError::IntervalBelowMinimum {
                sensor: name.to_string(),
                interval,
                minimum,
            }
            .into());
        }

        let id = self.scheduler.every(interval)?.run(JobTask::Measure {
            sensor: name.to_string(),
        });
        tracing::debug!(sensor = %name, interval = ?interval, job_id = %id, "Measurement scheduled");
        Ok(id)
    }

    /// Schedule the periodic storage of one measurement.
    ///
    /// # Errors
    /// `UnknownReference` for an unknown sensor or measurement,
    /// `StorageIntervalTooShort` if storing faster than measuring.
    pub fn schedule_storage(&mut self, rule: LoggingRecord) -> Result<JobId, LoggerError> {
        let sensor = self.require_sensor(&rule.sensor)?;
        if !sensor.buffer().contains(&rule.measurement) {
            return Err(ConfigError::UnknownReference {
                kind: "measurement",
                name: format!("{}/{}", rule.sensor, rule.measurement),
            }
            .into());
        }
        if rule.storage_interval < sensor.measure_interval() {
            return Err(ConfigError::StorageIntervalTooShort {
                measurement: rule.measurement,
                sensor: rule.sensor,
                storage: rule.storage_interval,
                measure: sensor.measure_interval(),
            }
            .into());
        }

        let interval = rule.storage_interval;
        let description = rule.to_string();
        let id = self.scheduler.every(interval)?.run(JobTask::Store { rule });
        tracing::debug!(rule = %description, job_id = %id, "Storage scheduled");
        Ok(id)
    }

    fn require_sensor(&self, name: &str) -> Result<Arc<dyn Sensor>, ConfigError> {
        self.sensor(name).ok_or_else(|| ConfigError::UnknownReference {
            kind: "sensor",
            name: name.to_string(),
        })
    }

    // =========================================================================
    // Jobs
    // =========================================================================

    /// Submit one acquisition of sensor `name` to the worker pool.
    ///
    /// Never blocks. A sensor whose previous acquisition is still running
    /// skips this cycle. Failures are logged by the worker.
    pub fn do_measurement(&mut self, name: &str) {
        let (Some(sensor), Some(lock)) = (self.sensor(name), self.acquire_locks.get(name).cloned())
        else {
            tracing::warn!(sensor = %name, "Measurement for unknown sensor");
            return;
        };
        let Ok(guard) = lock.try_lock_owned() else {
            tracing::warn!(sensor = %name, "Previous measurement still running, skipping cycle");
            return;
        };

        let submitted = self.workers().submit(async move {
            let _guard = guard;
            match sensor.measure().await {
                Ok(()) => tracing::trace!(sensor = %sensor.name(), "Measurement complete"),
                Err(e) => tracing::error!(
                    sensor = %e.sensor,
                    failed = ?e.measurements(),
                    error = %e,
                    "Measurement failed"
                ),
            }
        });
        if !submitted {
            tracing::warn!(sensor = %name, "Worker pool closed, measurement dropped");
        }
    }

    /// Reduce and write the window of `rule` ending at `tick.scheduled`.
    ///
    /// The window is `[previous, scheduled)`, or starts one look-back before
    /// `scheduled` when there is no previous store. Data is cleared only
    /// after every row was written and flushed. Returns the number of rows
    /// written.
    ///
    /// The scheduling loop passes the end of the rule's last successful
    /// window as `previous`, so a failed window is retried next cycle.
    pub async fn store_measurement(
        &mut self,
        rule: &LoggingRecord,
        tick: Tick,
    ) -> Result<usize, LoggerError> {
        let sensor = self.require_sensor(&rule.sensor)?;
        let end = tick.scheduled;
        let start = tick.previous.unwrap_or_else(|| self.lookback_start(end));

        let data = sensor.getdata(&rule.measurement, start, end);
        if data.is_empty() {
            tracing::warn!(
                sensor = %rule.sensor,
                measurement = %rule.measurement,
                start = %start,
                end = %end,
                "No data to store"
            );
            return Ok(0);
        }

        let values = calculate(rule.process, &data, end)?;
        for reading in &values {
            let row = DataRow {
                timestamp: reading.timestamp,
                measurement: rule.measurement.clone(),
                value: reading.value,
                sensor: rule.sensor.clone(),
                process: rule.process,
            };
            self.writer.write(&row).await?;
        }
        self.writer.flush().await?;

        let cleared = sensor.cleardata(&rule.measurement, start, end);
        tracing::debug!(
            sensor = %rule.sensor,
            measurement = %rule.measurement,
            process = %rule.process,
            rows = values.len(),
            cleared,
            "Stored measurement"
        );
        Ok(values.len())
    }

    fn lookback_start(&self, end: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.window_lookback)
            .ok()
            .and_then(|lookback| end.checked_sub_signed(lookback))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Cancel every job bound to sensor `name`. Returns whether any existed.
    ///
    /// The sensor itself stays queryable.
    pub fn stop_sensor(&mut self, name: &str) -> bool {
        let cancelled = self.scheduler.cancel_where(|task| task.references(name));
        for id in &cancelled {
            self.last_stored.remove(id);
        }
        if cancelled.is_empty() {
            tracing::debug!(sensor = %name, "Stop: no jobs found");
            return false;
        }
        tracing::info!(sensor = %name, jobs = cancelled.len(), "Sensor stopped");
        true
    }

    /// Run one scheduling pass.
    ///
    /// On an overrun every job is reset and the pass is retried, so each job
    /// fires once instead of replaying the backlog. Returns the number of
    /// jobs executed.
    pub async fn run_pending(&mut self) -> Result<usize, LoggerError> {
        let due = match self.scheduler.due_jobs() {
            Ok(due) => due,
            Err(SchedulerError::Overrun {
                job,
                scheduled,
                behind,
            }) => {
                tracing::warn!(
                    job_id = %job,
                    scheduled = %scheduled,
                    behind = ?behind,
                    "Scheduling overrun, resetting all jobs"
                );
                self.scheduler.reset();
                self.scheduler.due_jobs()?
            }
            Err(e) => return Err(e.into()),
        };

        for job in &due {
            match &job.task {
                JobTask::Measure { sensor } => self.do_measurement(sensor),
                JobTask::Store { rule } => {
                    // Windows start where the last stored one ended.
                    let tick = Tick {
                        scheduled: job.tick.scheduled,
                        previous: self.last_stored.get(&job.id).copied(),
                    };
                    match self.store_measurement(rule, tick).await {
                        Ok(_) => {
                            self.last_stored.insert(job.id, tick.scheduled);
                        }
                        Err(e) => tracing::error!(
                            sensor = %rule.sensor,
                            measurement = %rule.measurement,
                            window_start = ?tick.previous,
                            error = %e,
                            "Storage failed, data kept for retry"
                        ),
                    }
                }
            }
        }
        Ok(due.len())
    }

    /// Wait for every submitted measurement to finish.
    pub async fn wait_measurements(&mut self) {
        if let Some(workers) = self.workers.as_mut() {
            workers.wait_idle().await;
        }
    }

    fn workers(&mut self) -> &mut WorkerPool {
        let size = self.sensor_count();
        self.workers.get_or_insert_with(|| WorkerPool::new(size))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Serve `endpoint` and run the scheduling loop until shutdown.
    ///
    /// Returns after the logger is `Stopped`. A fault in the loop drains the
    /// logger before it is returned.
    pub async fn run(&mut self, endpoint: Option<ControlEndpoint>) -> Result<(), LoggerError> {
        self.expect_state(LoggerState::Configured)?;
        if let Some(endpoint) = endpoint {
            self.endpoint = Some(endpoint.start(self.handle())?);
        }
        let pool_size = self.workers().size();
        self.state = LoggerState::Running;
        tracing::info!(logger = %self.name, workers = pool_size, "Logger running");

        let result = self.run_loop().await;
        if let Err(e) = &result {
            tracing::error!(logger = %self.name, error = %e, "Scheduling loop failed");
        }
        self.shutdown().await;
        result
    }

    async fn run_loop(&mut self) -> Result<(), LoggerError> {
        loop {
            self.run_pending().await?;
            let idle = self.scheduler.idle_duration().unwrap_or(MAX_IDLE);

            tokio::select! {
                _ = tokio::time::sleep(idle) => {}
                command = self.commands_rx.recv() => match command {
                    Some(LoggerCommand::Stop { sensor, reply }) => {
                        let found = self.stop_sensor(&sensor);
                        let _ = reply.send(found);
                    }
                    Some(LoggerCommand::Shutdown) | None => {
                        tracing::info!(logger = %self.name, "Shutdown requested");
                        return Ok(());
                    }
                },
                Ok(()) = tokio::signal::ctrl_c() => {
                    tracing::info!(logger = %self.name, "Interrupted");
                    return Ok(());
                }
            }
        }
    }

    /// Drain the logger.
    ///
    /// Closes the worker pool (waiting for in-flight measurements), stops
    /// and joins the control endpoint, then closes the output writer.
    /// Calling it again is a no-op.
    pub async fn shutdown(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = LoggerState::Draining;
        tracing::info!(logger = %self.name, "Draining");

        if let Some(workers) = self.workers.as_mut() {
            workers.close().await;
        }

        // Answer commands that raced the shutdown.
        self.commands_rx.close();
        while let Ok(command) = self.commands_rx.try_recv() {
            if let LoggerCommand::Stop { sensor, reply } = command {
                let found = self.stop_sensor(&sensor);
                let _ = reply.send(found);
            }
        }

        if let Some(endpoint) = self.endpoint.take() {
            endpoint.stop().await;
        }
        if let Err(e) = self.writer.close().await {
            tracing::error!(logger = %self.name, error = %e, "Failed to close output writer");
        }

        self.state = LoggerState::Stopped;
        tracing::info!(logger = %self.name, "Logger stopped");
    }

    fn expect_state(&self, expected: LoggerState) -> Result<(), LoggerError> {
        if self.state != expected {
            return Err(LoggerError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }
}

/// Dry-run `config` through [`Logger::load_configuration`].
///
/// Sensors are built and jobs scheduled exactly as a real run would, but
/// ports named in `config.ports` open onto nothing and rows go to memory.
/// Returns the jobs that would run.
pub async fn check_configuration(config: &AppConfig) -> Result<Vec<JobInfo>, LoggerError> {
    let driver = MemoryDriver::detached(config.ports.keys().cloned());
    let mut logger = Logger::new(Box::new(MemoryWriter::new()))
        .with_driver(Arc::new(driver))
        .with_window_lookback(config.window_lookback);
    let loaded = logger.load_configuration(config).await;
    let jobs = logger.jobs();
    logger.shutdown().await;
    loaded.map(|()| jobs)
}
