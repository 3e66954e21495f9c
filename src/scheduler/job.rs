//! Job types shared by the scheduler and its callers.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Interval was zero or too large to schedule.
    #[error("invalid job interval {0:?}: interval must be positive and representable")]
    InvalidInterval(Duration),

    /// A due job fell more than one interval behind wall-clock.
    #[error("scheduling overrun: job {job} scheduled at {scheduled} is {behind:?} behind")]
    Overrun {
        /// Job that overran.
        job: JobId,
        /// Nominal time the job should have fired.
        scheduled: DateTime<Utc>,
        /// How far past the nominal time the scheduler is.
        behind: Duration,
    },
}

/// Opaque job handle returned on registration and used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(Uuid);

impl JobId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Nominal timing handed to a job when it fires.
///
/// Jobs derive their responsibility window from these values instead of
/// reading the clock again, so execution delay never shifts a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Time this execution was due.
    pub scheduled: DateTime<Utc>,
    /// Time the previous execution was due, `None` on the first run
    /// (or the first run after a reset).
    pub previous: Option<DateTime<Utc>>,
}

/// A due job handed out by [`Scheduler::due_jobs`](super::Scheduler::due_jobs).
#[derive(Debug, Clone)]
pub struct DueJob<T> {
    /// Job handle.
    pub id: JobId,
    /// Bound task.
    pub task: T,
    /// Nominal timing of this execution.
    pub tick: Tick,
}

/// Snapshot of a registered job.
#[derive(Debug, Clone)]
pub struct JobInfo {
    /// Job handle.
    pub id: JobId,
    /// Repeat interval.
    pub interval: Duration,
    /// Nominal time of the last execution.
    pub last_run: Option<DateTime<Utc>>,
    /// Next due time.
    pub next_run: DateTime<Utc>,
    /// Human readable task description.
    pub task: String,
}

/// A periodic job.
#[derive(Debug)]
pub(crate) struct Job<T> {
    pub(crate) id: JobId,
    pub(crate) interval: Duration,
    pub(crate) last_run: Option<DateTime<Utc>>,
    pub(crate) next_run: DateTime<Utc>,
    pub(crate) task: T,
}

impl<T> Job<T> {
    pub(crate) fn new(interval: Duration, task: T, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            interval,
            last_run: None,
            next_run: add_interval(now, interval),
            task,
        }
    }

    pub(crate) fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_run <= now
    }

    /// How far `now` is past this job's due time, if more than one interval.
    pub(crate) fn overrun(&self, now: DateTime<Utc>) -> Option<Duration> {
        let behind = (now - self.next_run).to_std().ok()?;
        (behind > self.interval).then_some(behind)
    }

    /// Record an execution at the current nominal time and return its tick.
    pub(crate) fn advance(&mut self) -> Tick {
        let tick = Tick {
            scheduled: self.next_run,
            previous: self.last_run,
        };
        self.last_run = Some(self.next_run);
        self.next_run = add_interval(self.next_run, self.interval);
        tick
    }

    pub(crate) fn reset(&mut self, now: DateTime<Utc>) {
        self.last_run = None;
        self.next_run = now;
    }
}

/// `at + interval`, or `None` if it falls outside the representable range.
pub(crate) fn checked_add_interval(at: DateTime<Utc>, interval: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(interval)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
}

fn add_interval(at: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    checked_add_interval(at, interval).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
