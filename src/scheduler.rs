//! Scheduler Layer
//!
//! Single-threaded periodic job scheduler driven by a cooperative run loop.
//!
//! # Architecture
//!
//! - [`Scheduler`]: ordered job set with `every(..).run(task)` registration,
//!   due-job evaluation, cancellation and reset
//! - [`Tick`]: nominal `(scheduled, previous)` times handed to each execution
//! - [`Clock`]: time source, either [`SystemClock`] or a simulated [`ManualClock`]
//!
//! # Example
//!
//! ```
//! use databear::scheduler::{Scheduler, SystemClock};
//! use std::time::Duration;
//!
//! let mut scheduler = Scheduler::new(SystemClock::shared());
//! let id = scheduler.every(Duration::from_secs(5)).unwrap().run("measure tph1");
//! assert_eq!(scheduler.job_count(), 1);
//! assert!(scheduler.cancel_job(id));
//! ```

mod clock;
mod job;
mod schedule;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use job::{DueJob, JobId, JobInfo, SchedulerError, Tick};
pub use schedule::{JobBuilder, Scheduler};
