//! The periodic job set.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::scheduler::clock::SharedClock;
use crate::scheduler::job::{
    DueJob, Job, JobId, JobInfo, SchedulerError, Tick, checked_add_interval,
};

/// Periodic scheduler over jobs carrying a bound task of type `T`.
///
/// The task value identifies the job for lookups such as
/// [`cancel_where`](Self::cancel_where). Jobs are kept in registration order,
/// which is also their execution order when several are due at once.
pub struct Scheduler<T> {
    clock: SharedClock,
    jobs: Vec<Job<T>>,
}

impl<T> fmt::Debug for Scheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("job_count", &self.jobs.len())
            .finish_non_exhaustive()
    }
}

/// Builder returned by [`Scheduler::every`].
#[must_use = "a job is only registered once `run` is called"]
pub struct JobBuilder<'a, T> {
    scheduler: &'a mut Scheduler<T>,
    interval: Duration,
}

impl<T> JobBuilder<'_, T> {
    /// Bind `task` and register the job. First execution is one interval from now.
    pub fn run(self, task: T) -> JobId {
        let now = self.scheduler.clock.now();
        let job = Job::new(self.interval, task, now);
        let id = job.id;
        self.scheduler.jobs.push(job);
        tracing::debug!(job_id = %id, interval = ?self.interval, "Job registered");
        id
    }
}

impl<T> Scheduler<T> {
    /// Create an empty scheduler reading time from `clock`.
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            jobs: Vec::new(),
        }
    }

    /// Start registering a job repeating every `interval`.
    ///
    /// # Errors
    /// Returns `SchedulerError::InvalidInterval` for a zero interval, or one
    /// so large that the first run would fall outside the calendar range.
    pub fn every(&mut self, interval: Duration) -> Result<JobBuilder<'_, T>, SchedulerError> {
        if interval.is_zero() || checked_add_interval(self.clock.now(), interval).is_none() {
            return Err(SchedulerError::InvalidInterval(interval));
        }
        Ok(JobBuilder {
            scheduler: self,
            interval,
        })
    }

    /// Collect every job due now, advancing each one's timing.
    ///
    /// Nothing is advanced if any due job has fallen more than one interval
    /// behind; the caller is expected to [`reset`](Self::reset) and retry.
    ///
    /// # Errors
    /// Returns `SchedulerError::Overrun` naming the first overrun job.
    pub fn due_jobs(&mut self) -> Result<Vec<DueJob<T>>, SchedulerError>
    where
        T: Clone,
    {
        let now = self.clock.now();

        if let Some((job, behind)) = self
            .jobs
            .iter()
            .find_map(|j| j.overrun(now).map(|behind| (j, behind)))
        {
            return Err(SchedulerError::Overrun {
                job: job.id,
                scheduled: job.next_run,
                behind,
            });
        }

        Ok(self
            .jobs
            .iter_mut()
            .filter(|j| j.is_due(now))
            .map(|j| DueJob {
                id: j.id,
                tick: j.advance(),
                task: j.task.clone(),
            })
            .collect())
    }

    /// Execute every due job through `handler`, in registration order.
    ///
    /// The handler receives the job's bound task and its nominal [`Tick`].
    /// Returns the number of jobs executed.
    ///
    /// # Errors
    /// Returns `SchedulerError::Overrun` without executing anything.
    pub fn run_pending<F>(&mut self, mut handler: F) -> Result<usize, SchedulerError>
    where
        T: Clone,
        F: FnMut(&T, Tick),
    {
        let due = self.due_jobs()?;
        for job in &due {
            handler(&job.task, job.tick);
        }
        Ok(due.len())
    }

    /// Seconds until the soonest job is due; zero or negative if one is due now.
    ///
    /// `None` when no jobs are registered.
    pub fn idle_seconds(&self) -> Option<f64> {
        let next = self.next_run()?;
        let delta = next - self.clock.now();
        Some(delta.num_microseconds().map_or(delta.num_seconds() as f64, |us| us as f64 / 1e6))
    }

    /// Time the caller may sleep, clamped to zero.
    pub fn idle_duration(&self) -> Option<Duration> {
        let next = self.next_run()?;
        Some((next - self.clock.now()).to_std().unwrap_or(Duration::ZERO))
    }

    /// Soonest due time among all jobs.
    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        self.jobs.iter().map(|j| j.next_run).min()
    }

    /// Remove a job. Returns whether it existed.
    pub fn cancel_job(&mut self, id: JobId) -> bool {
        let before = self.jobs.len();
        self.jobs.retain(|j| j.id != id);
        let removed = self.jobs.len() != before;
        if removed {
            tracing::debug!(job_id = %id, "Job cancelled");
        }
        removed
    }

    /// Remove every job whose task matches `pred`. Returns the removed ids.
    pub fn cancel_where<P>(&mut self, mut pred: P) -> Vec<JobId>
    where
        P: FnMut(&T) -> bool,
    {
        let mut removed = Vec::new();
        self.jobs.retain(|j| {
            if pred(&j.task) {
                removed.push(j.id);
                false
            } else {
                true
            }
        });
        for id in &removed {
            tracing::debug!(job_id = %id, "Job cancelled");
        }
        removed
    }

    /// Forget every job's last run so all of them are due on the next pass.
    pub fn reset(&mut self) {
        let now = self.clock.now();
        for job in &mut self.jobs {
            job.reset(now);
        }
    }

    /// Number of registered jobs.
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Bound tasks in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = (JobId, &T)> {
        self.jobs.iter().map(|j| (j.id, &j.task))
    }

    /// Snapshot of all jobs.
    pub fn jobs(&self) -> Vec<JobInfo>
    where
        T: fmt::Display,
    {
        self.jobs
            .iter()
            .map(|j| JobInfo {
                id: j.id,
                interval: j.interval,
                last_run: j.last_run,
                next_run: j.next_run,
                task: j.task.to_string(),
            })
            .collect()
    }
}
