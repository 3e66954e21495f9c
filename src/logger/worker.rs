//! Bounded worker pool for measurement acquisitions.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Default time `close` waits for in-flight work (30 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs submitted futures on tokio tasks, at most `size` at a time.
///
/// Submission never blocks: excess work waits for a permit inside its own
/// task. Panics inside submitted work are logged and contained.
#[derive(Debug)]
pub struct WorkerPool {
    size: usize,
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
    closed: bool,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    /// Create a pool with `size` workers (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            permits: Arc::new(Semaphore::new(size)),
            tasks: JoinSet::new(),
            closed: false,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set how long `close` waits before aborting remaining work.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Maximum concurrent work items.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Work items submitted and not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the pool has stopped accepting work.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Submit `work`. Returns `false` if the pool is closed.
    pub fn submit<F>(&mut self, work: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.closed {
            return false;
        }
        self.reap();

        let permits = Arc::clone(&self.permits);
        self.tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            work.await;
        });
        true
    }

    /// Wait for every submitted item to finish, keeping the pool open.
    pub async fn wait_idle(&mut self) {
        while let Some(result) = self.tasks.join_next().await {
            log_join(result);
        }
    }

    /// Stop accepting work and wait for in-flight items.
    ///
    /// Items still running after the shutdown timeout are aborted.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let pending = self.tasks.len();

        if tokio::time::timeout(self.shutdown_timeout, self.wait_idle())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = self.tasks.len(),
                timeout = ?self.shutdown_timeout,
                "Worker pool shutdown timed out, aborting remaining work"
            );
            self.tasks.shutdown().await;
        }
        self.permits.close();
        tracing::debug!(joined = pending, "Worker pool closed");
    }

    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            log_join(result);
        }
    }
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result
        && e.is_panic()
    {
        tracing::error!(error = %e, "Worker task panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_runs_submitted_work() {
        let mut pool = WorkerPool::new(2);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let done = Arc::clone(&done);
            assert!(pool.submit(async move {
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        pool.wait_idle().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let mut pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..6 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.submit(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }
        pool.wait_idle().await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_close_rejects_new_work() {
        let mut pool = WorkerPool::new(1);
        let done = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&done);
        pool.submit(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        });

        pool.close().await;
        // in-flight work completed before close returned
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert!(pool.is_closed());
        assert!(!pool.submit(async {}));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let mut pool = WorkerPool::new(1);
        pool.submit(async { panic!("sensor driver bug") });
        pool.wait_idle().await;
        assert!(pool.submit(async {}));
        pool.wait_idle().await;
    }

    #[tokio::test]
    async fn test_close_times_out_hung_work() {
        let mut pool = WorkerPool::new(1).with_shutdown_timeout(Duration::from_millis(20));
        pool.submit(std::future::pending());
        pool.close().await;
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn test_size_at_least_one() {
        assert_eq!(WorkerPool::new(0).size(), 1);
    }
}
