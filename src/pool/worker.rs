//! Worker thread implementation

use crate::core::{BoxedTask, PoolError, Result};
use crate::queue::{BoundedQueue, QueueError};
use log::{debug, error, warn};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Hook invoked after every task dispatch with the task's outcome.
///
/// Runs for successful, failed, and panicked tasks alike, inside its own
/// fault boundary so a panicking hook cannot take down the worker.
pub type AfterTaskHook = Arc<dyn Fn(&Result<()>) + Send + Sync>;

/// Renders a panic payload as a message string.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Statistics for a worker thread
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Total number of tasks completed successfully
    pub tasks_processed: AtomicU64,
    /// Total number of tasks that returned an error
    pub tasks_failed: AtomicU64,
    /// Total number of tasks that panicked
    pub tasks_panicked: AtomicU64,
    /// Total time spent executing tasks (microseconds)
    pub total_processing_time_us: AtomicU64,
}

impl WorkerStats {
    /// Create new worker statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment tasks processed counter
    pub fn increment_processed(&self) {
        self.tasks_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment tasks failed counter
    pub fn increment_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment tasks panicked counter
    pub fn increment_panicked(&self) {
        self.tasks_panicked.fetch_add(1, Ordering::Relaxed);
    }

    /// Add processing time
    pub fn add_processing_time(&self, microseconds: u64) {
        self.total_processing_time_us
            .fetch_add(microseconds, Ordering::Relaxed);
    }

    /// Get total tasks processed
    pub fn get_tasks_processed(&self) -> u64 {
        self.tasks_processed.load(Ordering::Relaxed)
    }

    /// Get total tasks failed
    pub fn get_tasks_failed(&self) -> u64 {
        self.tasks_failed.load(Ordering::Relaxed)
    }

    /// Get total tasks panicked
    pub fn get_tasks_panicked(&self) -> u64 {
        self.tasks_panicked.load(Ordering::Relaxed)
    }
}

/// A worker thread that pulls tasks from the shared queue until the queue is
/// closed and drained.
#[derive(Debug)]
pub struct Worker {
    id: usize,
    thread: Option<thread::JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Create and start a new worker.
    ///
    /// # Shutdown Behavior
    ///
    /// Workers exit when the queue is closed and empty. A task a worker has
    /// already pulled always runs to completion; cancellation is cooperative
    /// and checked only between tasks.
    pub fn new(
        id: usize,
        name: String,
        queue: Arc<BoundedQueue>,
        poll_interval: Duration,
        after_task: Option<AfterTaskHook>,
    ) -> Result<Self> {
        let stats = Arc::new(WorkerStats::new());
        let stats_clone = Arc::clone(&stats);

        let thread = thread::Builder::new()
            .name(name)
            .spawn(move || {
                Self::run(id, queue, stats_clone, poll_interval, after_task);
            })
            .map_err(|e| PoolError::spawn_with_source(id, "cannot spawn worker thread", e))?;

        Ok(Self {
            id,
            thread: Some(thread),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Join the worker thread
    pub fn join(mut self) -> Result<()> {
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| PoolError::join(self.id, "worker panicked"))?;
        }
        Ok(())
    }

    /// Main worker loop
    fn run(
        id: usize,
        queue: Arc<BoundedQueue>,
        stats: Arc<WorkerStats>,
        poll_interval: Duration,
        after_task: Option<AfterTaskHook>,
    ) {
        debug!("worker {} started", id);
        loop {
            match queue.recv_timeout(poll_interval) {
                Ok(mut task) => {
                    Self::execute_task(id, &mut task, &stats, after_task.as_ref());
                }
                Err(QueueError::Empty) => {
                    // No task available within timeout, continue polling
                    continue;
                }
                Err(_) => {
                    // Queue closed and drained, shutdown
                    debug!(
                        "worker {} shutting down (processed={}, failed={}, panicked={})",
                        id,
                        stats.get_tasks_processed(),
                        stats.get_tasks_failed(),
                        stats.get_tasks_panicked()
                    );
                    break;
                }
            }
        }
    }

    /// Execute a single task with panic protection.
    ///
    /// An abnormal termination inside the task body is caught here and
    /// reported as an execution error; it never reaches the worker loop.
    /// The after-task hook runs for every outcome, under its own boundary.
    fn execute_task(
        id: usize,
        task: &mut BoxedTask,
        stats: &WorkerStats,
        after_task: Option<&AfterTaskHook>,
    ) {
        let start = std::time::Instant::now();

        let panic_result = catch_unwind(AssertUnwindSafe(|| task.execute()));

        let elapsed_us = start.elapsed().as_micros() as u64;

        let outcome: Result<()> = match panic_result {
            Ok(Ok(())) => {
                stats.increment_processed();
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("worker {}: task execution failed: {}", id, e);
                stats.increment_failed();
                Err(e)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("worker {}: task panicked: {}", id, message);
                stats.increment_panicked();
                Err(PoolError::task_panic(message))
            }
        };

        stats.add_processing_time(elapsed_us);

        if let Some(hook) = after_task {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| hook(&outcome))) {
                error!(
                    "worker {}: after-task hook panicked: {}",
                    id,
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            // Bound the wait so Drop cannot hang indefinitely
            const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

            let start = std::time::Instant::now();
            loop {
                if thread.is_finished() {
                    if let Err(payload) = thread.join() {
                        error!(
                            "worker {} panicked during shutdown: {}",
                            self.id,
                            panic_message(payload.as_ref())
                        );
                    }
                    break;
                }

                if start.elapsed() >= JOIN_TIMEOUT {
                    warn!(
                        "worker {} did not finish within {}s during drop; thread may be leaked",
                        self.id,
                        JOIN_TIMEOUT.as_secs()
                    );
                    break;
                }

                thread::sleep(Duration::from_millis(10));
            }
        }
    }
}
