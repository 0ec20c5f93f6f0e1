//! Bounded worker pool implementation

use crate::core::{BoxedTask, ClosureTask, PoolError, Result, Task};
use crate::pool::worker::{panic_message, AfterTaskHook, Worker, WorkerStats};
use crate::queue::{BoundedQueue, QueueError};
use log::{debug, error};
use parking_lot::{Mutex, RwLock};
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the worker pool
#[derive(Clone)]
pub struct PoolConfig {
    /// Number of worker threads (0 is clamped to 1)
    pub workers: usize,
    /// Maximum number of queued tasks (0 is clamped to 1)
    pub queue_capacity: usize,
    /// Thread name prefix, also used as the pool name in errors
    pub thread_name_prefix: String,
    /// Worker poll interval for checking new tasks and shutdown state.
    /// Default: 100ms
    pub poll_interval: Duration,
    /// Hook run after every task dispatch with the task's outcome
    after_task: Option<AfterTaskHook>,
}

impl std::fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolConfig")
            .field("workers", &self.workers)
            .field("queue_capacity", &self.queue_capacity)
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("poll_interval", &self.poll_interval)
            .field("after_task", &self.after_task.as_ref().map(|_| "<hook>"))
            .finish()
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            queue_capacity: 64,
            thread_name_prefix: "taskpool-worker".to_string(),
            poll_interval: Duration::from_millis(100),
            after_task: None,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with the given worker count and queue
    /// capacity. Zero values are clamped to 1 rather than rejected.
    #[must_use]
    pub fn new(workers: usize, queue_capacity: usize) -> Self {
        Self {
            workers: workers.max(1),
            queue_capacity: queue_capacity.max(1),
            ..Default::default()
        }
    }

    /// Set thread name prefix
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker poll interval.
    ///
    /// Shorter intervals improve shutdown responsiveness at the cost of more
    /// wakeups on an idle pool.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "poll interval must be non-zero");
        self.poll_interval = interval;
        self
    }

    /// Set a hook that runs after every task dispatch, successful or not.
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_after_task_hook(mut self, hook: AfterTaskHook) -> Self {
        self.after_task = Some(hook);
        self
    }
}

/// Pool lifecycle. The transition is one-way: a stopped pool never accepts
/// tasks again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Running,
    Stopping,
    Stopped,
}

/// A task wrapper that signals its outcome back to a blocked submitter.
struct WaitTask {
    inner: BoxedTask,
    done: crossbeam_channel::Sender<Result<()>>,
}

impl Task for WaitTask {
    fn execute(&mut self) -> Result<()> {
        // The completion signal must fire no matter how the inner task
        // terminates, so the panic is caught here, reported through the
        // channel, and then re-raised for the worker's own accounting.
        let result = catch_unwind(AssertUnwindSafe(|| self.inner.execute()));
        match result {
            Ok(Ok(())) => {
                let _ = self.done.send(Ok(()));
                Ok(())
            }
            Ok(Err(e)) => {
                let message = e.to_string();
                let _ = self.done.send(Err(e));
                Err(PoolError::execution(message))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                let _ = self.done.send(Err(PoolError::task_panic(message)));
                resume_unwind(payload)
            }
        }
    }

    fn task_type(&self) -> &str {
        "WaitTask"
    }
}

/// A fixed-size pool of worker threads sharing one bounded FIFO queue.
///
/// Submission is non-blocking and rejects with [`PoolError::QueueFull`] when
/// the queue is at capacity, giving callers explicit backpressure. Two
/// shutdown disciplines are provided: [`stop()`](Self::stop) finishes only
/// in-flight tasks and discards everything still queued, while
/// [`stop_wait()`](Self::stop_wait) drains the whole queue first. A stopped
/// pool is not restartable.
pub struct WorkerPool {
    config: PoolConfig,
    queue: Arc<BoundedQueue>,
    workers: Mutex<Vec<Worker>>,
    worker_stats: Vec<Arc<WorkerStats>>,
    lifecycle: RwLock<Lifecycle>,
    total_tasks_submitted: AtomicU64,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("lifecycle", &*self.lifecycle.read())
            .field(
                "total_tasks_submitted",
                &self.total_tasks_submitted.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl WorkerPool {
    /// Create a pool with the given worker count and queue capacity.
    pub fn with_workers(workers: usize, queue_capacity: usize) -> Result<Self> {
        Self::new(PoolConfig::new(workers, queue_capacity))
    }

    /// Create a pool from a configuration.
    ///
    /// Spawns exactly `config.workers` worker threads before returning;
    /// the pool accepts submissions as soon as construction succeeds.
    pub fn new(config: PoolConfig) -> Result<Self> {
        let config = PoolConfig {
            workers: config.workers.max(1),
            queue_capacity: config.queue_capacity.max(1),
            ..config
        };

        let queue = Arc::new(BoundedQueue::new(config.queue_capacity));

        let mut workers = Vec::with_capacity(config.workers);
        for id in 0..config.workers {
            let name = format!("{}-{}", config.thread_name_prefix, id);
            match Worker::new(
                id,
                name,
                Arc::clone(&queue),
                config.poll_interval,
                config.after_task.clone(),
            ) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    // Release the workers spawned so far before bailing out
                    queue.close();
                    drop(workers);
                    return Err(e);
                }
            }
        }

        let worker_stats = workers.iter().map(|w| w.stats()).collect();

        Ok(Self {
            config,
            queue,
            workers: Mutex::new(workers),
            worker_stats,
            lifecycle: RwLock::new(Lifecycle::Running),
            total_tasks_submitted: AtomicU64::new(0),
        })
    }

    /// Submit a task without blocking.
    ///
    /// # Errors
    ///
    /// - [`PoolError::QueueFull`] if the queue is at capacity at the instant
    ///   of the call; the queue is left unchanged
    /// - [`PoolError::PoolStopped`] if either stop path has begun
    pub fn submit<T: Task + 'static>(&self, task: T) -> Result<()> {
        self.submit_boxed(Box::new(task))
    }

    /// Submit a closure as a task without blocking.
    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.submit(ClosureTask::new(f))
    }

    /// Submit a task and block until it has completed, propagating its
    /// outcome.
    ///
    /// Returns the task's own error if it completed normally with a failure,
    /// or [`PoolError::TaskPanic`] if it terminated abnormally. The enqueue
    /// step reuses the non-blocking [`submit`](Self::submit) path, so
    /// `QueueFull` and `PoolStopped` are returned immediately without
    /// blocking. If an abandon-queued stop discards the task before it runs,
    /// the caller unblocks with [`PoolError::PoolStopped`].
    pub fn submit_wait<T: Task + 'static>(&self, task: T) -> Result<()> {
        let (done_tx, done_rx) = crossbeam_channel::bounded::<Result<()>>(1);
        self.submit_boxed(Box::new(WaitTask {
            inner: Box::new(task),
            done: done_tx,
        }))?;

        match done_rx.recv() {
            Ok(outcome) => outcome,
            // Sender dropped without signaling: the task was discarded
            Err(_) => Err(PoolError::pool_stopped(&self.config.thread_name_prefix)),
        }
    }

    /// Submit a closure and block until it has completed.
    pub fn execute_wait<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.submit_wait(ClosureTask::new(f))
    }

    fn submit_boxed(&self, task: BoxedTask) -> Result<()> {
        // The accept decision and the enqueue happen under the same read
        // lock, so a concurrent stop cannot drain the queue between them.
        let lifecycle = self.lifecycle.read();
        if *lifecycle != Lifecycle::Running {
            return Err(PoolError::pool_stopped(&self.config.thread_name_prefix));
        }

        match self.queue.try_send(task) {
            Ok(()) => {
                self.total_tasks_submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(QueueError::Full(_)) => Err(PoolError::queue_full(
                self.queue.len(),
                self.config.queue_capacity,
            )),
            Err(_) => Err(PoolError::pool_stopped(&self.config.thread_name_prefix)),
        }
    }

    /// Stop the pool, abandoning queued tasks.
    ///
    /// Marks the pool non-accepting, discards every task still sitting in
    /// the queue without executing it, then blocks until each worker has
    /// finished the task it is currently executing and exited. Tasks already
    /// in flight always complete; discarded tasks never run.
    ///
    /// Calling this on a pool that has already begun stopping is a no-op.
    pub fn stop(&self) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.write();
            if *lifecycle != Lifecycle::Running {
                return Ok(());
            }
            *lifecycle = Lifecycle::Stopping;

            // Drain under the write lock: submit holds the read lock across
            // its accept check and enqueue, so nothing can slip in between
            // the drain and the close.
            let mut discarded = 0usize;
            while let Ok(task) = self.queue.try_recv() {
                drop(task);
                discarded += 1;
            }
            self.queue.close();
            if discarded > 0 {
                debug!("stop: discarded {} queued tasks", discarded);
            }
        }

        self.join_workers()?;
        *self.lifecycle.write() = Lifecycle::Stopped;
        Ok(())
    }

    /// Stop the pool after draining the queue.
    ///
    /// Marks the pool non-accepting of further submissions, then blocks
    /// until every queued and in-flight task has completed and all workers
    /// have exited. Every task accepted before this call gets at least one
    /// completion attempt.
    ///
    /// Calling this on a pool that has already begun stopping is a no-op.
    pub fn stop_wait(&self) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.write();
            if *lifecycle != Lifecycle::Running {
                return Ok(());
            }
            *lifecycle = Lifecycle::Stopping;
            // Workers keep pulling until the closed queue is empty
            self.queue.close();
        }

        self.join_workers()?;
        *self.lifecycle.write() = Lifecycle::Stopped;
        Ok(())
    }

    fn join_workers(&self) -> Result<()> {
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            worker.join()?;
        }
        Ok(())
    }

    /// Check whether the pool still accepts submissions.
    ///
    /// Becomes `false` the moment either stop path begins and stays `false`
    /// permanently.
    pub fn is_running(&self) -> bool {
        *self.lifecycle.read() == Lifecycle::Running
    }

    /// Get the number of worker threads
    pub fn workers(&self) -> usize {
        self.config.workers
    }

    /// Get the queue capacity
    pub fn queue_capacity(&self) -> usize {
        self.config.queue_capacity
    }

    /// Get the current queue length (approximate under concurrency)
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Get total number of tasks accepted by the pool
    pub fn total_tasks_submitted(&self) -> u64 {
        self.total_tasks_submitted.load(Ordering::Relaxed)
    }

    /// Get statistics for all workers
    pub fn get_stats(&self) -> Vec<Arc<WorkerStats>> {
        self.worker_stats.clone()
    }

    /// Get total tasks completed successfully across all workers
    pub fn total_tasks_processed(&self) -> u64 {
        self.worker_stats
            .iter()
            .map(|s| s.get_tasks_processed())
            .sum()
    }

    /// Get total tasks that returned an error across all workers
    pub fn total_tasks_failed(&self) -> u64 {
        self.worker_stats.iter().map(|s| s.get_tasks_failed()).sum()
    }

    /// Get total tasks that panicked across all workers
    pub fn total_tasks_panicked(&self) -> u64 {
        self.worker_stats
            .iter()
            .map(|s| s.get_tasks_panicked())
            .sum()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(e) = self.stop() {
                error!(
                    "failed to stop worker pool '{}' during drop: {}",
                    self.config.thread_name_prefix, e
                );
            }
        }
    }
}
