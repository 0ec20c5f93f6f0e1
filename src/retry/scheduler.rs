//! Retry scheduler built on top of the worker pool
//!
//! Externally submitted tasks enter a bounded ingestion buffer, are forwarded
//! into the pool, and on failure are re-submitted after an exponential
//! backoff delay until their retry budget runs out.

use crate::core::{ClosureTask, PoolError, Result};
use crate::pool::WorkerPool;
use crate::retry::backoff::backoff_delay;
use crate::retry::state::{StateStore, TaskRecord, TaskState};
use crate::retry::timer::DelayTimer;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How long forwarders wait on the ingestion buffer before re-checking the
/// shutdown flag.
const INGEST_POLL: Duration = Duration::from_millis(50);
/// Pause between forwarding attempts while the pool queue is full.
const FORWARD_RETRY_PAUSE: Duration = Duration::from_millis(20);

/// The work a scheduler performs for each task record.
pub type WorkFn = Arc<dyn Fn(&TaskRecord) -> Result<()> + Send + Sync>;

/// Errors returned to submitters at the ingestion boundary.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// The ingestion buffer is at capacity
    #[error("ingestion buffer is full")]
    Overloaded,
    /// Shutdown has begun; no further submissions are accepted
    #[error("scheduler is shutting down")]
    ShuttingDown,
}

struct SchedulerInner {
    pool: WorkerPool,
    ingest_tx: Sender<TaskRecord>,
    ingest_rx: Receiver<TaskRecord>,
    states: StateStore,
    timer: DelayTimer,
    work: WorkFn,
    shutting_down: AtomicBool,
}

impl SchedulerInner {
    /// Forwarder loop: moves records from the ingestion buffer into the pool.
    fn forward(inner: Arc<SchedulerInner>) {
        loop {
            if inner.shutting_down.load(Ordering::Acquire) {
                return;
            }
            match inner.ingest_rx.recv_timeout(INGEST_POLL) {
                Ok(record) => Self::dispatch(&inner, record),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    /// Submit one record to the pool, waiting out transient queue-full
    /// rejections. A record that cannot be placed because shutdown has begun
    /// is marked failed rather than silently lost.
    fn dispatch(inner: &Arc<SchedulerInner>, record: TaskRecord) {
        loop {
            let task_inner = Arc::clone(inner);
            let task_record = record.clone();
            let submitted = inner.pool.submit(ClosureTask::with_name(
                move || Self::process(&task_inner, task_record),
                "retryable-task",
            ));
            match submitted {
                Ok(()) => return,
                Err(PoolError::QueueFull { .. }) => {
                    if inner.shutting_down.load(Ordering::Acquire) {
                        inner.states.set_state(&record.id, TaskState::Failed);
                        warn!("task dropped due to shutdown id={}", record.id);
                        return;
                    }
                    thread::sleep(FORWARD_RETRY_PAUSE);
                }
                Err(e) => {
                    inner.states.set_state(&record.id, TaskState::Failed);
                    warn!("task dropped id={} reason={}", record.id, e);
                    return;
                }
            }
        }
    }

    /// Runs on a pool worker: execute the work function and walk the task
    /// through its state machine.
    fn process(inner: &Arc<SchedulerInner>, record: TaskRecord) -> Result<()> {
        inner.states.set_state(&record.id, TaskState::Running);
        debug!("task start id={}", record.id);

        match (inner.work)(&record) {
            Ok(()) => {
                inner.states.set_state(&record.id, TaskState::Done);
                info!("task done id={}", record.id);
            }
            Err(err) => {
                let attempts = inner.states.attempts(&record.id);
                if attempts < record.max_retries {
                    let attempt = inner.states.increment_attempts(&record.id);
                    let delay = backoff_delay(attempt);
                    warn!(
                        "task fail id={} attempt={} delay={:?} error={}",
                        record.id, attempt, delay, err
                    );
                    let id = record.id.clone();
                    let retry_inner = Arc::clone(inner);
                    let scheduled = inner.timer.schedule(delay, move || {
                        Self::requeue(&retry_inner, record, attempt);
                    });
                    if !scheduled {
                        // Timer is gone, shutdown has begun
                        inner.states.set_state(&id, TaskState::Failed);
                        warn!("task dropped due to shutdown id={}", id);
                    }
                } else {
                    inner.states.set_state(&record.id, TaskState::Failed);
                    error!(
                        "task failed permanently id={} attempts={}",
                        record.id, attempts
                    );
                }
            }
        }
        Ok(())
    }

    /// Timer callback: put a failed task back into the ingestion buffer, or
    /// mark it failed if the buffer has no room or shutdown has begun.
    fn requeue(inner: &Arc<SchedulerInner>, record: TaskRecord, attempt: u32) {
        if inner.shutting_down.load(Ordering::Acquire) {
            inner.states.set_state(&record.id, TaskState::Failed);
            warn!("task dropped due to shutdown id={}", record.id);
            return;
        }

        let id = record.id.clone();
        inner.states.set_state(&id, TaskState::Queued);
        match inner.ingest_tx.try_send(record) {
            Ok(()) => {
                info!("task requeued id={} attempt={}", id, attempt);
            }
            Err(TrySendError::Full(_)) => {
                inner.states.set_state(&id, TaskState::Failed);
                warn!("task retry dropped (queue full) id={} attempt={}", id, attempt);
            }
            Err(TrySendError::Disconnected(_)) => {
                inner.states.set_state(&id, TaskState::Failed);
                warn!("task retry dropped (buffer closed) id={}", id);
            }
        }
    }
}

/// Accepts task records, executes them on a [`WorkerPool`], and retries
/// failures with exponential backoff and jitter up to each record's retry
/// budget.
///
/// Shutdown is graceful and idempotent: intake stops, pending retries are
/// cancelled, the pool finishes in-flight work and abandons its queue, and
/// everything still sitting in the ingestion buffer is marked failed.
pub struct RetryScheduler {
    inner: Arc<SchedulerInner>,
    forwarders: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl RetryScheduler {
    /// Create a scheduler on top of `pool`.
    ///
    /// The ingestion buffer capacity matches the pool's queue capacity, and
    /// one forwarder thread is started per pool worker.
    pub fn new(pool: WorkerPool, work: WorkFn) -> Result<Self> {
        let (ingest_tx, ingest_rx) = bounded(pool.queue_capacity());
        let forwarder_count = pool.workers();
        let timer = DelayTimer::new()?;

        let inner = Arc::new(SchedulerInner {
            pool,
            ingest_tx,
            ingest_rx,
            states: StateStore::new(),
            timer,
            work,
            shutting_down: AtomicBool::new(false),
        });

        let mut forwarders = Vec::with_capacity(forwarder_count);
        for id in 0..forwarder_count {
            let inner_clone = Arc::clone(&inner);
            match thread::Builder::new()
                .name(format!("taskpool-ingest-{}", id))
                .spawn(move || SchedulerInner::forward(inner_clone))
            {
                Ok(handle) => forwarders.push(handle),
                Err(e) => {
                    // Let the forwarders spawned so far exit before bailing out
                    inner.shutting_down.store(true, Ordering::SeqCst);
                    inner.timer.shutdown();
                    return Err(PoolError::spawn_with_source(
                        id,
                        "cannot spawn forwarder thread",
                        e,
                    ));
                }
            }
        }

        Ok(Self {
            inner,
            forwarders: Mutex::new(forwarders),
        })
    }

    /// Accept a task record for execution.
    ///
    /// The record is tracked in the `Queued` state and placed in the
    /// ingestion buffer. Duplicate ids keep their existing tracking entry
    /// (first write wins).
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::Overloaded`] if the buffer is at capacity
    /// - [`SchedulerError::ShuttingDown`] once shutdown has begun
    pub fn enqueue(&self, record: TaskRecord) -> std::result::Result<(), SchedulerError> {
        if self.inner.shutting_down.load(Ordering::Acquire) {
            return Err(SchedulerError::ShuttingDown);
        }

        let inserted = self.inner.states.insert_new(&record.id);
        let id = record.id.clone();
        match self.inner.ingest_tx.try_send(record) {
            Ok(()) => {
                info!("enqueue accepted id={}", id);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                if inserted {
                    self.inner.states.remove(&id);
                }
                warn!("enqueue rejected (queue full) id={}", id);
                Err(SchedulerError::Overloaded)
            }
            Err(TrySendError::Disconnected(_)) => {
                if inserted {
                    self.inner.states.remove(&id);
                }
                Err(SchedulerError::ShuttingDown)
            }
        }
    }

    /// Current state of a tracked task.
    pub fn state_of(&self, id: &str) -> Option<TaskState> {
        self.inner.states.state_of(id)
    }

    /// Snapshot of every tracked task and its state.
    pub fn snapshot(&self) -> std::collections::HashMap<String, TaskState> {
        self.inner.states.snapshot()
    }

    /// Whether the scheduler still accepts submissions.
    pub fn is_accepting(&self) -> bool {
        !self.inner.shutting_down.load(Ordering::Acquire)
    }

    /// The underlying worker pool.
    pub fn pool(&self) -> &WorkerPool {
        &self.inner.pool
    }

    /// Gracefully shut the scheduler down.
    ///
    /// Stops intake, cancels pending retries, stops the pool with
    /// abandon-queued semantics (in-flight tasks finish, queued tasks are
    /// discarded), then marks every record still in the ingestion buffer as
    /// failed. Safe to call more than once; only the first call has effect.
    pub fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            debug!("shutdown already in progress");
            return;
        }

        info!("shutdown: stopping retry timer");
        self.inner.timer.shutdown();

        info!("shutdown: stopping worker pool");
        if let Err(e) = self.inner.pool.stop() {
            error!("shutdown: failed to stop pool: {}", e);
        }

        // Forwarders exit on the flag; collect them before draining so none
        // is still pulling from the buffer.
        for handle in self.forwarders.lock().drain(..) {
            if handle.join().is_err() {
                error!("shutdown: forwarder thread panicked");
            }
        }

        let mut failed = 0usize;
        while let Ok(record) = self.inner.ingest_rx.try_recv() {
            self.inner.states.set_state(&record.id, TaskState::Failed);
            warn!("shutdown: failed queued id={}", record.id);
            failed += 1;
        }
        info!("shutdown: complete ({} buffered tasks failed)", failed);
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use std::collections::HashMap;

    fn wait_for_state(
        scheduler: &RetryScheduler,
        id: &str,
        expected: TaskState,
        timeout: Duration,
    ) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if scheduler.state_of(id) == Some(expected) {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    fn record(id: &str, max_retries: u32) -> TaskRecord {
        TaskRecord {
            id: id.to_string(),
            payload: String::new(),
            max_retries,
        }
    }

    #[test]
    fn test_successful_task_reaches_done() {
        let pool = WorkerPool::with_workers(2, 8).unwrap();
        let scheduler = RetryScheduler::new(pool, Arc::new(|_| Ok(()))).unwrap();

        scheduler.enqueue(record("t1", 0)).unwrap();
        assert!(wait_for_state(
            &scheduler,
            "t1",
            TaskState::Done,
            Duration::from_secs(2)
        ));

        scheduler.shutdown();
    }

    #[test]
    fn test_failing_task_retries_until_success() {
        // Fails twice per id, then succeeds
        let failures: Arc<PlMutex<HashMap<String, u32>>> = Arc::new(PlMutex::new(HashMap::new()));
        let failures_clone = Arc::clone(&failures);
        let work: WorkFn = Arc::new(move |rec| {
            let mut map = failures_clone.lock();
            let seen = map.entry(rec.id.clone()).or_insert(0);
            *seen += 1;
            if *seen <= 2 {
                Err(PoolError::execution("transient failure"))
            } else {
                Ok(())
            }
        });

        let pool = WorkerPool::with_workers(2, 8).unwrap();
        let scheduler = RetryScheduler::new(pool, work).unwrap();

        scheduler.enqueue(record("flaky", 5)).unwrap();
        assert!(wait_for_state(
            &scheduler,
            "flaky",
            TaskState::Done,
            Duration::from_secs(5)
        ));
        assert_eq!(failures.lock()["flaky"], 3);

        scheduler.shutdown();
    }

    #[test]
    fn test_retry_budget_exhaustion_fails_task() {
        let pool = WorkerPool::with_workers(1, 8).unwrap();
        let scheduler =
            RetryScheduler::new(pool, Arc::new(|_| Err(PoolError::execution("always fails"))))
                .unwrap();

        scheduler.enqueue(record("doomed", 2)).unwrap();
        assert!(wait_for_state(
            &scheduler,
            "doomed",
            TaskState::Failed,
            Duration::from_secs(5)
        ));

        scheduler.shutdown();
    }

    #[test]
    fn test_zero_retry_budget_fails_on_first_error() {
        let pool = WorkerPool::with_workers(1, 8).unwrap();
        let scheduler =
            RetryScheduler::new(pool, Arc::new(|_| Err(PoolError::execution("nope")))).unwrap();

        scheduler.enqueue(record("once", 0)).unwrap();
        assert!(wait_for_state(
            &scheduler,
            "once",
            TaskState::Failed,
            Duration::from_secs(2)
        ));

        scheduler.shutdown();
    }

    #[test]
    fn test_enqueue_after_shutdown_is_rejected() {
        let pool = WorkerPool::with_workers(1, 4).unwrap();
        let scheduler = RetryScheduler::new(pool, Arc::new(|_| Ok(()))).unwrap();

        scheduler.shutdown();
        assert!(!scheduler.is_accepting());
        assert_eq!(
            scheduler.enqueue(record("late", 0)),
            Err(SchedulerError::ShuttingDown)
        );
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let pool = WorkerPool::with_workers(1, 4).unwrap();
        let scheduler = RetryScheduler::new(pool, Arc::new(|_| Ok(()))).unwrap();

        scheduler.shutdown();
        scheduler.shutdown();
    }

    #[test]
    fn test_requeue_paths() {
        let pool = WorkerPool::with_workers(1, 1).unwrap();
        let (ingest_tx, ingest_rx) = bounded(1);
        let inner = Arc::new(SchedulerInner {
            pool,
            ingest_tx,
            ingest_rx,
            states: StateStore::new(),
            timer: DelayTimer::new().unwrap(),
            work: Arc::new(|_| Ok(())),
            shutting_down: AtomicBool::new(false),
        });

        // Room in the buffer: the task goes back to queued
        inner.states.insert_new("r1");
        SchedulerInner::requeue(&inner, record("r1", 3), 1);
        assert_eq!(inner.states.state_of("r1"), Some(TaskState::Queued));
        assert_eq!(inner.ingest_rx.len(), 1);

        // Buffer full: the retry is dropped and the task fails
        inner.states.insert_new("r2");
        SchedulerInner::requeue(&inner, record("r2", 3), 1);
        assert_eq!(inner.states.state_of("r2"), Some(TaskState::Failed));

        // Shutdown begun: the retry is dropped without touching the buffer
        inner.shutting_down.store(true, Ordering::SeqCst);
        inner.states.insert_new("r3");
        SchedulerInner::requeue(&inner, record("r3", 3), 1);
        assert_eq!(inner.states.state_of("r3"), Some(TaskState::Failed));
        assert_eq!(inner.ingest_rx.len(), 1);

        inner.pool.stop().unwrap();
        inner.timer.shutdown();
    }

    #[test]
    fn test_duplicate_id_keeps_first_entry() {
        let pool = WorkerPool::with_workers(1, 8).unwrap();
        let scheduler = RetryScheduler::new(pool, Arc::new(|_| Ok(()))).unwrap();

        scheduler.enqueue(record("dup", 0)).unwrap();
        assert!(wait_for_state(
            &scheduler,
            "dup",
            TaskState::Done,
            Duration::from_secs(2)
        ));

        // Terminal state survives a duplicate submission
        scheduler.enqueue(record("dup", 0)).unwrap();
        thread::sleep(Duration::from_millis(200));
        assert_eq!(scheduler.state_of("dup"), Some(TaskState::Done));

        scheduler.shutdown();
    }
}
