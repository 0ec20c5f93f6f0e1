//! Bounded FIFO task queue with reject-when-full semantics.

use crate::core::BoxedTask;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Errors that can occur during queue operations.
#[derive(Debug)]
pub enum QueueError {
    /// Queue is at capacity; the rejected task is handed back
    Full(TaskHolder),
    /// Queue is closed and not accepting new tasks
    Closed(TaskHolder),
    /// Queue is empty (for `try_recv`)
    Empty,
    /// Queue is closed and drained; consumers should exit
    Disconnected,
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::Full(_) => write!(f, "queue is full"),
            QueueError::Closed(_) => write!(f, "queue is closed"),
            QueueError::Empty => write!(f, "queue is empty"),
            QueueError::Disconnected => write!(f, "queue is disconnected"),
        }
    }
}

impl std::error::Error for QueueError {}

/// A holder for boxed tasks in error cases to allow recovery.
///
/// A rejected submission hands the task back through the holder so the caller
/// owns the retry decision and nothing is silently dropped.
#[derive(Debug)]
pub struct TaskHolder {
    task: Option<BoxedTask>,
}

impl TaskHolder {
    /// Creates a new holder with the given task.
    pub fn new(task: BoxedTask) -> Self {
        Self { task: Some(task) }
    }

    /// Takes the task out of the holder.
    pub fn take(mut self) -> Option<BoxedTask> {
        self.task.take()
    }

    /// Returns a reference to the task if present.
    pub fn as_ref(&self) -> Option<&BoxedTask> {
        self.task.as_ref()
    }
}

/// Result type for queue operations.
pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// A bounded FIFO queue with a fixed maximum capacity.
///
/// Submission is non-blocking: a full queue rejects the task with
/// [`QueueError::Full`], giving producers an explicit backpressure signal.
/// Consumers poll with [`recv_timeout`](Self::recv_timeout), which reports
/// [`QueueError::Disconnected`] once the queue has been closed and drained.
pub struct BoundedQueue {
    sender: Sender<BoxedTask>,
    receiver: Receiver<BoxedTask>,
    capacity: usize,
    closed: AtomicBool,
}

impl BoundedQueue {
    /// Creates a new bounded queue with the specified capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the maximum capacity of this queue.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Attempts to enqueue a task without blocking.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Full`] if the queue is at capacity
    /// - [`QueueError::Closed`] if the queue has been closed
    pub fn try_send(&self, task: BoxedTask) -> QueueResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed(TaskHolder::new(task)));
        }
        self.sender.try_send(task).map_err(|e| match e {
            TrySendError::Full(task) => QueueError::Full(TaskHolder::new(task)),
            TrySendError::Disconnected(task) => QueueError::Closed(TaskHolder::new(task)),
        })
    }

    /// Attempts to dequeue a task without blocking.
    ///
    /// # Returns
    ///
    /// - `Ok(task)` if a task was available
    /// - `Err(QueueError::Empty)` if no task was available
    /// - `Err(QueueError::Disconnected)` if the queue is closed and empty
    pub fn try_recv(&self) -> QueueResult<BoxedTask> {
        self.receiver.try_recv().map_err(|e| match e {
            TryRecvError::Empty => {
                if self.closed.load(Ordering::SeqCst) {
                    QueueError::Disconnected
                } else {
                    QueueError::Empty
                }
            }
            TryRecvError::Disconnected => QueueError::Disconnected,
        })
    }

    /// Dequeues a task, waiting up to `timeout` for one to arrive.
    ///
    /// # Returns
    ///
    /// - `Ok(task)` if a task was received within the timeout
    /// - `Err(QueueError::Empty)` if no task arrived within the timeout
    /// - `Err(QueueError::Disconnected)` if the queue is closed and empty
    pub fn recv_timeout(&self, timeout: Duration) -> QueueResult<BoxedTask> {
        // Check if closed first
        if self.closed.load(Ordering::SeqCst) && self.receiver.is_empty() {
            return Err(QueueError::Disconnected);
        }

        match self.receiver.recv_timeout(timeout) {
            Ok(task) => Ok(task),
            Err(RecvTimeoutError::Timeout) => {
                // On timeout, check if closed
                if self.closed.load(Ordering::SeqCst) && self.receiver.is_empty() {
                    Err(QueueError::Disconnected)
                } else {
                    Err(QueueError::Empty)
                }
            }
            Err(RecvTimeoutError::Disconnected) => Err(QueueError::Disconnected),
        }
    }

    /// Closes the queue, preventing new tasks from being enqueued.
    ///
    /// Tasks already in the queue can still be received.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Returns `true` if the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns the current number of queued tasks.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Returns `true` if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
