//! Error types for the worker pool

/// Result type for worker pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors that can occur in the worker pool
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PoolError {
    /// Pool has begun shutting down and no longer accepts tasks
    #[error("Worker pool '{pool_name}' is stopped and not accepting tasks")]
    PoolStopped {
        /// Name of the worker pool
        pool_name: String,
    },

    /// Queue is at capacity, submission rejected
    #[error("Task queue is full: {current}/{capacity} tasks queued")]
    QueueFull {
        /// Queue length observed at the time of the call
        current: usize,
        /// Maximum queue capacity
        capacity: usize,
    },

    /// Task carries no work (its closure was already consumed)
    #[error("Task has no work to execute")]
    EmptyTask,

    /// Task terminated abnormally; the panic was contained at the task boundary
    #[error("Task panicked: {message}")]
    TaskPanic {
        /// Panic payload rendered as a message
        message: String,
    },

    /// Task execution returned a failure
    #[error("Task execution failed: {message}")]
    Execution {
        /// Error message
        message: String,
    },

    /// Failed to spawn a worker thread
    #[error("Failed to spawn worker thread #{worker_id}: {message}")]
    Spawn {
        /// ID of the worker that failed to spawn
        worker_id: usize,
        /// Error message
        message: String,
        /// Source IO error
        #[source]
        source: Option<std::io::Error>,
    },

    /// Failed to join a worker thread
    #[error("Failed to join worker thread #{worker_id}: {message}")]
    Join {
        /// ID of the worker that failed to join
        worker_id: usize,
        /// Error message
        message: String,
    },
}

impl PoolError {
    /// Create a pool stopped error
    pub fn pool_stopped(pool_name: impl Into<String>) -> Self {
        PoolError::PoolStopped {
            pool_name: pool_name.into(),
        }
    }

    /// Create a queue full error
    pub fn queue_full(current: usize, capacity: usize) -> Self {
        PoolError::QueueFull { current, capacity }
    }

    /// Create a task panic error
    pub fn task_panic(message: impl Into<String>) -> Self {
        PoolError::TaskPanic {
            message: message.into(),
        }
    }

    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        PoolError::Execution {
            message: message.into(),
        }
    }

    /// Create a spawn error
    pub fn spawn(worker_id: usize, message: impl Into<String>) -> Self {
        PoolError::Spawn {
            worker_id,
            message: message.into(),
            source: None,
        }
    }

    /// Create a spawn error with source
    pub fn spawn_with_source(
        worker_id: usize,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        PoolError::Spawn {
            worker_id,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a join error
    pub fn join(worker_id: usize, message: impl Into<String>) -> Self {
        PoolError::Join {
            worker_id,
            message: message.into(),
        }
    }

    /// True for the synchronous rejection errors a caller can recover from
    /// by retrying later or shedding the task.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            PoolError::PoolStopped { .. } | PoolError::QueueFull { .. } | PoolError::EmptyTask
        )
    }
}
