//! Convenience re-exports for common usage
//!
//! ```rust
//! use taskpool::prelude::*;
//! ```

pub use crate::core::{BoxedTask, ClosureTask, PoolError, Result, Task};
pub use crate::pool::{AfterTaskHook, PoolConfig, WorkerPool, WorkerStats};
pub use crate::queue::{BoundedQueue, QueueError};
pub use crate::retry::{
    backoff_delay, DelayTimer, RetryScheduler, SchedulerError, TaskRecord, TaskState, WorkFn,
};
