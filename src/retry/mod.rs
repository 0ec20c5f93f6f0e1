//! Retry layer: state tracking, backoff, deferred re-submission
//!
//! Builds the demo queue service's core on top of
//! [`WorkerPool`](crate::pool::WorkerPool): accepted tasks run on the pool,
//! failures are retried after an exponentially growing, jittered delay, and
//! every task ends in a terminal `done` or `failed` state.

pub mod backoff;
pub mod scheduler;
pub mod state;
pub mod timer;

pub use backoff::backoff_delay;
pub use scheduler::{RetryScheduler, SchedulerError, WorkFn};
pub use state::{StateStore, TaskRecord, TaskState};
pub use timer::DelayTimer;
