//! # taskpool
//!
//! A bounded worker pool with explicit backpressure, panic isolation, and two
//! shutdown disciplines, plus a retry scheduler with exponential backoff and
//! jitter built on top of it.
//!
//! ## Features
//!
//! - **Bounded Task Queue**: fixed-capacity FIFO; submission never blocks and
//!   rejects with a queue-full error when at capacity
//! - **Worker Pool**: a fixed set of worker threads pulling tasks in
//!   submission order
//! - **Fault Isolation**: a panicking task is contained at the task boundary
//!   and can never take down a worker or the pool
//! - **Synchronous Submission**: `submit_wait` blocks the caller until the
//!   task completes and propagates its outcome
//! - **Dual Shutdown**: `stop()` finishes in-flight work and discards the
//!   queue; `stop_wait()` drains every accepted task first
//! - **Retry Scheduling**: failed tasks are re-submitted after an
//!   exponential-backoff-with-jitter delay until their retry budget runs out
//!
//! ## Quick Start
//!
//! ```rust
//! use taskpool::prelude::*;
//!
//! # fn main() -> Result<()> {
//! // Create a pool with 4 workers and room for 64 queued tasks
//! let pool = WorkerPool::with_workers(4, 64)?;
//!
//! // Fire-and-forget submission
//! for i in 0..10 {
//!     pool.execute(move || {
//!         println!("task {} executing", i);
//!         Ok(())
//!     })?;
//! }
//!
//! // Block until a task completes, propagating its outcome
//! pool.execute_wait(|| Ok(()))?;
//!
//! // Drain everything, then shut down
//! pool.stop_wait()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Tasks
//!
//! ```rust
//! use taskpool::prelude::*;
//!
//! struct MyTask {
//!     data: String,
//! }
//!
//! impl Task for MyTask {
//!     fn execute(&mut self) -> Result<()> {
//!         println!("processing: {}", self.data);
//!         Ok(())
//!     }
//!
//!     fn task_type(&self) -> &str {
//!         "MyTask"
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! # let pool = WorkerPool::with_workers(2, 16)?;
//! pool.submit(MyTask {
//!     data: "test".to_string(),
//! })?;
//! # pool.stop_wait()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Retrying Failed Tasks
//!
//! ```rust,no_run
//! use taskpool::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<()> {
//! let pool = WorkerPool::with_workers(4, 64)?;
//! let scheduler = RetryScheduler::new(pool, Arc::new(|_record: &TaskRecord| {
//!     // do the actual work for the record here
//!     Ok(())
//! }))?;
//!
//! scheduler.enqueue(TaskRecord {
//!     id: "task-1".to_string(),
//!     payload: "hello".to_string(),
//!     max_retries: 3,
//! }).ok();
//!
//! scheduler.shutdown();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod pool;
pub mod prelude;
pub mod queue;
pub mod retry;

pub use crate::core::{BoxedTask, ClosureTask, PoolError, Result, Task};
pub use pool::{AfterTaskHook, PoolConfig, WorkerPool, WorkerStats};
pub use retry::{RetryScheduler, SchedulerError, TaskRecord, TaskState};
