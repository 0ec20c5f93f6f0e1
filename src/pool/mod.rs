//! Worker pool and worker implementations

pub mod worker;
pub mod worker_pool;

pub use worker::{AfterTaskHook, Worker, WorkerStats};
pub use worker_pool::{PoolConfig, WorkerPool};
