//! Core types: the task abstraction and the crate error taxonomy

pub mod error;
pub mod task;

pub use error::{PoolError, Result};
pub use task::{BoxedTask, ClosureTask, Task};
