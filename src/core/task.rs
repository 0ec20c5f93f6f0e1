//! Task trait and related types

use crate::core::error::{PoolError, Result};
use std::fmt;

/// A trait representing a unit of work to be executed by the worker pool
pub trait Task: Send {
    /// Execute the task
    ///
    /// # Errors
    ///
    /// Returns an error if the task execution fails
    fn execute(&mut self) -> Result<()>;

    /// Get the task's type name for debugging and logging
    fn task_type(&self) -> &str {
        "Task"
    }
}

impl fmt::Debug for dyn Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task({})", self.task_type())
    }
}

/// A boxed task that can be sent across threads
pub type BoxedTask = Box<dyn Task>;

/// Helper to create a task from a closure
pub struct ClosureTask<F>
where
    F: FnOnce() -> Result<()> + Send,
{
    closure: Option<F>,
    name: String,
}

impl<F> ClosureTask<F>
where
    F: FnOnce() -> Result<()> + Send,
{
    /// Create a new closure task
    pub fn new(closure: F) -> Self {
        Self {
            closure: Some(closure),
            name: "ClosureTask".to_string(),
        }
    }

    /// Create a new closure task with a custom name
    pub fn with_name<S: Into<String>>(closure: F, name: S) -> Self {
        Self {
            closure: Some(closure),
            name: name.into(),
        }
    }
}

impl<F> Task for ClosureTask<F>
where
    F: FnOnce() -> Result<()> + Send,
{
    fn execute(&mut self) -> Result<()> {
        if let Some(closure) = self.closure.take() {
            closure()
        } else {
            // Closure already consumed, report it instead of silently succeeding
            Err(PoolError::EmptyTask)
        }
    }

    fn task_type(&self) -> &str {
        &self.name
    }
}
