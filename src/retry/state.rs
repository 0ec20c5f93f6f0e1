//! Task lifecycle states and the shared state store

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Processing state of a tracked task.
///
/// `Done` and `Failed` are terminal: once reached, the state is never
/// overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Accepted and waiting to be executed
    Queued,
    /// Currently executing on a pool worker
    Running,
    /// Completed successfully
    Done,
    /// Failed permanently (retries exhausted, retry dropped, or shutdown)
    Failed,
}

impl TaskState {
    /// True for `Done` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Done => "done",
            TaskState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// An externally submitted unit of work.
///
/// The id is supplied by the submitter and assumed unique; the payload is
/// opaque to the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Externally supplied unique identifier
    pub id: String,
    /// Opaque payload, passed through to the work function
    #[serde(default)]
    pub payload: String,
    /// How many times a failed task may be re-submitted
    #[serde(default)]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Copy)]
struct TaskEntry {
    state: TaskState,
    attempts: u32,
}

/// Shared state and attempt tracking, keyed by task id.
///
/// Access is serialized through a single mutex; ids are assumed externally
/// unique, and the first write wins for a previously unseen id.
#[derive(Debug, Default)]
pub struct StateStore {
    entries: Mutex<HashMap<String, TaskEntry>>,
}

impl StateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new task in the `Queued` state with zero attempts.
    ///
    /// Returns `false` if the id was already tracked; the existing entry is
    /// left untouched.
    pub fn insert_new(&self, id: &str) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(id) {
            return false;
        }
        entries.insert(
            id.to_string(),
            TaskEntry {
                state: TaskState::Queued,
                attempts: 0,
            },
        );
        true
    }

    /// Transition a task to `state`.
    ///
    /// Terminal states stick: an entry already `Done` or `Failed` is never
    /// overwritten. Unknown ids are ignored.
    pub fn set_state(&self, id: &str, state: TaskState) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(id) {
            if !entry.state.is_terminal() {
                entry.state = state;
            }
        }
    }

    /// Current state of a task, if tracked.
    pub fn state_of(&self, id: &str) -> Option<TaskState> {
        self.entries.lock().get(id).map(|e| e.state)
    }

    /// Number of retry attempts recorded for a task.
    pub fn attempts(&self, id: &str) -> u32 {
        self.entries.lock().get(id).map(|e| e.attempts).unwrap_or(0)
    }

    /// Increment and return the attempt count for a task.
    pub fn increment_attempts(&self, id: &str) -> u32 {
        let mut entries = self.entries.lock();
        match entries.get_mut(id) {
            Some(entry) => {
                entry.attempts += 1;
                entry.attempts
            }
            None => 0,
        }
    }

    /// Stop tracking a task.
    ///
    /// Used to roll back tracking when a fresh submission is rejected at
    /// the ingestion boundary.
    pub fn remove(&self, id: &str) {
        self.entries.lock().remove(id);
    }

    /// Snapshot of all tracked tasks and their states.
    pub fn snapshot(&self) -> HashMap<String, TaskState> {
        self.entries
            .lock()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.state))
            .collect()
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_write_wins() {
        let store = StateStore::new();
        assert!(store.insert_new("t1"));
        store.set_state("t1", TaskState::Running);

        // A duplicate insert must not reset the entry
        assert!(!store.insert_new("t1"));
        assert_eq!(store.state_of("t1"), Some(TaskState::Running));
    }

    #[test]
    fn test_terminal_states_stick() {
        let store = StateStore::new();
        store.insert_new("t1");
        store.set_state("t1", TaskState::Done);
        store.set_state("t1", TaskState::Queued);
        assert_eq!(store.state_of("t1"), Some(TaskState::Done));

        store.insert_new("t2");
        store.set_state("t2", TaskState::Failed);
        store.set_state("t2", TaskState::Running);
        assert_eq!(store.state_of("t2"), Some(TaskState::Failed));
    }

    #[test]
    fn test_attempt_tracking() {
        let store = StateStore::new();
        store.insert_new("t1");
        assert_eq!(store.attempts("t1"), 0);
        assert_eq!(store.increment_attempts("t1"), 1);
        assert_eq!(store.increment_attempts("t1"), 2);
        assert_eq!(store.attempts("t1"), 2);

        // Unknown ids report zero
        assert_eq!(store.attempts("missing"), 0);
        assert_eq!(store.increment_attempts("missing"), 0);
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_string(&TaskState::Queued).unwrap(),
            "\"queued\""
        );
        assert_eq!(
            serde_json::to_string(&TaskState::Failed).unwrap(),
            "\"failed\""
        );
    }

    #[test]
    fn test_record_deserialization_defaults() {
        let record: TaskRecord = serde_json::from_str(r#"{"id":"a"}"#).unwrap();
        assert_eq!(record.id, "a");
        assert_eq!(record.payload, "");
        assert_eq!(record.max_retries, 0);

        // Negative retry budgets are not representable
        assert!(serde_json::from_str::<TaskRecord>(r#"{"id":"a","max_retries":-1}"#).is_err());
    }
}
