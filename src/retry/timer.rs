//! Cancellable delayed execution for retry scheduling

use crate::core::{PoolError, Result};
use log::{debug, error};
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type TimerCallback = Box<dyn FnOnce() + Send>;

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    callback: TimerCallback,
}

// BinaryHeap is a max-heap; ordering is inverted so the earliest deadline is
// popped first, with the sequence number breaking ties in schedule order.
impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct TimerQueue {
    entries: BinaryHeap<TimerEntry>,
    next_seq: u64,
    shutdown: bool,
}

struct TimerShared {
    queue: Mutex<TimerQueue>,
    condvar: Condvar,
}

/// A single-threaded deferred-execution primitive.
///
/// Callbacks scheduled with [`schedule`](Self::schedule) run on the timer
/// thread once their delay elapses, in deadline order.
/// [`shutdown`](Self::shutdown) cancels everything still pending: the
/// callbacks are dropped without running.
pub struct DelayTimer {
    shared: Arc<TimerShared>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl DelayTimer {
    /// Create the timer and start its thread.
    pub fn new() -> Result<Self> {
        let shared = Arc::new(TimerShared {
            queue: Mutex::new(TimerQueue::default()),
            condvar: Condvar::new(),
        });

        let shared_clone = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("taskpool-timer".to_string())
            .spawn(move || Self::run(shared_clone))
            .map_err(|e| PoolError::spawn_with_source(0, "cannot spawn timer thread", e))?;

        Ok(Self {
            shared,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Schedule `callback` to run after `delay`.
    ///
    /// Returns `false` if the timer has been shut down; the callback is
    /// dropped in that case.
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut queue = self.shared.queue.lock();
        if queue.shutdown {
            return false;
        }
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.entries.push(TimerEntry {
            deadline: Instant::now() + delay,
            seq,
            callback: Box::new(callback),
        });
        self.shared.condvar.notify_one();
        true
    }

    /// Number of callbacks still pending.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().entries.len()
    }

    /// Stop the timer thread and drop every pending callback.
    ///
    /// Safe to call more than once; only the first call has effect.
    pub fn shutdown(&self) {
        {
            let mut queue = self.shared.queue.lock();
            if queue.shutdown {
                return;
            }
            queue.shutdown = true;
            let dropped = queue.entries.len();
            queue.entries.clear();
            if dropped > 0 {
                debug!("timer shutdown: dropped {} pending callbacks", dropped);
            }
        }
        self.shared.condvar.notify_one();

        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                error!("timer thread panicked during shutdown");
            }
        }
    }

    fn run(shared: Arc<TimerShared>) {
        loop {
            let callback = {
                let mut queue = shared.queue.lock();
                loop {
                    if queue.shutdown {
                        return;
                    }
                    match queue.entries.peek() {
                        None => {
                            shared.condvar.wait(&mut queue);
                        }
                        Some(entry) if entry.deadline <= Instant::now() => {
                            break queue.entries.pop().map(|e| e.callback);
                        }
                        Some(entry) => {
                            let deadline = entry.deadline;
                            shared.condvar.wait_until(&mut queue, deadline);
                        }
                    }
                }
            };

            if let Some(callback) = callback {
                // A panicking callback must not take the timer down
                if catch_unwind(AssertUnwindSafe(callback)).is_err() {
                    error!("timer callback panicked");
                }
            }
        }
    }
}

impl Drop for DelayTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
