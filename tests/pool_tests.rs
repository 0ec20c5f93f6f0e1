//! Integration tests for the worker pool's submission and shutdown contracts

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use taskpool::prelude::*;

/// Every task accepted before a drain-all stop runs exactly once.
#[test]
fn stop_wait_runs_every_accepted_task_exactly_once() {
    let pool = WorkerPool::with_workers(3, 32).expect("failed to create pool");
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..32 {
        let counter_clone = Arc::clone(&counter);
        pool.execute(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .expect("submit should succeed below capacity");
    }

    pool.stop_wait().expect("failed to stop pool");

    assert_eq!(counter.load(Ordering::SeqCst), 32);
    assert_eq!(pool.total_tasks_processed(), 32);
}

/// With a single worker, tasks start in exact submission order.
#[test]
fn single_worker_executes_in_submission_order() {
    use std::sync::Mutex;

    let pool = WorkerPool::with_workers(1, 64).expect("failed to create pool");
    let order = Arc::new(Mutex::new(Vec::new()));

    for i in 0..20 {
        let order_clone = Arc::clone(&order);
        pool.execute(move || {
            order_clone.lock().unwrap().push(i);
            Ok(())
        })
        .expect("submit failed");
    }

    pool.stop_wait().expect("failed to stop pool");

    assert_eq!(*order.lock().unwrap(), (0..20).collect::<Vec<_>>());
}

/// `submit_wait` blocks for at least the task's duration and returns the
/// task's own error.
#[test]
fn submit_wait_blocks_and_returns_exact_error() {
    let pool = WorkerPool::with_workers(2, 8).expect("failed to create pool");

    let start = Instant::now();
    let result = pool.execute_wait(|| {
        thread::sleep(Duration::from_millis(150));
        Err(PoolError::execution("exactly this error"))
    });
    let elapsed = start.elapsed();

    assert!(
        elapsed >= Duration::from_millis(150),
        "caller unblocked after {:?}, before the task finished",
        elapsed
    );
    match result {
        Err(PoolError::Execution { message }) => assert_eq!(message, "exactly this error"),
        other => panic!("expected the task's own error, got: {:?}", other),
    }

    pool.stop().expect("failed to stop pool");
}

/// `stop()` completes the in-flight task and never runs the queued ones.
#[test]
fn stop_finishes_in_flight_and_discards_queued() {
    let pool = Arc::new(WorkerPool::with_workers(1, 8).expect("failed to create pool"));

    let (started_tx, started_rx) = crossbeam_channel::bounded(1);
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
    let in_flight_done = Arc::new(AtomicBool::new(false));
    let queued_ran = Arc::new(AtomicUsize::new(0));

    let done_clone = Arc::clone(&in_flight_done);
    pool.execute(move || {
        started_tx.send(()).unwrap();
        let _ = release_rx.recv();
        done_clone.store(true, Ordering::SeqCst);
        Ok(())
    })
    .expect("failed to submit in-flight task");

    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("in-flight task should start");

    // Queue up k tasks behind the blocked worker
    for _ in 0..5 {
        let queued_clone = Arc::clone(&queued_ran);
        pool.execute(move || {
            queued_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .expect("failed to queue task");
    }

    let pool_clone = Arc::clone(&pool);
    let stopper = thread::spawn(move || pool_clone.stop());

    // stop() marks the pool non-accepting and drains the queue before
    // blocking on the in-flight task
    let deadline = Instant::now() + Duration::from_secs(5);
    while pool.is_running() {
        assert!(Instant::now() < deadline, "stop never marked the pool stopped");
        thread::sleep(Duration::from_millis(5));
    }

    release_tx.send(()).unwrap();
    stopper
        .join()
        .expect("stopper thread panicked")
        .expect("stop failed");

    assert!(in_flight_done.load(Ordering::SeqCst));
    assert_eq!(queued_ran.load(Ordering::SeqCst), 0);
}

/// A full queue rejects immediately without blocking or altering contents.
#[test]
fn submit_on_full_queue_rejects_without_side_effects() {
    let pool = WorkerPool::with_workers(1, 2).expect("failed to create pool");

    let (started_tx, started_rx) = crossbeam_channel::bounded(1);
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);

    pool.execute(move || {
        started_tx.send(()).unwrap();
        let _ = release_rx.recv();
        Ok(())
    })
    .expect("failed to submit blocking task");

    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("blocking task should start");

    // Worker is busy; fill the queue (capacity 2)
    pool.execute(|| Ok(())).expect("failed to fill queue slot 1");
    pool.execute(|| Ok(())).expect("failed to fill queue slot 2");
    assert_eq!(pool.queue_len(), 2);

    let start = Instant::now();
    let result = pool.execute(|| Ok(()));
    let elapsed = start.elapsed();

    assert!(
        matches!(result, Err(PoolError::QueueFull { .. })),
        "expected QueueFull, got: {:?}",
        result
    );
    assert!(
        elapsed < Duration::from_millis(100),
        "rejection took {:?}, submit must not block",
        elapsed
    );
    assert_eq!(pool.queue_len(), 2);

    release_tx.send(()).unwrap();
    pool.stop_wait().expect("failed to stop pool");
}

/// A panicking task surfaces as an error to the synchronous caller instead
/// of crashing the caller or the pool.
#[test]
fn panicking_task_yields_error_to_waiting_caller() {
    let pool = WorkerPool::with_workers(2, 8).expect("failed to create pool");

    let result = pool.execute_wait(|| panic!("deliberate task panic"));
    match result {
        Err(PoolError::TaskPanic { message }) => {
            assert!(message.contains("deliberate task panic"));
        }
        other => panic!("expected TaskPanic, got: {:?}", other),
    }

    // The pool keeps working afterwards
    assert!(pool.is_running());
    pool.execute_wait(|| Ok(()))
        .expect("pool should survive a task panic");

    pool.stop().expect("failed to stop pool");
}

/// One worker, capacity one: A in flight, B fills the slot, C is rejected;
/// stop() returns once A completes and B never has to run.
#[test]
fn full_scenario_one_worker_capacity_one() {
    let pool = Arc::new(WorkerPool::with_workers(1, 1).expect("failed to create pool"));

    let (started_tx, started_rx) = crossbeam_channel::bounded(1);
    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
    let a_completed = Arc::new(AtomicBool::new(false));
    let b_ran = Arc::new(AtomicBool::new(false));

    let a_clone = Arc::clone(&a_completed);
    pool.execute(move || {
        started_tx.send(()).unwrap();
        let _ = release_rx.recv();
        a_clone.store(true, Ordering::SeqCst);
        Ok(())
    })
    .expect("failed to submit task A");

    started_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("task A should start");

    // B occupies the single queue slot
    let b_clone = Arc::clone(&b_ran);
    pool.execute(move || {
        b_clone.store(true, Ordering::SeqCst);
        Ok(())
    })
    .expect("task B should be accepted");

    // C finds the queue full
    let result = pool.execute(|| Ok(()));
    assert!(
        matches!(result, Err(PoolError::QueueFull { .. })),
        "expected QueueFull for task C, got: {:?}",
        result
    );

    let pool_clone = Arc::clone(&pool);
    let stopper = thread::spawn(move || pool_clone.stop());

    let deadline = Instant::now() + Duration::from_secs(5);
    while pool.is_running() {
        assert!(Instant::now() < deadline, "stop never began");
        thread::sleep(Duration::from_millis(5));
    }

    release_tx.send(()).unwrap();
    stopper
        .join()
        .expect("stopper thread panicked")
        .expect("stop failed");

    assert!(a_completed.load(Ordering::SeqCst), "task A must complete");
    assert!(!b_ran.load(Ordering::SeqCst), "task B must not run");
}
