//! Basic walkthrough of the worker pool API: fire-and-forget submission,
//! synchronous submission, and the two shutdown modes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskpool::prelude::*;

fn main() -> Result<()> {
    env_logger::init();

    // Pool with 3 workers
    let pool = WorkerPool::with_workers(3, 128)?;

    let total_tasks = 100;
    println!("Submitting {} tasks...", total_tasks);

    let completed = Arc::new(AtomicUsize::new(0));
    for i in 0..total_tasks {
        let completed_clone = Arc::clone(&completed);
        pool.execute(move || {
            // Simulate some work
            std::thread::sleep(Duration::from_millis(100));
            let current = completed_clone.fetch_add(1, Ordering::SeqCst) + 1;
            println!("Task {} finished ({}/{})", i, current, total_tasks);
            Ok(())
        })?;
    }

    // Wait for the batch to drain
    while completed.load(Ordering::SeqCst) < total_tasks {
        std::thread::sleep(Duration::from_millis(20));
    }
    println!("\nAll tasks finished: {}/{}", completed.load(Ordering::SeqCst), total_tasks);

    // Synchronous submission blocks until the task completes
    println!("\n=== submit_wait ===");
    let start = Instant::now();
    pool.execute_wait(|| {
        std::thread::sleep(Duration::from_millis(200));
        println!("submit_wait task finished!");
        Ok(())
    })?;
    println!("submit_wait took: {:?}", start.elapsed());

    pool.stop()?;

    // stop_wait drains every queued task before returning
    println!("\n=== stop_wait ===");
    let pool2 = WorkerPool::with_workers(2, 16)?;
    for i in 0..5 {
        pool2.execute(move || {
            std::thread::sleep(Duration::from_millis(100));
            println!("Task {} in the stop_wait example finished", i);
            Ok(())
        })?;
    }

    println!("Stopping the pool with stop_wait...");
    pool2.stop_wait()?;
    println!("Pool stopped, every task ran!");

    Ok(())
}
