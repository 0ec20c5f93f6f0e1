//! Demo queue service: accepts tasks over HTTP, executes them on a bounded
//! worker pool, and retries failures with exponential backoff.
//!
//! ```text
//! POST /enqueue {"id":"t1","payload":"...","max_retries":3}  -> 202 | 400 | 503
//! GET  /healthz                                              -> 200
//! GET  /tasks/{id}                                           -> 200 | 404
//! ```
//!
//! Configuration is read once at startup from the environment: `WORKERS`
//! (default 4) and `QUEUE_SIZE` (default 64). SIGINT/SIGTERM trigger a
//! graceful shutdown bounded by a 10 second deadline.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use taskpool::{PoolConfig, PoolError, RetryScheduler, SchedulerError, TaskRecord, WorkerPool};

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

/// Reads a positive integer from the environment, falling back to `default`
/// when the variable is absent, non-numeric, or zero.
fn env_positive(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(value) => value
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(default),
        Err(_) => default,
    }
}

/// Simulated work: 100-500ms of processing with a 20% failure rate.
fn simulate_work(_record: &TaskRecord) -> taskpool::Result<()> {
    let ms = 100 + fastrand::u64(..401);
    std::thread::sleep(Duration::from_millis(ms));
    if fastrand::u32(..100) < 20 {
        Err(PoolError::execution("simulated failure"))
    } else {
        Ok(())
    }
}

async fn index() -> &'static str {
    "Worker Queue API\n\nPOST /enqueue {id,payload,max_retries}\nGET /healthz\nGET /tasks/{id}\n"
}

async fn healthz() -> &'static str {
    "ok"
}

async fn enqueue(
    State(scheduler): State<Arc<RetryScheduler>>,
    Json(record): Json<TaskRecord>,
) -> (StatusCode, &'static str) {
    if record.id.is_empty() {
        return (StatusCode::BAD_REQUEST, "missing id");
    }
    match scheduler.enqueue(record) {
        Ok(()) => (StatusCode::ACCEPTED, "enqueued"),
        Err(SchedulerError::Overloaded) => (StatusCode::SERVICE_UNAVAILABLE, "queue full"),
        Err(SchedulerError::ShuttingDown) => (StatusCode::SERVICE_UNAVAILABLE, "shutting down"),
    }
}

async fn task_state(
    State(scheduler): State<Arc<RetryScheduler>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match scheduler.state_of(&id) {
        Some(state) => Ok(Json(serde_json::json!({ "id": id, "state": state }))),
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            error!("failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let workers = env_positive("WORKERS", 4);
    let queue_size = env_positive("QUEUE_SIZE", 64);

    let pool = WorkerPool::new(
        PoolConfig::new(workers, queue_size).with_thread_name_prefix("queue-worker"),
    )?;
    let scheduler = Arc::new(RetryScheduler::new(pool, Arc::new(simulate_work))?);

    let app = Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/enqueue", post(enqueue))
        .route("/tasks/:id", get(task_state))
        .with_state(Arc::clone(&scheduler));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    info!("listening on :8080 (workers={}, queue={})", workers, queue_size);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown: stopping queue service");
    let shutdown_scheduler = Arc::clone(&scheduler);
    let shutdown = tokio::task::spawn_blocking(move || shutdown_scheduler.shutdown());
    if tokio::time::timeout(SHUTDOWN_DEADLINE, shutdown).await.is_err() {
        // Past the deadline, shutdown is complete regardless of residual
        // state; do not let runtime teardown wait on the stuck call.
        error!("shutdown deadline exceeded, exiting with residual state");
        std::process::exit(1);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_positive_defaults() {
        std::env::remove_var("TASKPOOL_TEST_MISSING");
        assert_eq!(env_positive("TASKPOOL_TEST_MISSING", 4), 4);

        std::env::set_var("TASKPOOL_TEST_BAD", "not-a-number");
        assert_eq!(env_positive("TASKPOOL_TEST_BAD", 4), 4);

        std::env::set_var("TASKPOOL_TEST_ZERO", "0");
        assert_eq!(env_positive("TASKPOOL_TEST_ZERO", 4), 4);

        std::env::set_var("TASKPOOL_TEST_OK", "16");
        assert_eq!(env_positive("TASKPOOL_TEST_OK", 4), 16);
    }

    #[test]
    fn test_simulated_work_duration_bounds() {
        let record = TaskRecord {
            id: "t".to_string(),
            payload: String::new(),
            max_retries: 0,
        };
        let start = std::time::Instant::now();
        let _ = simulate_work(&record);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(600));
    }
}
