//! Bounded worker pool driving pending jobs to completion.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::executor::execute_job;
use super::manager::JobManager;

/// How long the pool sleeps when the pending registry is empty.
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Maximum concurrently executing jobs.
    pub max_workers: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self { max_workers: 2 }
    }
}

/// Spawn the worker-pool driver loop.
///
/// Each iteration snapshots the pending registry and spawns one executor
/// per directory, gated by a semaphore so no more than `max_workers` run at
/// once. The batch drains fully before the next snapshot; jobs are taken
/// in insertion order and never retried.
pub fn spawn_worker_pool(
    manager: Arc<JobManager>,
    config: WorkerPoolConfig,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run(manager, config, shutdown))
}

async fn run(manager: Arc<JobManager>, config: WorkerPoolConfig, shutdown: CancellationToken) {
    let max_workers = config.max_workers.max(1);
    info!("Starting worker pool with {} max workers", max_workers);
    let semaphore = Arc::new(Semaphore::new(max_workers));

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let batch = manager.queue().snapshot();
        if batch.is_empty() {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(IDLE_POLL_INTERVAL) => continue,
            }
        }

        info!("Processing {} pending jobs", batch.len());
        let mut tasks = JoinSet::new();
        for dir in batch {
            let manager = manager.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                match execute_job(&manager, &dir).await {
                    Ok(()) => debug!("Processed job in {}", dir.display()),
                    Err(e) => error!("Failed to process job in {}: {}", dir.display(), e),
                }
            });
        }

        // Drain the batch before snapshotting again.
        while tasks.join_next().await.is_some() {}
    }

    info!("Worker pool stopped");
}
