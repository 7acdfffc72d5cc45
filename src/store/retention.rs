//! Scheduled eviction of old outcome records.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{FailureStore, SuccessStore};

/// How often the eviction pass runs.
pub const RETENTION_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Age beyond which outcome records are evicted.
pub const MAX_RECORD_AGE_DAYS: i64 = 30;

/// Spawn the background ticker that evicts old records from both outcome
/// stores once per [`RETENTION_INTERVAL`].
pub fn spawn_retention_task(
    success: Arc<SuccessStore>,
    failures: Arc<FailureStore>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    spawn_retention_task_with_interval(success, failures, shutdown, RETENTION_INTERVAL)
}

/// As [`spawn_retention_task`], with a custom interval (used by tests).
pub fn spawn_retention_task_with_interval(
    success: Arc<SuccessStore>,
    failures: Arc<FailureStore>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let max_age = chrono::Duration::days(MAX_RECORD_AGE_DAYS);
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; skip it so eviction only
        // runs after a full interval has elapsed.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Retention task stopped");
                    break;
                }
                _ = ticker.tick() => {
                    info!("Running scheduled eviction of old outcome records");

                    match success.evict_older_than(max_age).await {
                        Ok(n) => info!("Evicted {} old success records", n),
                        Err(e) => error!("Failed to evict old success records: {}", e),
                    }

                    match failures.evict_older_than(max_age).await {
                        Ok(n) => info!("Evicted {} old failure records", n),
                        Err(e) => error!("Failed to evict old failure records: {}", e),
                    }
                }
            }
        }
    })
}
