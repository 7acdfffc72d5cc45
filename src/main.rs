use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use imagemill::api::{ApiServer, AppState};
use imagemill::auth::TokenVerifier;
use imagemill::config::Config;
use imagemill::encoder::EncoderRegistry;
use imagemill::job::{spawn_worker_pool, JobManager, JobQueue, WorkerPoolConfig};
use imagemill::store::retention::spawn_retention_task;
use imagemill::store::{CredentialsStore, FailureStore, SuccessStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    imagemill::logging::init();
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("Starting imagemill server initialization");

    tokio::fs::create_dir_all(&config.data_dir).await?;
    tokio::fs::create_dir_all(&config.serve_dir).await?;
    tokio::fs::create_dir_all(&config.scratch_root).await?;

    // Durable stores.
    let success = Arc::new(SuccessStore::open(&config.success_db_path()).await?);
    let failures = Arc::new(FailureStore::open(&config.failures_db_path()).await?);
    let credentials = Arc::new(CredentialsStore::open(&config.credentials_db_path()).await?);
    tracing::info!("Outcome and credentials stores initialized");

    // Encoder registry with availability probing.
    let encoders = Arc::new(EncoderRegistry::with_defaults());
    tracing::info!("Registered encoders: {:?}", encoders.names());

    let queue = Arc::new(JobQueue::new());
    let manager = Arc::new(
        JobManager::new(
            config.scratch_root.clone(),
            config.serve_dir.clone(),
            queue.clone(),
            encoders,
            success.clone(),
            failures.clone(),
        )
        .with_credentials(credentials.clone()),
    );

    // Crash recovery: re-enqueue scratch directories left behind by a
    // previous run.
    match queue.scan_on_boot(&config.scratch_root).await {
        Ok(recovered) => tracing::info!("Recovered {} pending jobs on boot", recovered),
        Err(e) => tracing::error!("Failed to scan for pending jobs: {}", e),
    }

    let shutdown = CancellationToken::new();

    let pool_handle = spawn_worker_pool(
        manager.clone(),
        WorkerPoolConfig {
            max_workers: config.max_workers,
        },
        shutdown.clone(),
    );

    let retention_handle =
        spawn_retention_task(success.clone(), failures.clone(), shutdown.clone());

    let state = AppState::new(
        manager,
        TokenVerifier::new(&config.jwt_secret),
        success,
        failures,
        credentials,
        config.serve_dir.clone(),
    );
    let server = ApiServer::new(config.bind_address.clone(), config.port, state);
    let server_cancel = server.cancel_token();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        tracing::info!("Received shutdown signal, initiating graceful shutdown...");
        server_cancel.cancel();
    });

    server.run().await?;

    // HTTP is down; stop the background tasks and wait for them.
    shutdown.cancel();
    let _ = pool_handle.await;
    let _ = retention_handle.await;

    tracing::info!("imagemill server shutdown complete");
    Ok(())
}
