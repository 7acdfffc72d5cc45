//! Per-job executor.
//!
//! Drives one scratch directory through the conversion → write → callback
//! pipeline. The first error of any conversion or writer terminates the job
//! through the failure path; callback and cleanup errors never demote a
//! recorded success.

use std::path::Path;

use tokio::fs::File;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::callback::send_completion_callback;
use super::instructions::read_instructions;
use super::manager::JobManager;
use super::queue::{hash_of_dir, JobState};
use super::spec::{output_filename, CombinedJob};
use crate::encoder::EncodeOptions;
use crate::error::{Error, Result};
use crate::writer::dispatch_write;

/// Process a single job directory to a terminal state.
pub(crate) async fn execute_job(manager: &JobManager, dir: &Path) -> Result<()> {
    let hash = hash_of_dir(dir);

    // Claim the job. Losing the claim means it was cancelled (or already
    // taken) after the snapshot; drop the registry entry and move on.
    let Some(cancel) = manager.queue.mark_processing(&hash) else {
        manager.queue.remove(dir);
        return Ok(());
    };

    // If cancellation fires mid-run, best-effort remove the scratch
    // directory even before the pipeline notices.
    let watcher = {
        let cancel = cancel.clone();
        let dir = dir.to_path_buf();
        tokio::spawn(async move {
            cancel.cancelled().await;
            info!("Job cancelled, cleaning up {}", dir.display());
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                error!(
                    "Failed to clean up cancelled job directory {}: {}",
                    dir.display(),
                    e
                );
            }
        })
    };

    let result = run_pipeline(manager, dir, &hash, &cancel).await;
    watcher.abort();
    result
}

async fn run_pipeline(
    manager: &JobManager,
    dir: &Path,
    hash: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let instructions = match read_instructions(dir).await {
        Ok(instructions) => instructions,
        Err(e) => {
            error!("Failed to read instructions for {}: {}", dir.display(), e);
            return fail_job(manager, dir, hash, None, e, cancel).await;
        }
    };

    info!(
        "Processing job in {}: {}",
        dir.display(),
        instructions.original_file
    );
    let job = &instructions.job;

    let output_dir = dir.join("output");
    if let Err(e) = tokio::fs::create_dir_all(&output_dir).await {
        let err = Error::storage(format!("failed to create output directory: {}", e));
        return fail_job(manager, dir, hash, Some(job), err, cancel).await;
    }

    // Conversions, strictly in declared order.
    let input_path = dir.join(&instructions.original_file);
    let mut produced: Vec<String> = Vec::with_capacity(job.conversions.len());
    for step in &job.conversions {
        if cancel.is_cancelled() {
            return fail_job(manager, dir, hash, Some(job), Error::Cancelled, cancel).await;
        }

        let Some(encoder) = manager.encoders.get(&step.encoder) else {
            let err = Error::EncoderUnavailable(step.encoder.clone());
            return fail_job(manager, dir, hash, Some(job), err, cancel).await;
        };

        let filename = output_filename(hash, &instructions.original_file, step);
        let opts = EncodeOptions {
            width: step.width,
            height: step.length,
            quality: step.quality,
            speed: step.speed,
        };

        if let Err(e) = encoder
            .encode(cancel, &input_path, &output_dir.join(&filename), &opts)
            .await
        {
            let err = match e {
                Error::Cancelled => Error::Cancelled,
                other => Error::encoder(format!("conversion failed for {}: {}", step.encoder, other)),
            };
            return fail_job(manager, dir, hash, Some(job), err, cancel).await;
        }

        produced.push(filename);
    }

    // Writers, strictly in declared order; every writer sees every file in
    // production order.
    for writer in &job.writers {
        if cancel.is_cancelled() {
            return fail_job(manager, dir, hash, Some(job), Error::Cancelled, cancel).await;
        }

        for filename in &produced {
            if cancel.is_cancelled() {
                return fail_job(manager, dir, hash, Some(job), Error::Cancelled, cancel).await;
            }

            let file_path = output_dir.join(filename);
            let reader = match File::open(&file_path).await {
                Ok(reader) => reader,
                Err(e) => {
                    let err =
                        Error::writer(format!("failed to open file {}: {}", file_path.display(), e));
                    return fail_job(manager, dir, hash, Some(job), err, cancel).await;
                }
            };

            let access = manager
                .prepare_access_info(writer, filename, &job.sub_dir)
                .await;

            if let Err(e) = dispatch_write(cancel, &writer.backend, &access, reader).await {
                let err = match e {
                    Error::Cancelled => Error::Cancelled,
                    other => Error::writer(format!(
                        "failed to write {} to {}: {}",
                        filename, writer.backend, other
                    )),
                };
                return fail_job(manager, dir, hash, Some(job), err, cancel).await;
            }
        }
    }

    // Terminal bookkeeping. Outcome-store and callback errors are logged
    // but do not demote the completed job.
    manager.record_success(hash, job, produced.len()).await;

    if let Err(e) = send_completion_callback(hash, job).await {
        error!("Failed to send callback for {}: {}", dir.display(), e);
    }

    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        warn!("Failed to clean up scratch directory {}: {}", dir.display(), e);
    }

    manager.queue.complete(hash, JobState::Completed);
    manager.queue.remove(dir);

    info!("Successfully processed job in {}", dir.display());
    Ok(())
}

/// Route an error through the failure path: persist the failure outcome,
/// record the terminal state (`Cancelled` when the cancel handle fired),
/// drop the registry entry, and best-effort remove the scratch directory.
async fn fail_job(
    manager: &JobManager,
    dir: &Path,
    hash: &str,
    job: Option<&CombinedJob>,
    err: Error,
    cancel: &CancellationToken,
) -> Result<()> {
    let job_data = job
        .map(|j| serde_json::to_string(j).unwrap_or_default())
        .unwrap_or_default();
    manager
        .record_failure(hash, &err.to_string(), &job_data)
        .await;

    let terminal = if cancel.is_cancelled() || err.is_cancelled() {
        JobState::Cancelled
    } else {
        JobState::Failed
    };
    manager.queue.complete(hash, terminal);
    manager.queue.remove(dir);

    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        warn!(
            "Failed to clean up failed job directory {}: {}",
            dir.display(),
            e
        );
    }

    Err(err)
}
