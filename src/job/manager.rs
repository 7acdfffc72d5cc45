//! Job manager.
//!
//! Owns the shared pieces of the job lifecycle: the pending registry and
//! state table, the encoder registry, the outcome stores, and the scratch
//! and serve roots. The HTTP handlers and the worker pool both go through
//! this type.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use super::instructions::{read_instructions, write_instructions, InstructionRecord};
use super::queue::{JobQueue, JobState};
use super::spec::{expected_files, CombinedJob, WriterStep};
use crate::auth::JobSpec;
use crate::encoder::EncoderRegistry;
use crate::error::{Error, Result};
use crate::store::{CredentialsStore, FailureRecord, FailureStore, SuccessRecord, SuccessStore};
use crate::writer::{AccessInfo, BACKEND_DIRECT_SERVE};

/// Response body of a successful upload.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UploadReceipt {
    pub hash: String,
    pub expected_files: Vec<String>,
}

/// Shared engine state behind the HTTP surface and the worker pool.
pub struct JobManager {
    pub(crate) scratch_root: PathBuf,
    pub(crate) serve_dir: PathBuf,
    pub(crate) queue: Arc<JobQueue>,
    pub(crate) encoders: Arc<EncoderRegistry>,
    pub(crate) success: Arc<SuccessStore>,
    pub(crate) failures: Arc<FailureStore>,
    pub(crate) credentials: Option<Arc<CredentialsStore>>,
}

impl JobManager {
    pub fn new(
        scratch_root: PathBuf,
        serve_dir: PathBuf,
        queue: Arc<JobQueue>,
        encoders: Arc<EncoderRegistry>,
        success: Arc<SuccessStore>,
        failures: Arc<FailureStore>,
    ) -> Self {
        Self {
            scratch_root,
            serve_dir,
            queue,
            encoders,
            success,
            failures,
            credentials: None,
        }
    }

    /// Attach the credentials store used to resolve storage access keys.
    pub fn with_credentials(mut self, credentials: Arc<CredentialsStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Accept an authenticated upload: hash it, materialize the scratch
    /// directory and instruction record, and publish to the pending
    /// registry.
    ///
    /// Re-uploading bytes that are already tracked overwrites the scratch
    /// directory in place; the registry refuses the duplicate entry and the
    /// caller receives the same receipt either way.
    pub async fn ingest(
        &self,
        original_file: &str,
        data: &[u8],
        spec: &JobSpec,
    ) -> Result<UploadReceipt> {
        let original = Path::new(original_file)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::request("upload is missing a filename"))?;

        let hash = hex::encode(Sha256::digest(data));
        let job = CombinedJob::from_spec(spec)?;

        let dir = self.scratch_root.join(&hash);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::storage(format!("failed to create scratch directory: {}", e)))?;
        tokio::fs::write(dir.join(&original), data)
            .await
            .map_err(|e| Error::storage(format!("failed to save upload: {}", e)))?;

        let expected = expected_files(&hash, &original, &job.conversions);

        let record = InstructionRecord {
            scratch_path: dir.clone(),
            original_file: original,
            hash: hash.clone(),
            job,
        };
        write_instructions(&dir, &record).await?;

        if self.queue.add(&dir) {
            info!(hash = %hash, "Job added to pending queue");
        } else {
            info!(hash = %hash, "Duplicate upload; scratch directory refreshed");
        }

        Ok(UploadReceipt {
            hash,
            expected_files: expected,
        })
    }

    /// Request cancellation of a job by hash.
    ///
    /// Only `Pending` jobs are cancellable; the registry enforces the
    /// policy. A successful cancel persists the failure outcome and
    /// removes the scratch directory.
    pub async fn cancel(&self, hash: &str) -> Result<()> {
        let removed_dir = self.queue.request_cancel(hash)?;

        let job_data = match &removed_dir {
            Some(dir) => match read_instructions(dir).await {
                Ok(record) => serde_json::to_string(&record.job).unwrap_or_default(),
                Err(_) => String::new(),
            },
            None => String::new(),
        };
        self.record_failure(hash, "job cancelled before processing", &job_data)
            .await;

        if let Some(dir) = removed_dir {
            if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
                warn!(
                    "Failed to remove scratch directory for cancelled job {}: {}",
                    dir.display(),
                    e
                );
            }
        }

        info!(hash = %hash, "Job cancelled");
        Ok(())
    }

    /// Current state of a job.
    pub fn state_of(&self, hash: &str) -> Option<JobState> {
        self.queue.state_of(hash)
    }

    /// Persist a success outcome, keeping the stores disjoint.
    pub(crate) async fn record_success(&self, hash: &str, job: &CombinedJob, file_count: usize) {
        if let Err(e) = self.failures.delete(hash).await {
            warn!("Failed to clear stale failure record for {}: {}", hash, e);
        }

        let job_data = serde_json::to_string(job).unwrap_or_default();
        let record = SuccessRecord::new(hash, job_data, file_count);
        if let Err(e) = self.success.put(hash, &record).await {
            error!("Failed to store success record for {}: {}", hash, e);
        }
    }

    /// Persist a failure outcome, keeping the stores disjoint.
    pub(crate) async fn record_failure(&self, hash: &str, error_msg: &str, job_data: &str) {
        if let Err(e) = self.success.delete(hash).await {
            warn!("Failed to clear stale success record for {}: {}", hash, e);
        }

        let record = FailureRecord::new(hash, error_msg, job_data);
        if let Err(e) = self.failures.put(hash, &record).await {
            error!("Failed to store failure record for {}: {}", hash, e);
        }
    }

    /// Build the access-info bag for one writer and one produced file.
    ///
    /// Credentials referencing a registered access key (a lone `key`
    /// entry) are expanded from the credentials store; explicit entries
    /// always win over stored ones.
    pub(crate) async fn prepare_access_info(
        &self,
        writer: &WriterStep,
        filename: &str,
        sub_dir: &str,
    ) -> AccessInfo {
        let mut access: AccessInfo = writer.credentials.clone();

        if let (Some(store), Some(key)) = (&self.credentials, writer.credentials.get("key")) {
            match store.get(key).await {
                Ok(Some(stored)) => {
                    for (k, v) in stored {
                        access.entry(k).or_insert(v);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to resolve credentials for key {}: {}", key, e),
            }
        }

        access.insert("filename".to_string(), filename.to_string());
        access.insert("folder".to_string(), sub_dir.to_string());
        if writer.backend == BACKEND_DIRECT_SERVE {
            access.insert(
                "baseDir".to_string(),
                self.serve_dir.to_string_lossy().into_owned(),
            );
        }

        access
    }
}
