//! Pending registry and job state table.
//!
//! An ordered list of scratch directories awaiting execution plus the
//! in-memory hash → state map that answers status queries. Cancel handles
//! live beside the states; all access goes through one reader/writer lock
//! and no lock is ever held across an await point.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::instructions::has_instructions;
use crate::error::{Error, Result};

/// Lifecycle state of a job.
///
/// Transitions are strictly `Pending → Processing → {Completed | Failed |
/// Cancelled}`; only `Pending` jobs are externally cancellable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hash of the job owning a scratch directory (its basename).
pub fn hash_of_dir(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Default)]
struct Inner {
    pending: Vec<PathBuf>,
    states: HashMap<String, JobState>,
    tokens: HashMap<String, CancellationToken>,
}

/// The pending registry plus the job state table.
#[derive(Default)]
pub struct JobQueue {
    inner: RwLock<Inner>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a scratch directory and mark its hash `Pending`.
    ///
    /// Returns false (leaving the existing entry untouched) when the
    /// directory is already queued, so readers never observe duplicates.
    pub fn add(&self, dir: &Path) -> bool {
        let hash = hash_of_dir(dir);
        let mut inner = self.inner.write();
        if inner.pending.iter().any(|p| p == dir) {
            return false;
        }
        inner.pending.push(dir.to_path_buf());
        inner.states.insert(hash, JobState::Pending);
        true
    }

    /// Remove the first matching directory from the pending list. The
    /// state table is untouched; terminal states are set elsewhere.
    pub fn remove(&self, dir: &Path) {
        let mut inner = self.inner.write();
        if let Some(pos) = inner.pending.iter().position(|p| p == dir) {
            inner.pending.remove(pos);
        }
    }

    /// Independent copy of the pending list, safe to iterate while the
    /// registry keeps mutating.
    pub fn snapshot(&self) -> Vec<PathBuf> {
        self.inner.read().pending.clone()
    }

    /// Number of directories currently pending.
    pub fn pending_count(&self) -> usize {
        self.inner.read().pending.len()
    }

    /// Crash recovery: enqueue every immediate sub-directory of `root`
    /// that contains an instruction record. Returns how many were added.
    pub async fn scan_on_boot(&self, root: &Path) -> Result<usize> {
        let mut entries = tokio::fs::read_dir(root).await?;
        let mut added = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            if has_instructions(&path).await && self.add(&path) {
                debug!("Recovered pending job directory {}", path.display());
                added += 1;
            }
        }
        Ok(added)
    }

    /// Atomically claim a `Pending` job for execution: set `Processing`
    /// and hand out a fresh cancel handle.
    ///
    /// Returns None when the job is no longer `Pending` (e.g. it was
    /// cancelled between the snapshot and the claim); the caller must then
    /// drop the directory without touching it.
    pub fn mark_processing(&self, hash: &str) -> Option<CancellationToken> {
        let mut inner = self.inner.write();
        match inner.states.get(hash) {
            Some(JobState::Pending) => {
                inner.states.insert(hash.to_string(), JobState::Processing);
                let token = CancellationToken::new();
                inner.tokens.insert(hash.to_string(), token.clone());
                Some(token)
            }
            _ => None,
        }
    }

    /// Record a terminal state and drop the cancel handle.
    pub fn complete(&self, hash: &str, terminal: JobState) {
        debug_assert!(terminal.is_terminal());
        let mut inner = self.inner.write();
        inner.states.insert(hash.to_string(), terminal);
        inner.tokens.remove(hash);
    }

    /// Request cancellation of a job.
    ///
    /// Only `Pending` jobs are cancellable: a claimed job belongs to its
    /// executor and external cancellation is refused with a conflict. On
    /// success the job is marked `Cancelled`, its registry entry is
    /// removed, and the removed scratch directory is returned so the
    /// caller can record the outcome and clean up.
    pub fn request_cancel(&self, hash: &str) -> Result<Option<PathBuf>> {
        let mut inner = self.inner.write();
        let state = *inner
            .states
            .get(hash)
            .ok_or_else(|| Error::not_found(format!("job with hash {} not found", hash)))?;

        match state {
            JobState::Completed => Err(Error::conflict(format!(
                "job with hash {} is already completed",
                hash
            ))),
            JobState::Failed => Err(Error::conflict(format!(
                "job with hash {} has already failed",
                hash
            ))),
            JobState::Cancelled => Err(Error::conflict(format!(
                "job with hash {} is already cancelled",
                hash
            ))),
            JobState::Processing => Err(Error::conflict(format!(
                "job with hash {} is currently processing and cannot be cancelled",
                hash
            ))),
            JobState::Pending => {
                if let Some(token) = inner.tokens.remove(hash) {
                    token.cancel();
                }
                inner.states.insert(hash.to_string(), JobState::Cancelled);

                let dir = inner
                    .pending
                    .iter()
                    .position(|p| hash_of_dir(p) == hash)
                    .map(|pos| inner.pending.remove(pos));
                Ok(dir)
            }
        }
    }

    /// Current state of a job, if the hash is known.
    pub fn state_of(&self, hash: &str) -> Option<JobState> {
        self.inner.read().states.get(hash).copied()
    }
}
