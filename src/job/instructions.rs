//! On-disk instruction records.
//!
//! An `instructions.json` inside a scratch directory is the durable marker
//! that the directory holds work to do; the boot scan re-enqueues every
//! directory that has one.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::spec::CombinedJob;
use crate::error::{Error, Result};

/// Name of the record file inside a scratch directory.
pub const INSTRUCTIONS_FILE: &str = "instructions.json";

/// Everything the executor needs to process one uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstructionRecord {
    /// The scratch directory containing the upload.
    pub scratch_path: PathBuf,
    /// Original filename, verbatim.
    pub original_file: String,
    /// Content hash of the upload (the job identifier).
    pub hash: String,
    /// The combined job as scheduled.
    pub job: CombinedJob,
}

/// Write the instruction record into `dir`.
pub async fn write_instructions(dir: &Path, record: &InstructionRecord) -> Result<()> {
    let body = serde_json::to_vec_pretty(record)?;
    tokio::fs::write(dir.join(INSTRUCTIONS_FILE), body)
        .await
        .map_err(|e| Error::storage(format!("failed to write instructions file: {}", e)))
}

/// Read the instruction record from `dir`.
pub async fn read_instructions(dir: &Path) -> Result<InstructionRecord> {
    let body = tokio::fs::read(dir.join(INSTRUCTIONS_FILE))
        .await
        .map_err(|e| Error::storage(format!("failed to open instructions file: {}", e)))?;
    serde_json::from_slice(&body)
        .map_err(|e| Error::storage(format!("failed to decode instructions: {}", e)))
}

/// Whether `dir` contains an instruction record.
pub async fn has_instructions(dir: &Path) -> bool {
    tokio::fs::try_exists(dir.join(INSTRUCTIONS_FILE))
        .await
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::spec::ConversionStep;

    fn sample_record(dir: &Path) -> InstructionRecord {
        InstructionRecord {
            scratch_path: dir.to_path_buf(),
            original_file: "photo.jpg".to_string(),
            hash: "deadbeef".to_string(),
            job: CombinedJob {
                conversions: vec![ConversionStep {
                    encoder: "jpg".to_string(),
                    width: 400,
                    length: 300,
                    quality: 80,
                    speed: 1,
                }],
                sub_dir: "u/1".to_string(),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let record = sample_record(dir.path());

        write_instructions(dir.path(), &record).await.unwrap();
        let back = read_instructions(dir.path()).await.unwrap();
        assert_eq!(back, record);
    }

    #[tokio::test]
    async fn test_has_instructions() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!has_instructions(dir.path()).await);

        write_instructions(dir.path(), &sample_record(dir.path()))
            .await
            .unwrap();
        assert!(has_instructions(dir.path()).await);
    }

    #[tokio::test]
    async fn test_read_missing_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_instructions(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_read_corrupt_fails() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join(INSTRUCTIONS_FILE), b"not json")
            .await
            .unwrap();
        assert!(read_instructions(dir.path()).await.is_err());
    }
}
