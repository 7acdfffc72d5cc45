//! Durable outcome stores.
//!
//! Two disjoint stores record terminal job outcomes, both keyed by the job
//! hash: successes carry the job snapshot and produced-file count, failures
//! carry the error message. Records are JSON blobs; a scan skips bodies
//! that no longer decode instead of aborting.

use std::marker::PhantomData;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use tracing::{debug, warn};

use super::{ensure_schema, open_memory_pool, open_pool, DbPool};
use crate::error::Result;

/// A successful job completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuccessRecord {
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    /// JSON snapshot of the combined job as scheduled.
    pub job_data: String,
    /// Number of files generated.
    pub file_count: usize,
}

impl SuccessRecord {
    pub fn new(hash: impl Into<String>, job_data: impl Into<String>, file_count: usize) -> Self {
        Self {
            hash: hash.into(),
            timestamp: Utc::now(),
            job_data: job_data.into(),
            file_count,
        }
    }
}

/// A terminal processing failure (including cancellations).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureRecord {
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub error: String,
    /// JSON snapshot of the combined job as scheduled, empty when the
    /// instruction record could not be read.
    pub job_data: String,
}

impl FailureRecord {
    pub fn new(
        hash: impl Into<String>,
        error: impl Into<String>,
        job_data: impl Into<String>,
    ) -> Self {
        Self {
            hash: hash.into(),
            timestamp: Utc::now(),
            error: error.into(),
            job_data: job_data.into(),
        }
    }
}

/// Record types stored in an [`OutcomeStore`] expose their timestamp so the
/// store can evict by age without knowing the full shape.
pub trait OutcomeRecord {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl OutcomeRecord for SuccessRecord {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl OutcomeRecord for FailureRecord {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Hash-keyed durable store of one outcome-record type.
pub struct OutcomeStore<R> {
    pool: DbPool,
    _record: PhantomData<R>,
}

/// Store of success records.
pub type SuccessStore = OutcomeStore<SuccessRecord>;

/// Store of failure records.
pub type FailureStore = OutcomeStore<FailureRecord>;

impl<R> OutcomeStore<R>
where
    R: Serialize + DeserializeOwned + OutcomeRecord + Send + Sync,
{
    /// Open (or create) the store at the given database path.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = open_pool(path).await?;
        ensure_schema(&pool).await?;
        Ok(Self {
            pool,
            _record: PhantomData,
        })
    }

    /// Open an in-memory store, for tests.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = open_memory_pool().await?;
        ensure_schema(&pool).await?;
        Ok(Self {
            pool,
            _record: PhantomData,
        })
    }

    /// Store a record under its hash, replacing any previous record.
    /// Durable on return.
    pub async fn put(&self, hash: &str, record: &R) -> Result<()> {
        let body = serde_json::to_string(record)?;
        sqlx::query("INSERT OR REPLACE INTO records (hash, body) VALUES (?, ?)")
            .bind(hash)
            .bind(body)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Fetch a record by hash. Absence is not an error.
    pub async fn get(&self, hash: &str) -> Result<Option<R>> {
        let row = sqlx::query("SELECT body FROM records WHERE hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let body: String = row.get(0);
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }

    /// Delete a record by hash. Deleting a missing hash is a no-op.
    pub async fn delete(&self, hash: &str) -> Result<()> {
        sqlx::query("DELETE FROM records WHERE hash = ?")
            .bind(hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Scan all records in key order, skipping bodies that fail to decode.
    pub async fn scan(&self) -> Result<Vec<R>> {
        let rows = sqlx::query("SELECT hash, body FROM records ORDER BY hash")
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let body: String = row.get(1);
            match serde_json::from_str(&body) {
                Ok(record) => records.push(record),
                Err(e) => {
                    let hash: String = row.get(0);
                    warn!(hash = %hash, "Skipping undecodable outcome record: {}", e);
                }
            }
        }
        Ok(records)
    }

    /// Remove every record whose timestamp is older than `max_age`.
    ///
    /// Keys are collected first and deleted afterwards so the scan never
    /// races its own mutations. Returns the number of evicted records.
    pub async fn evict_older_than(&self, max_age: Duration) -> Result<usize> {
        let cutoff = Utc::now() - max_age;

        let rows = sqlx::query("SELECT hash, body FROM records ORDER BY hash")
            .fetch_all(&self.pool)
            .await?;

        let mut stale = Vec::new();
        for row in rows {
            let body: String = row.get(1);
            let record: R = match serde_json::from_str(&body) {
                Ok(record) => record,
                Err(_) => continue,
            };
            if record.timestamp() < cutoff {
                let hash: String = row.get(0);
                stale.push(hash);
            }
        }

        for hash in &stale {
            sqlx::query("DELETE FROM records WHERE hash = ?")
                .bind(hash)
                .execute(&self.pool)
                .await?;
        }

        if !stale.is_empty() {
            debug!("Evicted {} outcome records older than cutoff", stale.len());
        }
        Ok(stale.len())
    }

    /// Probe the underlying database, for health checks.
    pub async fn check_health(&self) -> Result<()> {
        sqlx::query("SELECT body FROM records WHERE hash = '__health_check__'")
            .fetch_optional(&self.pool)
            .await?;
        Ok(())
    }
}
