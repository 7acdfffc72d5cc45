//! Backend-credentials store.
//!
//! Holds opaque string maps of storage-backend credentials, keyed by a
//! generated access key. Upload tokens reference a stored credential set by
//! its key instead of carrying secrets inline.

use std::path::Path;

use rand::Rng;
use sqlx::Row;
use std::collections::HashMap;

use super::{ensure_schema, open_memory_pool, open_pool, DbPool};
use crate::error::Result;

/// Length of generated access keys in bytes (rendered as hex, so doubled).
const ACCESS_KEY_BYTES: usize = 16;

/// Store of backend credential sets.
pub struct CredentialsStore {
    pool: DbPool,
}

impl CredentialsStore {
    /// Open (or create) the store at the given database path.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = open_pool(path).await?;
        ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Open an in-memory store, for tests.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = open_memory_pool().await?;
        ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Store a credential map under the given access key.
    pub async fn put(&self, access_key: &str, creds: &HashMap<String, String>) -> Result<()> {
        let body = serde_json::to_string(creds)?;
        sqlx::query("INSERT OR REPLACE INTO records (hash, body) VALUES (?, ?)")
            .bind(access_key)
            .bind(body)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Fetch a credential map by access key.
    pub async fn get(&self, access_key: &str) -> Result<Option<HashMap<String, String>>> {
        let row = sqlx::query("SELECT body FROM records WHERE hash = ?")
            .bind(access_key)
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

    /// Delete a credential map. Deleting a missing key is a no-op.
    pub async fn delete(&self, access_key: &str) -> Result<()> {
        sqlx::query("DELETE FROM records WHERE hash = ?")
            .bind(access_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Probe the underlying database, for health checks.
    pub async fn check_health(&self) -> Result<()> {
        sqlx::query("SELECT body FROM records WHERE hash = '__health_check__'")
            .fetch_optional(&self.pool)
            .await?;
        Ok(())
    }
}

/// Generate a fresh random access key (lowercase hex).
pub fn generate_access_key() -> String {
    let mut bytes = [0u8; ACCESS_KEY_BYTES];
    rand::thread_rng().fill(&mut bytes[..]);
    hex::encode(bytes)
}
